//! Token pair and the identity decoded from an access token.
//!
//! The identity is read from the access token's payload without verifying
//! its signature. It is for display only: every authorization decision stays
//! with the server, which validates the token on each request.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Access/refresh token pair. Always persisted and cleared as one record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "access_token", alias = "access")]
    pub access: String,
    #[serde(rename = "refresh_token", alias = "refresh")]
    pub refresh: String,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenDecodeError {
    #[error("access token is not a three-part JWT")]
    Malformed,
    #[error("access token payload is not valid base64")]
    Encoding,
    #[error("access token payload is not a JSON object")]
    Payload,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

/// User identity as claimed by the access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub id: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserIdentity {
    pub fn from_access_token(token: &str) -> Result<Self, TokenDecodeError> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(TokenDecodeError::Malformed),
        };

        // Some issuers keep the base64 padding
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| TokenDecodeError::Encoding)?;
        let claims: Claims =
            serde_json::from_slice(&bytes).map_err(|_| TokenDecodeError::Payload)?;

        let id = claims.user_id.and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Ok(Self {
            id,
            email: claims.email,
            first_name: claims.first_name,
            last_name: claims.last_name,
            phone_number: claims.phone_number,
            expires_at: claims.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single()),
        })
    }

    /// Name for display: "First Last", falling back to email, then id.
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !full.is_empty() {
            return full;
        }
        self.email
            .clone()
            .or_else(|| self.id.as_ref().map(|id| format!("user {}", id)))
            .unwrap_or_else(|| "unknown user".to_string())
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| Utc::now() > exp).unwrap_or(false)
    }

    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at.map(|exp| exp - Utc::now())
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}
