use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::ApiError;

/// A replayable outbound request.
///
/// Everything needed to send the request again lives here (the bearer token
/// is attached at send time), so a request captured during a token refresh
/// can be replayed with the new token.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, or an absolute URL (pagination
    /// links).
    pub path: String,
    pub body: Option<Value>,
    pub headers: HeaderMap,
    pub(crate) retried: bool,
    pub(crate) refresh_on_unauthorized: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            retried: false,
            refresh_on_unauthorized: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::Unknown(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Return a 401 to the caller instead of refreshing the session.
    /// Credential endpoints use this so a rejected login is never mistaken
    /// for an expired token.
    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(mut self) -> Self {
        self.retried = true;
        self
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self, ApiError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("Failed to read response body: {}", e)))?;
        Ok(Self { status, body })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turn a non-success status into the matching `ApiError`.
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.body))
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builders() {
        let req = ApiRequest::post("/login/")
            .json(&json!({ "email": "a@b.com" }))
            .unwrap()
            .without_refresh();
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.body, Some(json!({ "email": "a@b.com" })));
        assert!(!req.refresh_on_unauthorized);
        assert!(!req.is_retried());
        assert!(req.mark_retried().is_retried());
    }

    #[test]
    fn test_response_error_for_status() {
        let ok = ApiResponse {
            status: StatusCode::OK,
            body: r#"{"count": 0}"#.to_string(),
        };
        let value: Value = ok.clone().error_for_status().unwrap().json().unwrap();
        assert_eq!(value["count"], 0);

        let missing = ApiResponse {
            status: StatusCode::NOT_FOUND,
            body: "gone".to_string(),
        };
        assert_eq!(missing.error_for_status().unwrap_err(), ApiError::NotFound("gone".into()));
    }

    #[test]
    fn test_response_bad_json() {
        let resp = ApiResponse {
            status: StatusCode::OK,
            body: "<html>".to_string(),
        };
        assert!(matches!(resp.json::<Value>(), Err(ApiError::InvalidResponse(_))));
    }
}
