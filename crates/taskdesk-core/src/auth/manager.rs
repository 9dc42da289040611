//! Login, registration and logout on top of the session client.
//!
//! `AuthManager` owns the observable `SessionState`. Each operation moves it
//! through `pending` (loading, error cleared) to either `fulfilled` (result
//! applied) or `rejected` (error message set).

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ApiRequest, ApiResponse, SessionClient, SessionEvent};

use super::{TokenPair, TokenStore, UserIdentity};

const LOGIN_PATH: &str = "/login/";
const REGISTER_PATH: &str = "/register/";
const LOGOUT_PATH: &str = "/logout/";

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";
const PASSWORD_MISMATCH: &str = "Passwords do not match";
const MISSING_CREDENTIALS: &str = "Email and password are required";
const SESSION_ENDED: &str = "Session expired. Please log in again.";

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Sign-up form. All fields, including the confirmation, are sent to the
/// registration endpoint.
#[derive(Clone, Default, Serialize)]
pub struct Registration {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub password: String,
    pub password2: String,
}

impl Registration {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.email.clone(), self.password.clone())
    }

    /// Checks that need no server round trip.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(ApiError::Validation {
                field: None,
                message: MISSING_CREDENTIALS.to_string(),
            });
        }
        if self.password != self.password2 {
            return Err(ApiError::Validation {
                field: Some("password2".to_string()),
                message: PASSWORD_MISMATCH.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("phone_number", &self.phone_number)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct LogoutRequest<'a> {
    refresh: &'a str,
}

/// What the front end renders. `identity` is set exactly when `tokens` is
/// set and the access token decodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub identity: Option<UserIdentity>,
    pub tokens: Option<TokenPair>,
    pub loading: bool,
    pub error: Option<String>,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Session for a stored pair; logged out if the access token is unreadable.
    fn from_tokens(pair: TokenPair) -> Self {
        match UserIdentity::from_access_token(&pair.access) {
            Ok(identity) => Self {
                identity: Some(identity),
                tokens: Some(pair),
                ..Default::default()
            },
            Err(e) => {
                warn!(error = %e, "Stored access token is unreadable, treating as logged out");
                Self::default()
            }
        }
    }
}

pub struct AuthManager {
    client: SessionClient,
    state: Arc<watch::Sender<SessionState>>,
}

impl AuthManager {
    /// Create a manager, restoring any session left in the token store.
    pub fn new(client: SessionClient) -> Self {
        let initial = match client.store().load() {
            Ok(Some(pair)) => SessionState::from_tokens(pair),
            Ok(None) => SessionState::default(),
            Err(e) => {
                warn!(error = %e, "Failed to load stored tokens");
                SessionState::default()
            }
        };
        debug!(authenticated = initial.is_authenticated(), "Session restored");

        let (state, _) = watch::channel(initial);
        Self {
            client,
            state: Arc::new(state),
        }
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<SessionState, ApiError> {
        self.begin();
        let result = self.authenticate(credentials).await;
        self.settle(result)
    }

    /// Register an account and log straight into it.
    pub async fn register(&self, registration: &Registration) -> Result<SessionState, ApiError> {
        if let Err(err) = registration.validate() {
            self.reject(&err);
            return Err(err);
        }

        self.begin();
        let result = self.register_and_authenticate(registration).await;
        self.settle(result)
    }

    /// End the session. The server is told on a best-effort basis; the local
    /// tokens and state are cleared whatever it answers.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.begin();

        let refresh = match self.client.store().load() {
            Ok(pair) => pair.map(|p| p.refresh),
            Err(e) => {
                warn!(error = %e, "Failed to read stored tokens before logout");
                None
            }
        };

        if let Some(refresh) = refresh {
            let body = LogoutRequest { refresh: &refresh };
            let sent = match ApiRequest::post(LOGOUT_PATH).json(&body) {
                Ok(request) => self
                    .client
                    .send(request.without_refresh())
                    .await
                    .and_then(ApiResponse::error_for_status),
                Err(e) => Err(e),
            };
            match sent {
                Ok(_) => debug!("Server session invalidated"),
                Err(e) => warn!(error = %e, "Server logout failed, clearing local session anyway"),
            }
        }

        let cleared = self.client.store().clear();
        self.state.send_replace(SessionState::default());
        info!("Logged out");
        cleared.map_err(ApiError::from)
    }

    /// Keep the session state in step with the client: a forced logout
    /// empties it, a token refresh recomputes the identity.
    pub fn watch_session_events(&self) -> JoinHandle<()> {
        let mut events = self.client.subscribe();
        let state = Arc::clone(&self.state);
        let store = Arc::clone(self.client.store());

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => apply_event(&state, store.as_ref(), &event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session event watcher lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Apply one session event to the state.
    pub fn apply_event(&self, event: &SessionEvent) {
        apply_event(&self.state, self.client.store().as_ref(), event);
    }

    async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<(UserIdentity, TokenPair), ApiError> {
        let request = ApiRequest::post(LOGIN_PATH).json(credentials)?.without_refresh();
        let response = self.client.send(request).await?;
        if !response.is_success() {
            debug!(status = %response.status, "Login rejected");
            return Err(ApiError::auth_from_payload(&response.body, LOGIN_FAILED));
        }

        let pair: TokenPair = response.json()?;
        let identity = UserIdentity::from_access_token(&pair.access).map_err(|e| {
            ApiError::InvalidResponse(format!("Login returned an unreadable access token: {}", e))
        })?;
        self.client.store().save(&pair)?;
        info!("Login successful");
        Ok((identity, pair))
    }

    async fn register_and_authenticate(
        &self,
        registration: &Registration,
    ) -> Result<(UserIdentity, TokenPair), ApiError> {
        let request = ApiRequest::post(REGISTER_PATH)
            .json(registration)?
            .without_refresh();
        let response = self.client.send(request).await?;
        if !response.is_success() {
            debug!(status = %response.status, "Registration rejected");
            return Err(ApiError::validation_from_payload(&response.body, REGISTRATION_FAILED));
        }

        info!("Registration accepted, logging in");
        self.authenticate(&registration.credentials()).await
    }

    fn begin(&self) {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
    }

    fn reject(&self, err: &ApiError) {
        self.state.send_modify(|s| {
            s.loading = false;
            s.error = Some(err.user_message());
        });
    }

    fn settle(
        &self,
        result: Result<(UserIdentity, TokenPair), ApiError>,
    ) -> Result<SessionState, ApiError> {
        match result {
            Ok((identity, tokens)) => {
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.identity = Some(identity);
                    s.tokens = Some(tokens);
                });
                Ok(self.state())
            }
            Err(err) => {
                warn!(error = %err, "Session operation failed");
                self.reject(&err);
                Err(err)
            }
        }
    }
}

fn apply_event(state: &watch::Sender<SessionState>, store: &dyn TokenStore, event: &SessionEvent) {
    match event {
        SessionEvent::LoginRequired => {
            state.send_replace(SessionState {
                error: Some(SESSION_ENDED.to_string()),
                ..Default::default()
            });
        }
        SessionEvent::TokensRefreshed => match store.load() {
            Ok(Some(pair)) => {
                let refreshed = SessionState::from_tokens(pair);
                state.send_modify(|s| {
                    s.identity = refreshed.identity;
                    s.tokens = refreshed.tokens;
                });
            }
            Ok(None) => debug!("Refresh event with no stored tokens"),
            Err(e) => warn!(error = %e, "Failed to reload refreshed tokens"),
        },
        SessionEvent::NetworkError(_) => {}
    }
}
