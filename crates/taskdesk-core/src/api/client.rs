//! Session client for the task service API.
//!
//! Every request carries the stored access token as a bearer token. When the
//! server answers 401, the client refreshes the token pair once and replays
//! the request. Refresh is single-flight: requests that hit a 401 while a
//! refresh is running wait in a queue and are replayed (or failed) together
//! when it settles.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::auth::{TokenPair, TokenStore};

use super::{ApiError, ApiRequest, ApiResponse};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Token exchange endpoint, relative to the API base URL.
const REFRESH_PATH: &str = "/auth/refresh";

/// Session events kept for slow subscribers before they start lagging.
const EVENT_CHANNEL_CAPACITY: usize = 16;

const NETWORK_ERROR_NOTICE: &str = "Network error. Please check your connection.";
const NO_SESSION_MESSAGE: &str = "Not logged in. Please log in.";
const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";
const REFRESH_ABANDONED_MESSAGE: &str = "Session refresh was interrupted. Please try again.";

/// Notifications published by the client for front ends to surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A request failed to reach the server. Transient; shown, not retried.
    NetworkError(String),
    /// The session could not be recovered and the tokens were cleared. The
    /// front end should return the user to the login view.
    LoginRequired,
    /// A refresh stored a new token pair.
    TokensRefreshed,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(alias = "access_token")]
    access: String,
    #[serde(default, alias = "refresh_token")]
    refresh: Option<String>,
}

/// A request parked while a refresh is in flight, with the channel its
/// caller is waiting on.
pub struct PendingRequest {
    request: ApiRequest,
    reply: oneshot::Sender<Result<ApiResponse, ApiError>>,
}

#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    queue: Vec<PendingRequest>,
}

struct Inner {
    http: Client,
    base_url: String,
    /// Parsed `base_url`; absolute links must share its origin.
    base: Url,
    store: Arc<dyn TokenStore>,
    refresh: Mutex<RefreshState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Inner {
    fn refresh_state(&self) -> MutexGuard<'_, RefreshState> {
        self.refresh.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Clear the in-progress flag and hand back everything that queued up.
    fn release(&self) -> Vec<PendingRequest> {
        let mut state = self.refresh_state();
        state.in_progress = false;
        std::mem::take(&mut state.queue)
    }
}

/// Releases the single-flight flag if the refreshing task is dropped before
/// it settles. Dropping the queued reply senders wakes their callers with an
/// error.
struct RefreshGuard<'a> {
    inner: &'a Inner,
    settled: bool,
}

impl RefreshGuard<'_> {
    fn settle(mut self) -> Vec<PendingRequest> {
        self.settled = true;
        self.inner.release()
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let abandoned = self.inner.release();
            warn!(queued = abandoned.len(), "Token refresh abandoned");
        }
    }
}

enum Recovery {
    Wait(oneshot::Receiver<Result<ApiResponse, ApiError>>),
    Replay(ApiRequest),
    Refresh(ApiRequest),
}

/// Authenticated client for the task service.
/// Clone is cheap and clones share the token store and the refresh state.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl SessionClient {
    pub fn new(base_url: &str, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, store, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: &str,
        store: Arc<dyn TokenStore>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base = Url::parse(base_url)
            .map_err(|e| ApiError::Unknown(format!("Invalid API URL {:?}: {}", base_url, e)))?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Unknown(format!("Failed to build HTTP client: {}", e)))?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                base,
                store,
                refresh: Mutex::new(RefreshState::default()),
                events,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.store
    }

    /// Subscribe to session notifications (network errors, forced logout).
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh_state().in_progress
    }

    /// Send a request with the stored bearer token, recovering once from an
    /// expired access token.
    ///
    /// Any status other than a recoverable 401 is returned as-is; use
    /// [`ApiResponse::error_for_status`] or the typed helpers to turn error
    /// statuses into `ApiError`s.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let bearer = self.access_token()?;
        let response = self.dispatch(&request, bearer.as_deref()).await?;

        if response.status != StatusCode::UNAUTHORIZED
            || request.retried
            || !request.refresh_on_unauthorized
        {
            return Ok(response);
        }

        debug!(path = %request.path, "Access token rejected");
        self.recover(request.mark_retried(), bearer).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.error_for_status()?.json()
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::post(path).json(body)?)
            .await?
            .error_for_status()?
            .json()
    }

    async fn recover(
        &self,
        request: ApiRequest,
        sent_with: Option<String>,
    ) -> Result<ApiResponse, ApiError> {
        let recovery = {
            let mut state = self.inner.refresh_state();
            if state.in_progress {
                let (reply, waiter) = oneshot::channel();
                debug!(
                    path = %request.path,
                    position = state.queue.len() + 1,
                    "Refresh in flight, queueing request"
                );
                state.queue.push(PendingRequest { request, reply });
                Recovery::Wait(waiter)
            } else if self.rotated_since(sent_with.as_deref())? {
                Recovery::Replay(request)
            } else {
                state.in_progress = true;
                Recovery::Refresh(request)
            }
        };

        match recovery {
            Recovery::Wait(waiter) => waiter
                .await
                .unwrap_or_else(|_| Err(ApiError::Auth(REFRESH_ABANDONED_MESSAGE.to_string()))),
            Recovery::Replay(request) => {
                debug!(path = %request.path, "Token already refreshed, replaying");
                self.replay(request).await
            }
            Recovery::Refresh(request) => self.refresh_and_replay(request).await,
        }
    }

    /// True when a refresh that finished after `sent_with` was used already
    /// stored a different access token.
    fn rotated_since(&self, sent_with: Option<&str>) -> Result<bool, ApiError> {
        let current = self.access_token()?;
        Ok(current.is_some() && current.as_deref() != sent_with)
    }

    async fn refresh_and_replay(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let guard = RefreshGuard {
            inner: &self.inner,
            settled: false,
        };

        match self.exchange_refresh_token().await {
            Ok(()) => {
                let queued = guard.settle();
                info!(queued = queued.len(), "Session refreshed, replaying requests");

                let (reply, waiter) = oneshot::channel();
                let replays: Vec<PendingRequest> =
                    std::iter::once(PendingRequest { request, reply }).chain(queued).collect();
                let client = self.clone();
                // One at a time, so the server sees them in enqueue order
                tokio::spawn(async move {
                    for pending in replays {
                        let result = client.replay(pending.request).await;
                        let _ = pending.reply.send(result);
                    }
                });
                waiter
                    .await
                    .unwrap_or_else(|_| Err(ApiError::Auth(REFRESH_ABANDONED_MESSAGE.to_string())))
            }
            Err(err) => {
                warn!(error = %err, "Session refresh failed");
                // Clear before releasing the flag so nothing new reads the dead pair
                self.end_session();
                let queued = guard.settle();
                for pending in queued {
                    let _ = pending.reply.send(Err(err.clone()));
                }
                Err(err)
            }
        }
    }

    /// Exchange the stored refresh token for a new pair and persist it.
    async fn exchange_refresh_token(&self) -> Result<(), ApiError> {
        let current = match self.inner.store.load()? {
            Some(pair) => pair,
            None => {
                warn!("No refresh token stored");
                return Err(ApiError::Auth(NO_SESSION_MESSAGE.to_string()));
            }
        };

        let response = self
            .inner
            .http
            .post(self.url(REFRESH_PATH)?)
            .json(&RefreshRequest {
                refresh_token: &current.refresh,
            })
            .send()
            .await
            .map_err(|e| self.network_failure(e))?;
        let response = ApiResponse::read(response).await?;

        if !response.is_success() {
            debug!(status = %response.status, "Refresh token rejected");
            return Err(ApiError::auth_from_payload(&response.body, SESSION_EXPIRED_MESSAGE));
        }

        let body: RefreshResponse = response.json()?;
        let pair = TokenPair::new(body.access, body.refresh.unwrap_or(current.refresh));
        self.inner.store.save(&pair)?;
        self.emit(SessionEvent::TokensRefreshed);
        Ok(())
    }

    async fn replay(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let request = request.mark_retried();
        let bearer = self.access_token()?;
        self.dispatch(&request, bearer.as_deref()).await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url(&request.path)?;
        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, url = %url, retried = request.retried, "Sending request");
        let response = builder.send().await.map_err(|e| self.network_failure(e))?;
        ApiResponse::read(response).await
    }

    /// Clear the stored tokens and tell observers a new login is needed.
    pub(crate) fn end_session(&self) {
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear stored tokens");
        }
        self.emit(SessionEvent::LoginRequired);
    }

    fn access_token(&self) -> Result<Option<String>, ApiError> {
        Ok(self.inner.store.load()?.map(|pair| pair.access))
    }

    fn network_failure(&self, error: reqwest::Error) -> ApiError {
        let reason = if error.is_timeout() {
            "request timed out"
        } else if error.is_connect() {
            "connection failed"
        } else {
            "request failed"
        };
        warn!(error = %error, reason, "Network failure");
        self.emit(SessionEvent::NetworkError(NETWORK_ERROR_NOTICE.to_string()));
        ApiError::Network(format!("{}: {}", reason, error))
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// Resolve `path` against the base URL. Absolute URLs (server-supplied
    /// pagination links) are only followed on the API's own origin, since the
    /// bearer token goes with them.
    fn url(&self, path: &str) -> Result<String, ApiError> {
        if !(path.starts_with("http://") || path.starts_with("https://")) {
            return Ok(format!("{}/{}", self.inner.base_url, path.trim_start_matches('/')));
        }

        let target = Url::parse(path)
            .map_err(|e| ApiError::InvalidResponse(format!("Invalid link {:?}: {}", path, e)))?;
        if target.origin() != self.inner.base.origin() {
            let origin = target.origin().ascii_serialization();
            warn!(origin = %origin, "Refusing link to another origin");
            return Err(ApiError::InvalidResponse(format!(
                "Link points outside the API: {}",
                origin
            )));
        }
        Ok(path.to_string())
    }
}
