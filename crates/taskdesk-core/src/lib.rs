//! Core library for taskdesk, a client for a task and project management
//! service.
//!
//! The interesting part is the session layer: [`api::SessionClient`] attaches
//! bearer tokens, refreshes an expired token pair exactly once no matter how
//! many requests notice the expiry, and replays the queued requests with the
//! new token. [`auth::AuthManager`] builds login, registration and logout on
//! top of it and publishes the resulting [`auth::SessionState`].

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiError, ErrorKind, SessionClient, SessionEvent};
pub use auth::{AuthManager, Credentials, Registration, SessionState, TokenPair, TokenStore};
pub use config::{Config, TokenBackend};
