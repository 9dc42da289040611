//! Authentication module for managing the user session and its tokens.
//!
//! This module provides:
//! - `TokenStore`: persistence for the access/refresh token pair, with
//!   in-memory, OS keychain, and (optionally sealed) file backends
//! - `UserIdentity`: display identity decoded from the access token
//! - `AuthManager`: login, registration and logout with observable state

pub mod manager;
mod sealed;
pub mod store;
pub mod tokens;

pub use manager::{AuthManager, Credentials, Registration, SessionState};
pub use store::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, StoreError, TokenStore};
pub use tokens::{TokenDecodeError, TokenPair, UserIdentity};
