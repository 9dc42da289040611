//! HTTP session layer for the task service API.
//!
//! This module provides the `SessionClient`, which attaches the stored
//! bearer token to every request and transparently refreshes the token pair
//! when the server rejects an expired access token, plus typed fetches for
//! the task and project lists.

pub mod client;
pub mod error;
pub mod request;
pub mod resources;

pub use client::{PendingRequest, SessionClient, SessionEvent};
pub use error::{ApiError, ErrorKind};
pub use request::{ApiRequest, ApiResponse};
pub use resources::Dashboard;
