//! Authentication module for managing the user session and its credentials.
//!
//! This module provides:
//! - `SessionManager`: sign-in, sign-up, sign-out, silent refresh and startup restore
//! - `TokenStore`: persisted slots for the access token, refresh token and user
//! - `KeyringTokenStore`: OS-level credential storage via keyring
//!
//! Access tokens are JWTs; only their `exp` claim is read, never the signature.

pub mod credentials;
pub mod error;
pub mod manager;
pub mod route;
pub mod session;
pub mod store;
pub mod token;

pub use credentials::KeyringTokenStore;
pub use error::AuthError;
pub use manager::{SessionManager, Startup};
pub use route::{is_public_route, Navigator, Router, LOGIN_ROUTE};
pub use session::{Session, SessionSnapshot, SessionState};
pub use store::{FileTokenStore, MemoryTokenStore, StoreError, TokenSlot, TokenStore};
