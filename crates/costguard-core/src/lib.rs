//! CostGuard core library.
//!
//! Owns the client-side authentication lifecycle for the CostGuard dashboard:
//! persisted tokens, access-token expiry detection, silent refresh, and the
//! sign-in / sign-up / sign-out flows against the CostGuard REST API.
//!
//! - [`auth::SessionManager`]: single source of truth for the signed-in user
//! - [`api::ApiClient`]: reqwest-backed transport implementing [`api::AuthTransport`]
//! - [`auth::TokenStore`]: persisted key-value slots for tokens and the user
//! - [`config::Config`]: API location and storage backend

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, AuthTransport};
pub use auth::{
    AuthError, FileTokenStore, KeyringTokenStore, MemoryTokenStore, Navigator, Router, Session,
    SessionManager, SessionSnapshot, SessionState, Startup, TokenSlot, TokenStore,
};
pub use config::{Config, StoreBackend};
pub use models::{AwsAccount, AwsAccountRequest, CostSettings, UserPreferences, UserProfile};
