//! REST transport for the CostGuard backend.
//!
//! `AuthTransport` is the contract the session manager relies on; `ApiClient`
//! is the reqwest implementation. The client attaches the stored access token
//! as a bearer credential (never on the public auth endpoints) and reacts to
//! 401 responses by clearing stored credentials and redirecting to login.

pub mod accounts;
pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::models::{AuthResponse, RefreshResponse, SignInRequest, SignUpRequest, UserProfile};

pub use client::ApiClient;
pub use error::ApiError;

pub const AUTH_SIGNUP: &str = "/auth/signup";
pub const AUTH_SIGNIN: &str = "/auth/signin";
pub const AUTH_FORGOT_PASSWORD: &str = "/auth/forgot-password";
pub const AUTH_REFRESH: &str = "/auth/refresh";
pub const AUTH_PROFILE: &str = "/auth/profile";
pub const AWS_VALIDATE_ACCOUNT: &str = "/aws/validate-account";
pub const AWS_ACCOUNTS: &str = "/aws/accounts";

/// Endpoints that must never carry a bearer token.
pub const PUBLIC_AUTH_ENDPOINTS: [&str; 3] = [AUTH_SIGNUP, AUTH_SIGNIN, AUTH_FORGOT_PASSWORD];

/// Account-linking endpoints whose 401s report bad AWS credentials rather
/// than a dead session, so they never trigger the global sign-out.
pub const SESSION_PRESERVING_ENDPOINTS: [&str; 2] = [AWS_VALIDATE_ACCOUNT, AWS_ACCOUNTS];

/// Calls the session manager needs from the API layer.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    async fn sign_up(&self, request: &SignUpRequest<'_>) -> Result<AuthResponse, ApiError>;

    async fn sign_in(&self, request: &SignInRequest<'_>) -> Result<AuthResponse, ApiError>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError>;

    /// Fetch the current user with the stored access token.
    async fn profile(&self) -> Result<UserProfile, ApiError>;
}
