//! Data models for the CostGuard auth API.
//!
//! - `UserProfile`, `UserPreferences`, `CostSettings`: the signed-in user
//! - `AuthResponse`, `Tokens`, `RefreshResponse`: wire shapes of `/auth/*`
//! - `AwsAccount` and friends: linked AWS accounts under `/aws/*`

pub mod account;
pub mod auth;
pub mod user;

pub use account::{AccountStatus, AwsAccount, AwsAccountRequest, AwsAccountResponse};
pub use auth::{AuthResponse, ProfileResponse, RefreshRequest, RefreshResponse, SignInRequest, SignUpRequest, Tokens};
pub use user::{CostSettings, UserPreferences, UserProfile};
