use thiserror::Error;

use crate::api::ApiError;

use super::store::StoreError;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Server replied 2xx but without the fields a session needs.
    #[error("{0}")]
    MalformedResponse(&'static str),

    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Network error: Please check your internet connection or try again later.")]
    Network(#[source] ApiError),

    #[error("{}", server_message(.0))]
    Api(#[source] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session changed (e.g. signed out) while the operation was in flight.
    #[error("Session changed before the operation completed")]
    Superseded,
}

/// Prefer the backend's own `message` / `error` field over the status text.
fn server_message(err: &ApiError) -> String {
    err.body()
        .and_then(|body| serde_json::from_str::<serde_json::Value>(body).ok())
        .and_then(|json| {
            ["message", "error"]
                .iter()
                .find_map(|key| json.get(key).and_then(|v| v.as_str()).map(str::to_owned))
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| err.to_string())
}

impl AuthError {
    pub(crate) fn from_api(err: ApiError) -> Self {
        if err.is_network() {
            AuthError::Network(err)
        } else {
            AuthError::Api(err)
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Network(e) | AuthError::Api(e) => e.status(),
            _ => None,
        }
    }

    /// The server rejected the credential (401/403).
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, AuthError::Api(e) if e.is_auth_failure())
    }
}
