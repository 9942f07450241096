use std::fmt;

use serde::Serialize;

#[cfg(feature = "ts")]
use ts_rs::TS;

use crate::models::UserProfile;

/// Coarse lifecycle state derived from a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum SessionState {
    Initializing,
    Authenticated,
    Unauthenticated,
}

/// The client's in-memory record of the current user and credentials.
///
/// Fields are private: only the session manager builds or changes a
/// `Session`, which keeps `is_authenticated` implying a user and an access
/// token. Consumers get clones through `SessionManager::snapshot` or a
/// `watch` subscription.
#[derive(Clone, PartialEq)]
pub struct Session {
    user: Option<UserProfile>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    is_authenticated: bool,
    is_loading: bool,
    last_error: Option<String>,
    initialized: bool,
}

impl Session {
    /// Entry state at application start.
    pub(crate) fn initializing() -> Self {
        Self {
            user: None,
            access_token: None,
            refresh_token: None,
            is_authenticated: false,
            is_loading: true,
            last_error: None,
            initialized: false,
        }
    }

    pub(crate) fn signed_out(last_error: Option<String>) -> Self {
        Self {
            is_loading: false,
            last_error,
            initialized: true,
            ..Self::initializing()
        }
    }

    pub(crate) fn authenticated(
        user: UserProfile,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            user: Some(user),
            access_token: Some(access_token),
            refresh_token,
            is_authenticated: true,
            is_loading: false,
            last_error: None,
            initialized: true,
        }
    }

    pub(crate) fn set_loading(&mut self) {
        self.is_loading = true;
        self.last_error = None;
    }

    pub(crate) fn set_access_token(&mut self, token: String) {
        self.access_token = Some(token);
    }

    /// Wholesale replacement; a profile is never patched field by field.
    pub(crate) fn replace_user(&mut self, user: UserProfile) {
        self.user = Some(user);
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn state(&self) -> SessionState {
        if self.is_authenticated {
            SessionState::Authenticated
        } else if !self.initialized {
            SessionState::Initializing
        } else {
            SessionState::Unauthenticated
        }
    }

    /// Token-free view for display and serialization.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            user: self.user.clone(),
            is_authenticated: self.is_authenticated,
            is_loading: self.is_loading,
            has_refresh_token: self.refresh_token.is_some(),
            last_error: self.last_error.clone(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user.as_ref().map(|u| &u.user_id))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("is_authenticated", &self.is_authenticated)
            .field("is_loading", &self.is_loading)
            .field("last_error", &self.last_error)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub has_refresh_token: bool,
    pub last_error: Option<String>,
}
