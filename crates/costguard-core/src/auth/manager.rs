//! Session manager: owner of the authenticated-user lifecycle.
//!
//! All session mutations go through `SessionManager`. Consumers observe the
//! session through `snapshot()` or a `watch` subscription.
//!
//! Every state transition advances a generation counter. An async operation
//! remembers the generation it started from and only commits if nothing else
//! transitioned meanwhile, so a `sign_out()` issued while a `sign_in()` is in
//! flight always wins.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::AuthTransport;
use crate::models::{AuthResponse, SignInRequest, SignUpRequest, UserProfile};

use super::error::AuthError;
use super::route::{is_public_route, Navigator};
use super::session::Session;
use super::store::{StoreError, TokenSlot, TokenStore};
use super::token;

const MISSING_TOKEN_OR_USER: &str = "Invalid response from server - missing token or user data";
const INVALID_SIGNUP_RESPONSE: &str = "Invalid signup response: missing user data";
const MISSING_REFRESHED_TOKEN: &str = "Invalid refresh response: missing token";
const INIT_FAILED: &str = "Failed to initialize authentication";

/// How `initialize()` resolved.
#[derive(Debug)]
pub enum Startup {
    /// Started on a public route; persisted state was not consulted.
    PublicRoute,
    /// No usable token + user pair in the store.
    NoSession,
    /// Unexpired token restored. The profile refresh runs in the background.
    Restored { profile_refresh: JoinHandle<()> },
    /// Token had expired and a silent refresh succeeded.
    Refreshed,
    /// Token had expired and the silent refresh failed; the store was cleared.
    RefreshFailed,
    /// Another operation changed the session during startup.
    Superseded,
}

/// Tokens and user issued by a successful sign-in (or token-bearing sign-up).
struct Issued {
    access_token: String,
    refresh_token: Option<String>,
    user: UserProfile,
}

impl Issued {
    fn from_response(response: AuthResponse) -> Result<Self, AuthError> {
        let (Some(access_token), Some(user)) =
            (response.access_token(), response.identified_user())
        else {
            error!(
                has_tokens = response.tokens.is_some(),
                has_access_token = response.access_token().is_some(),
                has_user = response.user.is_some(),
                "Auth response missing token or user"
            );
            return Err(AuthError::MalformedResponse(MISSING_TOKEN_OR_USER));
        };

        let refresh_token = response
            .tokens
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .filter(|t| !t.is_empty());

        Ok(Self {
            access_token: access_token.to_string(),
            refresh_token,
            user: user.clone(),
        })
    }

    fn persist(&self, store: &dyn TokenStore) -> Result<(), StoreError> {
        store.set(TokenSlot::AccessToken, &self.access_token)?;
        match self.refresh_token {
            Some(ref refresh) => store.set(TokenSlot::RefreshToken, refresh)?,
            None => store.remove(TokenSlot::RefreshToken)?,
        }
        store.set_user(&self.user)
    }
}

struct Inner {
    transport: Arc<dyn AuthTransport>,
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    /// Session generation; held while committing so commits and sign-out are serialized.
    generation: Mutex<u64>,
    session: watch::Sender<Session>,
}

/// Single source of truth for "is there a valid logged-in user".
/// Clone is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
    refresh_leeway: Duration,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn AuthTransport>,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (session, _) = watch::channel(Session::initializing());
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                navigator,
                generation: Mutex::new(0),
                session,
            }),
            refresh_leeway: Duration::zero(),
        }
    }

    /// Refresh proactively when the access token expires within `leeway`.
    pub fn with_refresh_leeway(mut self, leeway: Duration) -> Self {
        self.refresh_leeway = leeway;
        self
    }

    pub fn snapshot(&self) -> Session {
        self.inner.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.session.subscribe()
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.inner.navigator
    }

    // ===== Generation bookkeeping =====

    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        self.inner
            .generation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_generation(&self) -> u64 {
        *self.lock_generation()
    }

    /// Start an operation that replaces the session: mark it loading and
    /// supersede anything already in flight.
    fn begin(&self) -> u64 {
        let mut generation = self.lock_generation();
        *generation += 1;
        self.inner.session.send_modify(Session::set_loading);
        *generation
    }

    /// Update the current session in place (new access token, new profile)
    /// if no transition happened since `started`.
    fn commit<F>(&self, started: u64, update: F) -> Result<(), AuthError>
    where
        F: FnOnce(&dyn TokenStore, &mut Session) -> Result<(), StoreError>,
    {
        self.apply(started, false, update)
    }

    /// Replace the session with a new identity. Operations started against
    /// the previous one can no longer commit.
    fn commit_session<F>(&self, started: u64, update: F) -> Result<(), AuthError>
    where
        F: FnOnce(&dyn TokenStore, &mut Session) -> Result<(), StoreError>,
    {
        self.apply(started, true, update)
    }

    fn apply<F>(&self, started: u64, advance: bool, update: F) -> Result<(), AuthError>
    where
        F: FnOnce(&dyn TokenStore, &mut Session) -> Result<(), StoreError>,
    {
        let mut generation = self.lock_generation();
        if *generation != started {
            debug!(started, current = *generation, "Discarding stale completion");
            return Err(AuthError::Superseded);
        }
        let mut next = self.inner.session.borrow().clone();
        update(self.inner.store.as_ref(), &mut next)?;
        if advance {
            *generation += 1;
        }
        self.inner.session.send_replace(next);
        Ok(())
    }

    /// Reset to an empty, unauthenticated session and clear the store.
    /// Caller holds the generation lock.
    fn reset_locked(&self, generation: &mut u64, last_error: Option<String>) {
        *generation += 1;
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear token store");
        }
        self.inner.session.send_replace(Session::signed_out(last_error));
    }

    /// Record a failed sign-in / sign-up, unless the session moved on.
    fn record_failure(&self, started: u64, err: &AuthError) {
        let mut generation = self.lock_generation();
        if *generation == started {
            self.reset_locked(&mut generation, Some(err.to_string()));
        }
    }

    /// Terminal failure of the current session: sign out, keeping the error.
    fn abandon(&self, started: u64, err: AuthError) -> AuthError {
        {
            let mut generation = self.lock_generation();
            if *generation != started {
                debug!(error = %err, "Ignoring failure from a superseded session");
                return err;
            }
            self.reset_locked(&mut generation, Some(err.to_string()));
        }
        self.inner.navigator.redirect_to_login();
        err
    }

    // ===== Startup =====

    /// Resolve the entry state from persisted storage.
    pub async fn initialize(&self) -> Startup {
        let started = self.current_generation();

        let route = self.inner.navigator.current_route();
        if is_public_route(&route) {
            debug!(route = %route, "Public route, skipping session restore");
            return self.settle(started, None, Startup::PublicRoute);
        }

        let persisted = self
            .inner
            .store
            .get_present(TokenSlot::AccessToken)
            .and_then(|token| Ok((token, self.inner.store.user()?)));

        let (token, user) = match persisted {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "Failed to read persisted session");
                return self.settle(started, Some(INIT_FAILED.to_string()), Startup::NoSession);
            }
        };

        debug!(has_token = token.is_some(), has_user = user.is_some(), "Persisted session read");

        let (Some(token), Some(user)) = (token, user) else {
            info!("No valid persisted session");
            return self.settle(started, None, Startup::NoSession);
        };

        let refresh_token = self
            .inner
            .store
            .get_present(TokenSlot::RefreshToken)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to read refresh token");
                None
            });

        if !token::is_expired(&token) {
            let restored = self.commit_session(started, |_, session| {
                *session = Session::authenticated(user, token, refresh_token);
                Ok(())
            });
            if restored.is_err() {
                return Startup::Superseded;
            }
            info!("Session restored from storage");
            return Startup::Restored {
                profile_refresh: self.spawn_profile_refresh(),
            };
        }

        info!("Access token expired, attempting silent refresh");
        match self.request_refresh().await {
            Ok(new_token) => {
                let committed = self.commit_session(started, |store, session| {
                    store.set(TokenSlot::AccessToken, &new_token)?;
                    *session = Session::authenticated(user, new_token, refresh_token);
                    Ok(())
                });
                match committed {
                    Ok(()) => {
                        info!("Token refreshed during startup");
                        Startup::Refreshed
                    }
                    Err(AuthError::Superseded) => Startup::Superseded,
                    Err(e) => {
                        self.abandon(started, e);
                        Startup::RefreshFailed
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Silent refresh failed during startup");
                if self.current_generation() != started {
                    return Startup::Superseded;
                }
                self.abandon(started, e);
                Startup::RefreshFailed
            }
        }
    }

    fn settle(&self, started: u64, last_error: Option<String>, outcome: Startup) -> Startup {
        let mut generation = self.lock_generation();
        if *generation != started {
            return Startup::Superseded;
        }
        *generation += 1;
        self.inner.session.send_replace(Session::signed_out(last_error));
        outcome
    }

    fn spawn_profile_refresh(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.refresh_profile().await {
                debug!(error = %e, "Background profile refresh did not update the session");
            }
        })
    }

    // ===== Operations =====

    /// Fetch the current profile and replace the session's user.
    ///
    /// A 401/403 means the server no longer honours the token, so the
    /// session is cleared. Other failures leave the session untouched.
    pub async fn refresh_profile(&self) -> Result<UserProfile, AuthError> {
        let started = self.current_generation();

        match self.inner.transport.profile().await {
            Ok(user) => {
                self.commit(started, |store, session| {
                    if session.is_authenticated() {
                        store.set_user(&user)?;
                        session.replace_user(user.clone());
                    }
                    Ok(())
                })?;
                debug!(user_id = %user.user_id, "Profile refreshed");
                Ok(user)
            }
            Err(e) if e.is_auth_failure() => {
                warn!(error = %e, "Profile fetch rejected the token, signing out");
                Err(self.abandon(started, AuthError::from_api(e)))
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh user profile");
                Err(AuthError::from_api(e))
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let started = self.begin();
        self.sign_in_from(started, email, password).await
    }

    /// Sign in as part of the operation that began at `started`; the
    /// result only commits if nothing transitioned since then.
    async fn sign_in_from(
        &self,
        started: u64,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, AuthError> {
        info!(email, "Signing in");

        let issued = self
            .inner
            .transport
            .sign_in(&SignInRequest { email, password })
            .await
            .map_err(AuthError::from_api)
            .and_then(Issued::from_response);

        self.establish(started, issued)
    }

    /// Create an account and end up signed in, or with an error.
    ///
    /// The backend sometimes issues tokens on signup and sometimes only
    /// creates the account; in the latter case this signs in with the same
    /// credentials.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<UserProfile, AuthError> {
        let started = self.begin();
        info!(email, "Signing up");

        let request = SignUpRequest {
            email,
            password,
            first_name,
            last_name,
        };
        let response = match self.inner.transport.sign_up(&request).await {
            Ok(response) => response,
            Err(e) => {
                let err = AuthError::from_api(e);
                error!(error = %err, "Sign up failed");
                self.record_failure(started, &err);
                return Err(err);
            }
        };

        if response.access_token().is_some() {
            return self.establish(started, Issued::from_response(response));
        }

        if response.indicates_created() {
            if self.current_generation() != started {
                return Err(AuthError::Superseded);
            }
            info!("Account created without a session, signing in");
            return self.sign_in_from(started, email, password).await;
        }

        let err = AuthError::MalformedResponse(INVALID_SIGNUP_RESPONSE);
        error!(error = %err, "Sign up returned neither tokens nor a user");
        self.record_failure(started, &err);
        Err(err)
    }

    fn establish(
        &self,
        started: u64,
        issued: Result<Issued, AuthError>,
    ) -> Result<UserProfile, AuthError> {
        let issued = match issued {
            Ok(issued) => issued,
            Err(e) => {
                error!(error = %e, "Authentication failed");
                self.record_failure(started, &e);
                return Err(e);
            }
        };

        let user = issued.user.clone();
        let committed = self.commit_session(started, |store, session| {
            issued.persist(store)?;
            *session = Session::authenticated(
                issued.user.clone(),
                issued.access_token.clone(),
                issued.refresh_token.clone(),
            );
            Ok(())
        });

        match committed {
            Ok(()) => {
                info!(user_id = %user.user_id, "Authenticated");
                Ok(user)
            }
            Err(AuthError::Superseded) => {
                info!("Sign-in completed after the session changed, discarding");
                Err(AuthError::Superseded)
            }
            Err(e) => {
                error!(error = %e, "Failed to persist session");
                self.record_failure(started, &e);
                Err(e)
            }
        }
    }

    /// Clear the session and stored credentials, then return to login.
    pub fn sign_out(&self) {
        info!("Signing out");
        {
            let mut generation = self.lock_generation();
            self.reset_locked(&mut generation, None);
        }
        self.inner.navigator.redirect_to_login();
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Only the access token changes. Any failure signs out: a failed
    /// refresh is terminal for the session and is never retried. Without an
    /// authenticated session this is `NotAuthenticated` and touches nothing.
    pub async fn refresh_token(&self) -> Result<String, AuthError> {
        let started = {
            let generation = self.lock_generation();
            if !self.inner.session.borrow().is_authenticated() {
                return Err(AuthError::NotAuthenticated);
            }
            *generation
        };

        let new_token = match self.request_refresh().await {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "Token refresh failed");
                return Err(self.abandon(started, e));
            }
        };

        match self.commit(started, |store, session| {
            store.set(TokenSlot::AccessToken, &new_token)?;
            session.set_access_token(new_token.clone());
            Ok(())
        }) {
            Ok(()) => {
                debug!("Access token refreshed");
                Ok(new_token)
            }
            Err(AuthError::Superseded) => Err(AuthError::Superseded),
            Err(e) => Err(self.abandon(started, e)),
        }
    }

    async fn request_refresh(&self) -> Result<String, AuthError> {
        let refresh_token = self
            .inner
            .store
            .get_present(TokenSlot::RefreshToken)?
            .ok_or(AuthError::MissingRefreshToken)?;

        let response = self
            .inner
            .transport
            .refresh(&refresh_token)
            .await
            .map_err(AuthError::from_api)?;

        if response.token.is_empty() {
            return Err(AuthError::MalformedResponse(MISSING_REFRESHED_TOKEN));
        }
        Ok(response.token)
    }

    /// Current access token, refreshed first if it is about to expire.
    pub async fn ensure_fresh_token(&self) -> Result<String, AuthError> {
        let current = {
            let session = self.inner.session.borrow();
            if !session.is_authenticated() {
                return Err(AuthError::NotAuthenticated);
            }
            session.access_token().map(str::to_owned)
        };

        match current {
            Some(token)
                if !token::expires_within(&token, Utc::now(), self.refresh_leeway) =>
            {
                Ok(token)
            }
            _ => {
                debug!("Access token expired or expiring, refreshing");
                self.refresh_token().await
            }
        }
    }
}
