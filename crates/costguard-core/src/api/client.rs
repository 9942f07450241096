//! API client for communicating with the CostGuard REST API.
//!
//! This module provides the `ApiClient` struct, the reqwest-backed
//! implementation of [`AuthTransport`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::{Navigator, TokenSlot, TokenStore};
use crate::config::Config;
use crate::models::{
    AuthResponse, ProfileResponse, RefreshRequest, RefreshResponse, SignInRequest, SignUpRequest,
    UserProfile,
};

use super::{
    ApiError, AuthTransport, AUTH_PROFILE, AUTH_REFRESH, AUTH_SIGNIN, AUTH_SIGNUP,
    PUBLIC_AUTH_ENDPOINTS, SESSION_PRESERVING_ENDPOINTS,
};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Strip any query string so endpoint allow-lists match on the path alone.
fn endpoint_path(endpoint: &str) -> &str {
    endpoint.split('?').next().unwrap_or(endpoint)
}

fn is_public_endpoint(endpoint: &str) -> bool {
    PUBLIC_AUTH_ENDPOINTS.contains(&endpoint_path(endpoint))
}

fn preserves_session(endpoint: &str) -> bool {
    SESSION_PRESERVING_ENDPOINTS.contains(&endpoint_path(endpoint))
}

/// API client for CostGuard.
/// Clone is cheap - reqwest::Client and the shared store/navigator are Arc'd.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    initial_backoff: Duration,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            navigator,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// First delay after a 429; each further retry doubles it.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        Self::new(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
            store,
            navigator,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stored access token for an endpoint, or `None` for public endpoints.
    fn token_for(&self, endpoint: &str) -> Option<String> {
        if is_public_endpoint(endpoint) {
            return None;
        }
        match self.store.get_present(TokenSlot::AccessToken) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read access token, sending unauthenticated");
                None
            }
        }
    }

    /// Global 401 hook: drop stored credentials and return to login.
    fn handle_unauthorized(&self, endpoint: &str) {
        if preserves_session(endpoint) {
            debug!(endpoint, "401 from account-linking endpoint, keeping session");
            return;
        }
        warn!(endpoint, "Received 401, clearing stored credentials");
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear token store");
        }
        self.navigator.redirect_to_login();
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors. Once `can_retry` is false a 429 is an error too.
    async fn check_response_for_retry(
        &self,
        endpoint: &str,
        response: reqwest::Response,
        can_retry: bool,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(Some(response));
        }
        if status.as_u16() == 429 && can_retry {
            return Ok(None);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(endpoint, status = status.as_u16(), "Request failed");
        if status.as_u16() == 401 {
            self.handle_unauthorized(endpoint);
        }
        Err(ApiError::from_status(status, &body))
    }

    async fn send<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let token = self.token_for(endpoint);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            debug!(method = %method, url = %url, authenticated = token.is_some(), "Sending request");

            let mut request = self.client.request(method.clone(), &url);
            if let Some(ref token) = token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(|e| {
                warn!(url = %url, error = %e, "Request did not complete");
                ApiError::from(e)
            })?;

            let can_retry = retries < MAX_RATE_LIMIT_RETRIES;
            match self.check_response_for_retry(endpoint, response, can_retry).await? {
                Some(response) => return Ok(response.json().await?),
                None => {
                    retries += 1;
                    warn!(
                        url = %url,
                        retry = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.send::<T, ()>(Method::GET, endpoint, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::POST, endpoint, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.send::<T, ()>(Method::DELETE, endpoint, None).await
    }
}

#[async_trait]
impl AuthTransport for ApiClient {
    async fn sign_up(&self, request: &SignUpRequest<'_>) -> Result<AuthResponse, ApiError> {
        self.post(AUTH_SIGNUP, request).await
    }

    async fn sign_in(&self, request: &SignInRequest<'_>) -> Result<AuthResponse, ApiError> {
        self.post(AUTH_SIGNIN, request).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        self.post(AUTH_REFRESH, &RefreshRequest { refresh_token }).await
    }

    async fn profile(&self) -> Result<UserProfile, ApiError> {
        let response: ProfileResponse = self.get(AUTH_PROFILE).await?;
        Ok(response.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryTokenStore, Router};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn signed_in_store() -> Arc<MemoryTokenStore> {
        let store = Arc::new(MemoryTokenStore::new());
        store.set(TokenSlot::AccessToken, "t1").unwrap();
        store.set(TokenSlot::RefreshToken, "r1").unwrap();
        store.set(TokenSlot::User, r#"{"userId":"u1","email":"a@b.com"}"#).unwrap();
        store
    }

    fn client_for(server: &MockServer, store: Arc<MemoryTokenStore>, router: Arc<Router>) -> ApiClient {
        ApiClient::new(&server.uri(), Duration::from_secs(5), store, router).unwrap()
    }

    #[test]
    fn test_endpoint_classification() {
        assert!(is_public_endpoint("/auth/signin"));
        assert!(is_public_endpoint("/auth/signup?invite=1"));
        assert!(!is_public_endpoint("/auth/profile"));
        assert!(preserves_session("/aws/validate-account"));
        assert!(!preserves_session("/budget"));
    }

    #[tokio::test]
    async fn test_profile_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/profile"))
            .and(header("authorization", "Bearer t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "ok",
                "user": { "userId": "u1", "email": "a@b.com", "firstName": "Ada" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, signed_in_store(), Arc::new(Router::new("/")));
        let user = client.profile().await.unwrap();
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.first_name, "Ada");
    }

    #[tokio::test]
    async fn test_sign_in_never_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/signin"))
            .and(body_json(json!({ "email": "a@b.com", "password": "pw" })))
            .respond_with(|req: &Request| {
                if req.headers.contains_key("authorization") {
                    ResponseTemplate::new(400)
                } else {
                    ResponseTemplate::new(200).set_body_json(json!({
                        "tokens": { "accessToken": "t2", "refreshToken": "r2" },
                        "user": { "userId": "u1", "email": "a@b.com" }
                    }))
                }
            })
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, signed_in_store(), Arc::new(Router::new("/login")));
        let response = client
            .sign_in(&SignInRequest { email: "a@b.com", password: "pw" })
            .await
            .unwrap();
        assert_eq!(response.access_token(), Some("t2"));
    }

    #[tokio::test]
    async fn test_refresh_posts_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(body_json(json!({ "refreshToken": "r1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "t3", "expiresIn": 3600 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, signed_in_store(), Arc::new(Router::new("/")));
        let response = client.refresh("r1").await.unwrap();
        assert_eq!(response.token, "t3");
        assert_eq!(response.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn test_unauthorized_clears_store_and_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/budget"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"message":"Token expired"}"#))
            .mount(&server)
            .await;

        let store = signed_in_store();
        let router = Arc::new(Router::new("/budgets"));
        let client = client_for(&server, Arc::clone(&store), Arc::clone(&router));

        let err = client.get::<serde_json::Value>("/budget").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.body(), Some(r#"{"message":"Token expired"}"#));
        assert!(store.is_empty());
        assert_eq!(router.current_route(), "/login");
    }

    #[tokio::test]
    async fn test_account_linking_401_keeps_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/aws/validate-account"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid AWS keys"))
            .mount(&server)
            .await;

        let store = signed_in_store();
        let router = Arc::new(Router::new("/settings"));
        let client = client_for(&server, Arc::clone(&store), Arc::clone(&router));

        let err = client
            .post::<serde_json::Value, _>("/aws/validate-account", &json!({ "accessKeyId": "AKIA" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { .. }));
        assert_eq!(store.get(TokenSlot::AccessToken).unwrap().as_deref(), Some("t1"));
        assert!(router.history().is_empty());
    }

    #[tokio::test]
    async fn test_forbidden_carries_body_without_sign_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/profile"))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let store = signed_in_store();
        let client = client_for(&server, Arc::clone(&store), Arc::new(Router::new("/")));

        let err = client.profile().await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.body(), Some("permission denied"));
        assert!(!store.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/profile"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": { "userId": "u1", "email": "a@b.com" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, signed_in_store(), Arc::new(Router::new("/")))
            .with_initial_backoff(Duration::from_millis(5));
        let user = client.profile().await.unwrap();
        assert_eq!(user.user_id, "u1");
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/profile"))
            .respond_with(ResponseTemplate::new(429).set_body_string(r#"{"message":"slow down"}"#))
            .expect(u64::from(MAX_RATE_LIMIT_RETRIES) + 1)
            .mount(&server)
            .await;

        let client = client_for(&server, signed_in_store(), Arc::new(Router::new("/")))
            .with_initial_backoff(Duration::from_millis(5));
        let err = client.profile().await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { .. }));
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.body(), Some(r#"{"message":"slow down"}"#));
    }

    #[tokio::test]
    async fn test_malformed_json_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, signed_in_store(), Arc::new(Router::new("/")));
        let err = client.profile().await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = ApiClient::new(
            &uri,
            Duration::from_secs(2),
            signed_in_store(),
            Arc::new(Router::new("/")),
        )
        .unwrap();
        let err = client.profile().await.unwrap_err();
        assert!(err.is_network());
    }
}
