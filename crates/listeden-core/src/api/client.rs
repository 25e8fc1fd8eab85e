//! API client for communicating with the listeden REST API.
//!
//! Every request built here passes through [`ApiClient::authorize`], which
//! reads the token store and adds `Authorization: Bearer <token>` when a
//! session exists.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::TokenStore;
use crate::models::{AuthResponse, AuthResult, LoginRequest, RegisterRequest, Registration};

// ============================================================================
// Constants
// ============================================================================

/// Backend address used when nothing is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

const LOGIN_PATH: &str = "/api/auth/login";
const REGISTER_PATH: &str = "/api/auth/register";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// API client for the listeden backend.
/// Clone is cheap - reqwest::Client and the store are both behind Arcs.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
}

impl ApiClient {
    /// Create a client that reads its bearer token from `store`
    pub fn new(base_url: &str, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, store, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: &str,
        store: Arc<dyn TokenStore>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = Self::normalize_base_url(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            store,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn normalize_base_url(base_url: &str) -> Result<String, ApiError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let url = Url::parse(trimmed)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", trimmed, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                trimmed,
                url.scheme()
            )));
        }
        Ok(trimmed.to_string())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request against a path on the configured backend.
    /// The bearer header is added later, in [`ApiClient::send`].
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Attach the current session token, if any.
    ///
    /// A store failure never blocks the request; it goes out unauthenticated.
    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.store.read().await {
            Ok(Some(token)) => request.bearer_auth(token.as_str()),
            Ok(None) => request,
            Err(e) => {
                warn!(error = %e, "Could not read session token, sending request without it");
                request
            }
        }
    }

    /// Authorize and send a request, mapping non-2xx responses to errors.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.authorize(request).await.send().await?;
        Self::check_response(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    // ===== Authentication =====

    /// Exchange an identifier (email or username) and secret for a session token
    pub async fn login(&self, identifier: &str, secret: &str) -> AuthResult {
        debug!(identifier, "Sending login request");
        self.authenticate(LOGIN_PATH, &LoginRequest { identifier, secret })
            .await
    }

    /// Create an account and receive a session token for it
    pub async fn register(&self, registration: &Registration) -> AuthResult {
        debug!(username = %registration.username, "Sending register request");
        self.authenticate(REGISTER_PATH, &RegisterRequest::from(registration))
            .await
    }

    async fn authenticate<B: Serialize>(&self, path: &str, body: &B) -> AuthResult {
        match self.post_auth(path, body).await {
            Ok(response) => {
                debug!(path, "Authentication succeeded");
                response.into()
            }
            Err(e) => {
                warn!(path, status = ?e.status(), error = %e, "Authentication failed");
                e.into()
            }
        }
    }

    async fn post_auth<B: Serialize>(&self, path: &str, body: &B) -> Result<AuthResponse, ApiError> {
        let request = self.request(Method::POST, path).json(body);
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        match serde_json::from_str::<AuthResponse>(&text) {
            Ok(auth) if !auth.token.is_empty() => Ok(auth),
            Ok(_) => Err(ApiError::EmptyResponse { status }),
            Err(e) => {
                debug!(error = %e, "Auth response body has no token");
                Err(ApiError::EmptyResponse { status })
            }
        }
    }

    // ===== Authenticated endpoints =====

    /// GET a JSON resource with the current session attached
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::Decode(format!("{} (from {})", e, path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::{EMPTY_RESPONSE, UNKNOWN_ERROR};
    use crate::auth::MemoryTokenStore;
    use crate::models::SessionToken;
    use crate::test_support::FlakyTokenStore;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, store: Arc<dyn TokenStore>) -> ApiClient {
        ApiClient::new(&server.uri(), store).unwrap()
    }

    /// Mount a mock that fails the test if any request carries a bearer header.
    async fn forbid_authorization_header(server: &MockServer) {
        Mock::given(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(418))
            .expect(0)
            .mount(server)
            .await;
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            ApiClient::normalize_base_url("http://10.0.2.2:8080/").unwrap(),
            "http://10.0.2.2:8080"
        );
        assert!(matches!(
            ApiClient::normalize_base_url("not a url"),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            ApiClient::normalize_base_url("ftp://example.com"),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_login_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({"identifier": "a@b.com", "secret": "x"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"token": "abc", "message": "welcome"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
        let result = client.login("a@b.com", "x").await;

        assert_eq!(
            result,
            AuthResult::Success {
                token: SessionToken::new("abc"),
                message: "welcome".to_string(),
                user_id: None,
                username: None,
            }
        );
    }

    #[tokio::test]
    async fn test_login_with_numeric_user_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"token": "abc", "userId": 42})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
        let result = client.login("a@b.com", "x").await;

        assert_eq!(result.token(), Some(&SessionToken::new("abc")));
        match result {
            AuthResult::Success { user_id, .. } => assert_eq!(user_id.as_deref(), Some("42")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_unauthorized_uses_body_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_credentials"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
        let result = client.login("a@b.com", "x").await;

        assert_eq!(result, AuthResult::error("invalid_credentials", Some(401)));
    }

    #[tokio::test]
    async fn test_login_server_error_without_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
        let result = client.login("a@b.com", "x").await;

        assert_eq!(result, AuthResult::error(UNKNOWN_ERROR, Some(503)));
    }

    #[tokio::test]
    async fn test_login_empty_or_unparseable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"token": "", "message": "ok"})))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryTokenStore::new()));

        let result = client.login("a@b.com", "x").await;
        assert_eq!(result, AuthResult::error(EMPTY_RESPONSE, Some(200)));

        let result = client
            .register(&Registration::new("ayse", "ayse@example.com", "pw"))
            .await;
        assert_eq!(result, AuthResult::error(EMPTY_RESPONSE, Some(201)));
    }

    #[tokio::test]
    async fn test_login_transport_failure_has_no_code() {
        // Nothing listens on port 1
        let client = ApiClient::with_timeout(
            "http://127.0.0.1:1",
            Arc::new(MemoryTokenStore::new()),
            Duration::from_secs(5),
        )
        .unwrap();

        match client.login("a@b.com", "x").await {
            AuthResult::Error { message, code } => {
                assert!(message.starts_with("connection error"), "{}", message);
                assert_eq!(code, None);
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_sends_camel_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register"))
            .and(body_json(json!({
                "username": "ayse",
                "email": "ayse@example.com",
                "secret": "pw",
                "firstName": "Ayse",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "token": "reg-token",
                "message": "registered",
                "userId": "7",
                "username": "ayse",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
        let registration = Registration::new("ayse", "ayse@example.com", "pw")
            .with_name(Some("Ayse".to_string()), None);
        let result = client.register(&registration).await;

        assert_eq!(
            result,
            AuthResult::Success {
                token: SessionToken::new("reg-token"),
                message: "registered".to_string(),
                user_id: Some("7".to_string()),
                username: Some("ayse".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_requests_carry_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/shoppinglists"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "def"})))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token(SessionToken::new("abc")));
        let client = client_for(&server, store);

        let lists: serde_json::Value = client.get_json("/api/shoppinglists").await.unwrap();
        assert_eq!(lists, json!([{"id": 1}]));

        // Auth endpoints go through the same interceptor
        assert!(client.login("a@b.com", "x").await.is_success());
    }

    #[tokio::test]
    async fn test_empty_store_sends_no_authorization_header() {
        let server = MockServer::start().await;
        forbid_authorization_header(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/shoppinglists"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
        let lists: Vec<serde_json::Value> = client.get_json("/api/shoppinglists").await.unwrap();
        assert!(lists.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_does_not_block_request() {
        let server = MockServer::start().await;
        forbid_authorization_header(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(FlakyTokenStore::broken()));
        let users: Vec<serde_json::Value> = client.get_json("/api/users").await.unwrap();
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_get_json_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized: Full authentication is required"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/shoppinglists"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryTokenStore::new()));

        match client.get_json::<serde_json::Value>("/api/users").await {
            Err(ApiError::Server { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Unauthorized: Full authentication is required");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(matches!(
            client.get_json::<serde_json::Value>("/api/shoppinglists").await,
            Err(ApiError::Decode(_))
        ));
    }
}
