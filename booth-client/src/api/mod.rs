//! API clients for the booth reservation backend
//!
//! One shared [`ApiClient`] owns the HTTP connection pool; the auth,
//! exhibition and booking clients are cheap views over it.

use booth_core::{BackendConfig, BoothError, BoothResult, ErrorContext};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub mod auth;
pub mod bookings;
pub mod exhibitions;


pub use auth::{AuthBackend, AuthResponse, HttpAuthBackend, ProfileResponse, RawProfile};
pub use bookings::BookingsApi;
pub use exhibitions::ExhibitionsApi;

/// Configuration for API clients
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL for the API, e.g. `http://localhost:5000/api/v1`
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
    /// Additional headers
    pub headers: HashMap<String, String>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self::from_backend(&BackendConfig::default())
    }
}

impl ApiClientConfig {
    /// Build from the `[backend]` section of the configuration
    pub fn from_backend(backend: &BackendConfig) -> Self {
        Self {
            base_url: backend.base_url.clone(),
            timeout_seconds: backend.timeout_seconds,
            user_agent: backend.user_agent.clone(),
            headers: HashMap::new(),
        }
    }

    /// Point the client at another backend
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set additional header
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

/// Response envelope used by every backend endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap `data`, treating its absence as a protocol violation
    pub fn into_data(self, operation: &str) -> BoothResult<T> {
        match self.data {
            Some(data) => Ok(data),
            None => Err(BoothError::Protocol {
                message: self
                    .message
                    .unwrap_or_else(|| format!("Response to {} carried no data", operation)),
                context: ErrorContext::new("api_client").with_operation(operation),
            }),
        }
    }
}

/// Helper function to create HTTP client with common configuration
pub(crate) fn create_http_client(config: &ApiClientConfig) -> BoothResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent).map_err(|e| {
            BoothError::Config {
                message: format!("Invalid user agent: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            }
        })?,
    );
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    for (key, value) in &config.headers {
        let header_name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            BoothError::Config {
                message: format!("Invalid header name '{}': {}", key, e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            }
        })?;

        let header_value =
            reqwest::header::HeaderValue::from_str(value).map_err(|e| BoothError::Config {
                message: format!("Invalid header value for '{}': {}", key, e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            })?;

        headers.insert(header_name, header_value);
    }

    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_seconds))
        .default_headers(headers)
        .build()
        .map_err(|e| BoothError::Config {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })
}

/// Pull a human-readable message out of an error body.
///
/// The backend answers `{"success": false, "message": "..."}`; some
/// middleware answers `{"error": "..."}` or plain text.
pub(crate) fn extract_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        return ["message", "error", "msg"]
            .iter()
            .filter_map(|key| value.get(*key).and_then(|v| v.as_str()))
            .map(str::trim)
            .find(|message| !message.is_empty())
            .map(str::to_string);
    }

    // Plain text, but not an HTML error page
    if body.starts_with('<') || body.len() > 200 {
        None
    } else {
        Some(body.to_string())
    }
}

/// Read the status and backend-provided message from a failed response
pub(crate) async fn read_failure(response: reqwest::Response) -> (StatusCode, Option<String>) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    (status, extract_message(&body))
}

/// Helper function to turn a non-success response into an error
pub(crate) async fn handle_response_error(
    response: reqwest::Response,
    operation: &str,
) -> BoothError {
    let (status, message) = read_failure(response).await;

    BoothError::Api {
        message: message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        }),
        status: status.as_u16(),
        context: ErrorContext::new("api_client")
            .with_operation(operation)
            .with_suggestion(match status.as_u16() {
                401 => "Log in again; the session may have expired",
                403 => "This action requires an administrator account",
                404 => "The requested resource does not exist",
                _ => "Check network connectivity and API status",
            }),
    }
}

/// Shared HTTP access to the backend
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    config: Arc<ApiClientConfig>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: ApiClientConfig) -> BoothResult<Self> {
        let client = create_http_client(&config)?;
        debug!("Created booth API client for {}", config.base_url);

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    /// Auth endpoints as an [`AuthBackend`]
    pub fn auth(&self) -> HttpAuthBackend {
        HttpAuthBackend::from_client(self.clone())
    }

    pub fn exhibitions(&self) -> ExhibitionsApi {
        ExhibitionsApi::new(self.clone())
    }

    pub fn bookings(&self) -> BookingsApi {
        BookingsApi::new(self.clone())
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Send a request and return the raw response; only transport failures are errors
    pub(crate) async fn send(
        &self,
        method: Method,
        endpoint: &str,
        token: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> BoothResult<reqwest::Response> {
        let url = self.url(endpoint);
        debug!(method = %method, url = %url, authenticated = token.is_some(), "Sending backend request");

        let mut request = self.client.request(method, &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(|e| BoothError::Network {
            message: if e.is_timeout() {
                format!("Request to {} timed out", url)
            } else {
                format!("Failed to reach {}: {}", url, e)
            },
            source: Some(Box::new(e)),
            context: ErrorContext::new("api_client")
                .with_operation(endpoint)
                .with_suggestion("Check network connectivity and the backend URL"),
        })
    }

    /// Send a request, check the status and decode the JSON body
    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        token: Option<&str>,
        body: Option<&serde_json::Value>,
        operation: &str,
    ) -> BoothResult<T> {
        let response = self.send(method, endpoint, token, body).await?;

        if !response.status().is_success() {
            return Err(handle_response_error(response, operation).await);
        }

        decode_json(response, operation).await
    }
}

/// Decode a successful response body
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
    operation: &str,
) -> BoothResult<T> {
    let bytes = response.bytes().await.map_err(|e| BoothError::Network {
        message: format!("Failed to read response body: {}", e),
        source: Some(Box::new(e)),
        context: ErrorContext::new("api_client").with_operation(operation),
    })?;

    serde_json::from_slice(&bytes).map_err(|e| BoothError::Protocol {
        message: format!("Unexpected response body for {}: {}", operation, e),
        context: ErrorContext::new("api_client").with_operation(operation),
    })
}

/// Token required by an endpoint
pub(crate) fn require_token<'a>(token: &'a str, operation: &str) -> BoothResult<&'a str> {
    if token.trim().is_empty() {
        return Err(BoothError::Authentication {
            message: "You need to log in first".to_string(),
            context: ErrorContext::new("api_client").with_operation(operation),
        });
    }
    Ok(token)
}

/// Path segment escaping for backend ids
pub(crate) fn escape_id(id: &str) -> BoothResult<String> {
    let id = id.trim();
    if id.is_empty() {
        return Err(booth_core::validation_error!(
            "id must not be empty",
            "id",
            "api_client"
        ));
    }

    Ok(urlencoding::encode(id).into_owned())
}
