//! Auth endpoints: login, current user, logout and registration

use async_trait::async_trait;
use booth_core::{BoothError, BoothResult, ErrorContext, Registration};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{decode_json, handle_response_error, read_failure, ApiClient, ApiClientConfig};

/// Account fields as the backend sends them, before normalization.
///
/// Every field is optional because different backend versions fill
/// different subsets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProfile {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tel: Option<String>,
    #[serde(
        rename = "createdAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<String>,
}

impl RawProfile {
    /// Backend id, preferring `_id` over `id`; blank ids count as missing
    pub fn identifier(&self) -> Option<&str> {
        [self.object_id.as_deref(), self.id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|id| !id.is_empty())
    }
}

/// Body of `POST /auth/login` and `POST /auth/register`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Full profile, on backends that embed it under `data`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Full profile, on backends that embed it under `user`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
    /// Identity fields sent at the top level
    #[serde(flatten)]
    pub profile: RawProfile,
}

impl AuthResponse {
    /// Non-empty bearer token, if the backend issued one
    pub fn bearer_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Identity carried by the response itself.
    ///
    /// Checks `data`, then `user`, then the top-level fields, and returns
    /// the first candidate that has an id.
    pub fn embedded_profile(&self) -> Option<RawProfile> {
        let nested = [self.data.as_ref(), self.user.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|value| serde_json::from_value::<RawProfile>(value.clone()).ok());

        nested
            .chain(std::iter::once(self.profile.clone()))
            .find(|profile| profile.identifier().is_some())
    }
}

/// Body of `GET /auth/me`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RawProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Authentication backend consumed by the session layer
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// `POST /auth/login`. Non-success answers are `Authentication` errors.
    async fn login(&self, email: &str, password: &str) -> BoothResult<AuthResponse>;

    /// `GET /auth/me` with the given bearer token
    async fn current_user(&self, token: &str) -> BoothResult<ProfileResponse>;

    /// `GET /auth/logout` with the given bearer token
    async fn logout(&self, token: &str) -> BoothResult<()>;

    /// `POST /auth/register`
    async fn register(&self, registration: &Registration) -> BoothResult<AuthResponse>;
}

/// [`AuthBackend`] speaking HTTP to the real backend
#[derive(Clone)]
pub struct HttpAuthBackend {
    client: ApiClient,
}

impl HttpAuthBackend {
    /// Create a new auth backend with its own HTTP client
    pub fn new(config: ApiClientConfig) -> BoothResult<Self> {
        let client = ApiClient::new(config)?;
        info!("Created HTTP auth backend for {}", client.config().base_url);
        Ok(Self { client })
    }

    pub(crate) fn from_client(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, email: &str, password: &str) -> BoothResult<AuthResponse> {
        debug!("Posting credentials to auth/login");

        let body = serde_json::json!({ "email": email, "password": password });
        let response = self
            .client
            .send(Method::POST, "auth/login", None, Some(&body))
            .await?;

        if !response.status().is_success() {
            let (status, message) = read_failure(response).await;
            return Err(BoothError::Authentication {
                message: message.unwrap_or_else(|| "Login failed".to_string()),
                context: ErrorContext::new("http_auth_backend")
                    .with_operation("login")
                    .with_metadata("status", &status.as_u16().to_string())
                    .with_suggestion("Check the email address and password"),
            });
        }

        decode_json(response, "login").await
    }

    async fn current_user(&self, token: &str) -> BoothResult<ProfileResponse> {
        debug!("Fetching current user from auth/me");

        let response = self
            .client
            .send(Method::GET, "auth/me", Some(token), None)
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            let (_, message) = read_failure(response).await;
            return Err(BoothError::Authentication {
                message: message.unwrap_or_else(|| "Session is no longer valid".to_string()),
                context: ErrorContext::new("http_auth_backend")
                    .with_operation("current_user")
                    .with_metadata("status", &status.as_u16().to_string())
                    .with_suggestion("Log in again"),
            });
        }
        if !status.is_success() {
            return Err(handle_response_error(response, "current_user").await);
        }

        decode_json(response, "current_user").await
    }

    async fn logout(&self, token: &str) -> BoothResult<()> {
        let response = self
            .client
            .send(Method::GET, "auth/logout", Some(token), None)
            .await?;

        if !response.status().is_success() {
            return Err(handle_response_error(response, "logout").await);
        }

        Ok(())
    }

    async fn register(&self, registration: &Registration) -> BoothResult<AuthResponse> {
        info!(email = %registration.email, role = %registration.role, "Registering account");

        let body = serde_json::to_value(registration)?;
        self.client
            .request(Method::POST, "auth/register", None, Some(&body), "register")
            .await
    }
}
