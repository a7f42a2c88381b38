//! Typed API client with transparent single-flight token refresh.
//!
//! A 401 on a non-exempt request triggers exactly one refresh call per
//! burst: the first request to see the 401 takes the refresh lock and
//! refreshes; every other request that 401s while the refresh is in flight
//! waits on the lock and retries with the new token. Callers never observe
//! the difference between "succeeded first try" and "succeeded after
//! refresh".

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::error::Error;
use crate::models::{Event, EventId};
use crate::util::{compact_text, is_http_url};

use super::session::{TokenPair, TokenStore, UserProfile};
use super::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Failures surfaced to API callers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid client configuration
    #[error("Invalid API configuration: {0}")]
    InvalidConfiguration(&'static str),
    /// No network path to the server
    #[error("Network unreachable: {0}")]
    Network(String),
    /// Server reachable but returned a non-2xx response
    #[error("{message} ({status})")]
    Api { status: u16, message: String },
    /// Token refresh failed; the session is gone
    #[error("Session expired, please sign in again")]
    SessionExpired,
    /// Response body did not match the expected shape
    #[error("Invalid response payload: {0}")]
    InvalidPayload(String),
    /// Token persistence failed
    #[error("Session storage error: {0}")]
    Storage(String),
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::Storage(error.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Whether a request participates in token attachment and 401 refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    /// Attach the bearer token; a 401 triggers the refresh flow
    Required,
    /// Skip token attachment and refresh handling (the auth endpoints
    /// themselves, to avoid recursion)
    Exempt,
}

/// Client for the Gather REST API
pub struct ApiClient<T: HttpTransport> {
    base_url: String,
    transport: T,
    tokens: TokenStore,
    refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped whenever a refresh settles (success or failure); lets waiters
    /// detect that their burst was already handled
    refresh_generation: AtomicU64,
}

impl<T: HttpTransport> ApiClient<T> {
    pub fn new(
        base_url: impl AsRef<str>,
        transport: T,
        tokens: TokenStore,
    ) -> ApiResult<Self> {
        let base_url = base_url.as_ref().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::InvalidConfiguration(
                "API base URL must not be empty",
            ));
        }
        if !is_http_url(&base_url) {
            return Err(ApiError::InvalidConfiguration(
                "API base URL must include http:// or https://",
            ));
        }

        Ok(Self {
            base_url,
            transport,
            tokens,
            refresh_lock: tokio::sync::Mutex::new(()),
            refresh_generation: AtomicU64::new(0),
        })
    }

    /// The token store backing this client (for identity side-reads)
    #[must_use]
    pub fn token_store(&self) -> &TokenStore {
        &self.tokens
    }

    // --- auth endpoints -----------------------------------------------------

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> ApiResult<UserProfile> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
            "name": name,
        });
        let auth: AuthPayload = self
            .request(Method::POST, "/auth/register", Some(payload), Auth::Exempt)
            .await?;
        self.store_session(&auth)?;
        Ok(auth.user)
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<UserProfile> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });
        let auth: AuthPayload = self
            .request(Method::POST, "/auth/login", Some(payload), Auth::Exempt)
            .await?;
        self.store_session(&auth)?;
        Ok(auth.user)
    }

    /// End the session. The server call is best-effort; local tokens are
    /// cleared regardless.
    pub async fn logout(&self) -> ApiResult<()> {
        let result = self
            .request_ack(Method::POST, "/auth/logout", None, Auth::Required)
            .await;
        if let Err(error) = &result {
            tracing::warn!("Logout request failed, clearing local session anyway: {error}");
        }
        self.tokens.clear()?;
        Ok(())
    }

    pub async fn me(&self) -> ApiResult<UserProfile> {
        self.request(Method::GET, "/auth/me", None, Auth::Required)
            .await
    }

    // --- event endpoints ----------------------------------------------------

    pub async fn list_events(&self) -> ApiResult<Vec<Event>> {
        self.request(Method::GET, "/events", None, Auth::Required)
            .await
    }

    pub async fn get_event(&self, id: &EventId) -> ApiResult<Event> {
        self.request(Method::GET, &format!("/events/{id}"), None, Auth::Required)
            .await
    }

    pub async fn create_event(&self, event: &Event) -> ApiResult<Event> {
        let payload = serde_json::to_value(event).map_err(|e| {
            ApiError::InvalidPayload(e.to_string())
        })?;
        self.request(Method::POST, "/events", Some(payload), Auth::Required)
            .await
    }

    pub async fn update_event(&self, event: &Event) -> ApiResult<Event> {
        let payload = serde_json::to_value(event).map_err(|e| {
            ApiError::InvalidPayload(e.to_string())
        })?;
        self.request(
            Method::PUT,
            &format!("/events/{}", event.id),
            Some(payload),
            Auth::Required,
        )
        .await
    }

    pub async fn delete_event(&self, id: &EventId) -> ApiResult<()> {
        self.request_ack(
            Method::DELETE,
            &format!("/events/{id}"),
            None,
            Auth::Required,
        )
        .await
    }

    pub async fn join_event(&self, id: &EventId) -> ApiResult<()> {
        self.request_ack(
            Method::POST,
            &format!("/events/{id}/join"),
            None,
            Auth::Required,
        )
        .await
    }

    pub async fn leave_event(&self, id: &EventId) -> ApiResult<()> {
        self.request_ack(
            Method::POST,
            &format!("/events/{id}/leave"),
            None,
            Auth::Required,
        )
        .await
    }

    pub async fn participants(&self, id: &EventId) -> ApiResult<Vec<UserProfile>> {
        self.request(
            Method::GET,
            &format!("/events/{id}/participants"),
            None,
            Auth::Required,
        )
        .await
    }

    // --- request plumbing ---------------------------------------------------

    async fn request<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        auth: Auth,
    ) -> ApiResult<R> {
        let response = self.request_raw(method, path, body, auth).await?;
        decode(&response)
    }

    /// Like [`Self::request`] but for endpoints whose envelope carries no
    /// payload worth decoding
    async fn request_ack(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        auth: Auth,
    ) -> ApiResult<()> {
        let response = self.request_raw(method, path, body, auth).await?;
        decode_ack(&response)
    }

    async fn request_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        auth: Auth,
    ) -> ApiResult<HttpResponse> {
        if auth == Auth::Exempt {
            return self.execute(method, path, body, None).await;
        }

        let bearer = self.tokens.access_token()?;
        let observed_generation = self.refresh_generation.load(Ordering::SeqCst);
        let response = self
            .execute(method.clone(), path, body.clone(), bearer)
            .await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let token = self.refreshed_token(observed_generation).await?;
        let retry = self.execute(method, path, body, Some(token)).await?;
        if retry.status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::SessionExpired);
        }
        Ok(retry)
    }

    /// Settle a 401 burst: exactly one caller performs the refresh, everyone
    /// else waits on the lock and reuses the outcome.
    async fn refreshed_token(&self, observed_generation: u64) -> ApiResult<String> {
        let _guard = self.refresh_lock.lock().await;

        if self.refresh_generation.load(Ordering::SeqCst) != observed_generation {
            // A refresh settled while we waited; reuse its outcome
            return self.tokens.access_token()?.ok_or(ApiError::SessionExpired);
        }

        let outcome = self.perform_refresh().await;
        self.refresh_generation.fetch_add(1, Ordering::SeqCst);
        match outcome {
            Ok(token) => Ok(token),
            Err(error) => {
                tracing::warn!("Token refresh failed: {error}");
                self.tokens.clear()?;
                Err(ApiError::SessionExpired)
            }
        }
    }

    async fn perform_refresh(&self) -> ApiResult<String> {
        let Some(pair) = self.tokens.load()? else {
            return Err(ApiError::SessionExpired);
        };

        let payload = serde_json::json!({ "refreshToken": pair.refresh_token });
        let response = self
            .execute(Method::POST, "/auth/refresh", Some(payload), None)
            .await?;
        let auth: AuthPayload = decode(&response)?;
        self.store_session(&auth)?;
        Ok(auth.access_token)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        bearer: Option<String>,
    ) -> ApiResult<HttpResponse> {
        let request = HttpRequest {
            method,
            url: format!("{}{path}", self.base_url),
            body,
            bearer,
        };
        self.transport
            .execute(request)
            .await
            .map_err(|error| ApiError::Network(error.0))
    }

    fn store_session(&self, auth: &AuthPayload) -> ApiResult<()> {
        self.tokens.save(&TokenPair {
            access_token: auth.access_token.clone(),
            refresh_token: auth.refresh_token.clone(),
        })?;
        self.tokens.save_user(&auth.user)?;
        Ok(())
    }
}

// --- wire format ------------------------------------------------------------

/// Standard response envelope: `{ success, data, error: { message } }`
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    access_token: String,
    refresh_token: String,
    user: UserProfile,
}

fn decode<R: DeserializeOwned>(response: &HttpResponse) -> ApiResult<R> {
    if !response.status.is_success() {
        return Err(api_error(response));
    }
    let envelope: ApiEnvelope<R> = serde_json::from_str(&response.body)
        .map_err(|error| ApiError::InvalidPayload(error.to_string()))?;
    if !envelope.success {
        return Err(api_error(response));
    }
    envelope
        .data
        .ok_or_else(|| ApiError::InvalidPayload("envelope did not include data".to_string()))
}

fn decode_ack(response: &HttpResponse) -> ApiResult<()> {
    if !response.status.is_success() {
        return Err(api_error(response));
    }
    Ok(())
}

fn api_error(response: &HttpResponse) -> ApiError {
    let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&response.body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| error.message)
        .unwrap_or_else(|| {
            let trimmed = compact_text(&response.body);
            if trimmed.is_empty() {
                format!("HTTP {}", response.status.as_u16())
            } else {
                trimmed
            }
        });
    ApiError::Api {
        status: response.status.as_u16(),
        message,
    }
}
