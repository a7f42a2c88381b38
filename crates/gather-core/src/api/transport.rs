//! HTTP transport seam for the API client.
//!
//! The client is generic over [`HttpTransport`] so tests run without a
//! network. A transport only reports *connectivity* failures as errors;
//! non-2xx responses come back as ordinary [`HttpResponse`] values so the
//! client can tell the two apart.

use std::future::Future;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use thiserror::Error;

const HTTP_TIMEOUT_SECS: u64 = 10;

/// A single outgoing API request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
    /// Bearer token; `None` for auth-exempt requests
    pub bearer: Option<String>,
}

/// The server's answer, whatever its status
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

/// No network path to the server (distinct from HTTP error responses)
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Executes HTTP requests against the remote API
pub trait HttpTransport: Send + Sync {
    /// Send the request; `Err` means connectivity failure only
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// Production transport backed by reqwest
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|error| TransportError(error.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .header("Accept", "application/json");
        if let Some(body) = request.body {
            builder = builder.json(&body);
        }
        if let Some(token) = request.bearer {
            builder = builder.bearer_auth(token);
        }

        async move {
            let response = builder
                .send()
                .await
                .map_err(|error| TransportError(error.to_string()))?;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Ok(HttpResponse { status, body })
        }
    }
}
