//! Outbound fetch seam for the request router.
//!
//! The router is generic over [`Fetcher`] so tests run without a network.
//! Like the API transport in the core crate, a fetcher only reports
//! *connectivity* failures as errors; HTTP error statuses come back as
//! ordinary [`FetchResponse`] values.

use std::future::Future;

use thiserror::Error;

/// What the requesting context intends to do with the response.
///
/// The platform analog is the request destination; it drives both
/// classification and the shape of the offline fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Other,
}

/// An intercepted outgoing request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub destination: Destination,
}

impl FetchRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            destination: Destination::Other,
        }
    }

    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    #[must_use]
    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// A response the router can hand back or cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl FetchResponse {
    #[must_use]
    pub fn ok(content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Synthesized 503 handed out when nothing cached can answer
    #[must_use]
    pub fn offline_json() -> Self {
        let body = serde_json::json!({
            "error": "offline",
            "message": "No network connection available",
        });
        Self {
            status: 503,
            content_type: "application/json".to_string(),
            body: body.to_string().into_bytes(),
        }
    }

    /// Empty 200 for failed image requests, so nothing renders broken
    #[must_use]
    pub fn empty_ok() -> Self {
        Self {
            status: 200,
            content_type: "text/plain".to_string(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// No network path to the server (distinct from HTTP error responses)
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
}

/// Performs the actual network fetch on behalf of the router
pub trait Fetcher: Send + Sync {
    /// Send the request; `Err` means connectivity failure only
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send;
}

/// Production fetcher backed by reqwest
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| FetchError::Network(error.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for ReqwestFetcher {
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let builder = self.client.request(method, &request.url);

        async move {
            let response = builder.send().await.map_err(|error| {
                if error.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Network(error.to_string())
                }
            })?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();
            let body = response
                .bytes()
                .await
                .map_err(|error| FetchError::Network(error.to_string()))?
                .to_vec();
            Ok(FetchResponse {
                status,
                content_type,
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn offline_json_is_a_503_with_a_machine_readable_body() {
        let response = FetchResponse::offline_json();
        assert_eq!(response.status, 503);
        assert!(!response.is_success());
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["error"], "offline");
    }

    #[test]
    fn empty_ok_carries_no_body() {
        let response = FetchResponse::empty_ok();
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
    }

    #[test]
    fn method_check_is_case_insensitive() {
        let mut request = FetchRequest::get("https://example.com/");
        assert!(request.is_get());
        request.method = "get".to_string();
        assert!(request.is_get());
        request.method = "POST".to_string();
        assert!(!request.is_get());
    }
}
