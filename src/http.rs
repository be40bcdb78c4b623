//! Shared HTTP plumbing for the remote services
//!
//! All three integrations use the same client setup and the same mapping
//! from non-success responses to [`Error`] variants.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::error::Service;
use crate::{Error, Result};

/// User agent sent with every request
const USER_AGENT: &str = concat!("voice-assistant/", env!("CARGO_PKG_VERSION"));

/// Azure-style error envelope: `{"error": {"code": "...", "message": "..."}}`
#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Build an HTTP client with the configured timeout
///
/// # Errors
///
/// Returns error if the TLS backend cannot be initialized
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(Error::from)
}

/// Send a request and check its status, tagging every failure with `service`
///
/// # Errors
///
/// Returns `Network` if no response arrives, otherwise as [`check_response`]
pub async fn send(service: Service, request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|source| network_error(service, source))?;
    check_response(service, response).await
}

/// Wrap a transport or body error with the service it came from
#[must_use]
pub fn network_error(service: Service, source: reqwest::Error) -> Error {
    tracing::error!(%service, error = %source, timeout = source.is_timeout(), "request failed");
    Error::Network { service, source }
}

/// Pass successful responses through, turn everything else into an error
///
/// # Errors
///
/// Returns `Unauthorized`, `RateLimited` or `Api` depending on the status
pub async fn check_response(service: Service, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    let err = status_error(service, status, retry_after, &body);
    tracing::error!(%service, status = status.as_u16(), error = %err, "remote service error");
    Err(err)
}

/// Map a failed status and body to an error
fn status_error(
    service: Service,
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> Error {
    let message = error_message(status, body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized {
            service,
            status: status.as_u16(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            service,
            retry_after,
            message,
        },
        _ => Error::Api {
            service,
            status: status.as_u16(),
            message,
        },
    }
}

/// Pull the message out of an error body, falling back to the raw text
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(body) {
        return parsed.error.message;
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}
