use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::model::RelayList;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Why a single relay attempt (or the whole relay list) failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Relay answered with a non-2xx status
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Attempt exceeded the per-attempt timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body was not valid UTF-8
    #[error("Response is not valid UTF-8")]
    InvalidUtf8,
    /// JSON envelope without a usable `contents` field
    #[error("Relay envelope has no contents")]
    MissingContents,
    /// Relay answered 2xx with nothing in the body
    #[error("Empty response body")]
    EmptyBody,
    /// Every relay was tried once and none produced a payload
    #[error("All {0} relays failed")]
    RelaysExhausted(usize),
}

/// Payload from the first relay that produced an acceptable one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayHit<T = String> {
    /// Position of the winning relay in the list (0 = primary).
    pub relay_index: usize,
    /// Feed markup unwrapped from any JSON envelope, or what `accept` made of it.
    pub body: T,
}

/// JSON wrapper used by allorigins-style relays.
#[derive(Debug, Deserialize)]
struct RelayEnvelope {
    contents: Option<serde_json::Value>,
    // Present when the relay passed a JSON Feed through unwrapped.
    items: Option<serde_json::Value>,
}

/// Builds the proxied request URL for `target` through `template`.
///
/// The target is form-url-encoded and appended verbatim, so templates end
/// with their query key (`...get?url=`) or path separator.
pub fn relay_url(template: &str, target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("{}{}", template, encoded)
}

/// Fetches `target_url` through `relays`, trying each one once, in order.
///
/// Each attempt is bounded by `timeout` (request and body together). A relay
/// is kept only if it answers 2xx with a non-empty payload; anything else is
/// logged and the next relay is tried. Attempts never overlap.
///
/// # Errors
///
/// Returns [`FetchError::RelaysExhausted`] once every relay has failed, or
/// straight away for an empty list.
pub async fn fetch_through_relays(
    client: &reqwest::Client,
    target_url: &str,
    relays: &RelayList,
    timeout: Duration,
) -> Result<RelayHit, FetchError> {
    fetch_through_relays_with(client, target_url, relays, timeout, Ok::<_, Infallible>).await
}

/// Like [`fetch_through_relays`], but a payload only wins if `accept` takes
/// it. A rejected payload is a soft failure of that relay: it is logged and
/// the next relay is tried.
///
/// # Errors
///
/// Returns [`FetchError::RelaysExhausted`] once every relay has failed or had
/// its payload rejected.
pub async fn fetch_through_relays_with<T, E, F>(
    client: &reqwest::Client,
    target_url: &str,
    relays: &RelayList,
    timeout: Duration,
    mut accept: F,
) -> Result<RelayHit<T>, FetchError>
where
    F: FnMut(String) -> Result<T, E>,
    E: fmt::Display,
{
    let total = relays.len();

    for (index, template) in relays.iter().enumerate() {
        let proxied = relay_url(template, target_url);
        tracing::debug!(
            target = %target_url,
            relay = index + 1,
            total = total,
            "Trying relay"
        );

        let attempt = tokio::time::timeout(timeout, fetch_once(client, &proxied)).await;
        match attempt {
            Ok(Ok(body)) => match accept(body) {
                Ok(body) => {
                    return Ok(RelayHit {
                        relay_index: index,
                        body,
                    })
                }
                Err(e) => {
                    tracing::warn!(
                        target = %target_url,
                        relay = index + 1,
                        total = total,
                        error = %e,
                        "Relay payload rejected"
                    );
                }
            },
            Ok(Err(e)) => {
                tracing::warn!(
                    target = %target_url,
                    relay = index + 1,
                    total = total,
                    error = %e,
                    "Relay attempt failed"
                );
            }
            Err(_) => {
                tracing::warn!(
                    target = %target_url,
                    relay = index + 1,
                    total = total,
                    timeout_ms = timeout.as_millis() as u64,
                    error = %FetchError::Timeout,
                    "Relay attempt failed"
                );
            }
        }
    }

    Err(FetchError::RelaysExhausted(total))
}

async fn fetch_once(client: &reqwest::Client, proxied: &str) -> Result<String, FetchError> {
    let response = client
        .get(proxied)
        .header("Accept", "application/json, text/plain, */*")
        .header("Cache-Control", "no-cache")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
    let body = String::from_utf8(bytes).map_err(|_| FetchError::InvalidUtf8)?;
    unwrap_envelope(body)
}

/// Extracts the feed markup from a relay response body.
///
/// - JSON object with a non-empty string `contents` -> that string
/// - JSON object carrying `items` (a JSON Feed) -> the body itself
/// - any other JSON object -> [`FetchError::MissingContents`]
/// - non-JSON, non-blank body -> the body itself (raw pass-through relay)
pub fn unwrap_envelope(body: String) -> Result<String, FetchError> {
    let trimmed = body.trim_start();
    if trimmed.is_empty() {
        return Err(FetchError::EmptyBody);
    }
    if !trimmed.starts_with('{') {
        return Ok(body);
    }

    match serde_json::from_str::<RelayEnvelope>(trimmed) {
        Ok(RelayEnvelope {
            contents: Some(serde_json::Value::String(contents)),
            ..
        }) if !contents.trim().is_empty() => Ok(contents),
        Ok(RelayEnvelope {
            contents: None,
            items: Some(serde_json::Value::Array(_)),
        }) => Ok(body),
        // Not an object we understand: a soft failure like a missing field.
        _ => Err(FetchError::MissingContents),
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
