//! HTTP implementation of the remote applier port.
//!
//! Each action is POSTed to `{base_url}/actions` as `{id, type, payload}`
//! with the action id repeated in an `Idempotency-Key` header. Retries are
//! the orchestrator's job, so the client here makes exactly one attempt and
//! only classifies the outcome:
//!
//! | Outcome                             | Classification |
//! |-------------------------------------|----------------|
//! | 2xx                                 | applied; optional `canonical` body |
//! | 408, 429, 5xx, timeout, connect     | transient (`Retry-After` honoured) |
//! | any other status                    | permanent |

use std::time::Duration;

use async_trait::async_trait;
use checksync_core::{ApplyError, RemoteActionApplier};
use checksync_domain::{ActionId, ActionKind, ChecksyncError, RemoteSettings};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::errors::InfraError;

/// Header carrying the action id on every attempt.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Longest response body excerpt kept in an error message.
const BODY_EXCERPT_LEN: usize = 200;

#[derive(Serialize)]
struct ActionRequest<'a> {
    id: &'a ActionId,
    #[serde(flatten)]
    kind: &'a ActionKind,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ActionResponse {
    canonical: Option<Value>,
}

/// [`RemoteActionApplier`] that talks to the checklist API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpActionApplier {
    client: Client,
    endpoint: String,
}

impl HttpActionApplier {
    /// Build a client from the `[remote]` config section.
    pub fn new(settings: &RemoteSettings) -> Result<Self, ChecksyncError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &settings.auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ChecksyncError::Config(format!("invalid auth token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(settings.request_timeout)
            .default_headers(headers)
            .no_proxy()
            .build()
            .map_err(|err| ChecksyncError::from(InfraError::from(err)))?;

        Ok(Self { client, endpoint: format!("{}/actions", settings.base_url.trim_end_matches('/')) })
    }

    /// URL actions are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn classify(response: Response) -> Result<Option<Value>, ApplyError> {
        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await.map_err(|e| {
                ApplyError::transient(format!("failed to read response body: {e}"))
            })?;
            if body.is_empty() {
                return Ok(None);
            }
            return match serde_json::from_slice::<ActionResponse>(&body) {
                Ok(parsed) => Ok(parsed.canonical),
                Err(err) => {
                    warn!(error = %err, "Applied action returned an unreadable body; ignoring it");
                    Ok(None)
                }
            };
        }

        let retry_after = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        let message = describe(status, &body);

        if is_transient(status) {
            Err(ApplyError::Transient { message, retry_after })
        } else {
            Err(ApplyError::Permanent { message, status: Some(status.as_u16()) })
        }
    }
}

#[async_trait]
impl RemoteActionApplier for HttpActionApplier {
    #[instrument(skip(self, kind), fields(action_id = %id, action_type = %kind.action_type()))]
    async fn apply(&self, id: &ActionId, kind: &ActionKind) -> Result<Option<Value>, ApplyError> {
        let request = self
            .client
            .post(&self.endpoint)
            .header(IDEMPOTENCY_HEADER, id.to_string())
            .json(&ActionRequest { id, kind });

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) if err.is_builder() => {
                return Err(ApplyError::permanent(format!("request could not be built: {err}")));
            }
            Err(err) => {
                debug!(error = %err, "Request to remote applier failed");
                return Err(ApplyError::transient(InfraError::from(err).to_string()));
            }
        };

        debug!(status = %response.status(), "Remote applier responded");
        Self::classify(response).await
    }
}

fn is_transient(status: StatusCode) -> bool {
    matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS)
        || status.is_server_error()
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn describe(status: StatusCode, body: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("unknown status");
    let body = body.trim();
    if body.is_empty() {
        return format!("HTTP {} {reason}", status.as_u16());
    }

    let mut end = body.len().min(BODY_EXCERPT_LEN);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("HTTP {} {reason}: {}", status.as_u16(), &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_parses_delta_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 7 "));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn status_classification() {
        assert!(is_transient(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_transient(StatusCode::UNPROCESSABLE_ENTITY));
        assert!(!is_transient(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn request_body_carries_id_type_and_payload() {
        let id = ActionId::new();
        let kind = ActionKind::ChecklistSubmission { checklist_id: "cl-7".into() };
        let body = serde_json::to_value(ActionRequest { id: &id, kind: &kind }).unwrap();

        assert_eq!(body["id"], serde_json::json!(id.to_string()));
        assert_eq!(body["type"], "checklist_submission");
        assert_eq!(body["payload"]["checklist_id"], "cl-7");
    }

    #[test]
    fn describe_truncates_long_bodies() {
        let message = describe(StatusCode::BAD_REQUEST, &"x".repeat(1_000));
        assert!(message.starts_with("HTTP 400 Bad Request: "));
        assert!(message.len() < 260);
    }
}
