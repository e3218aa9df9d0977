//! Client for the PW learning-platform API: credential gate, batch catalog
//! and per-batch announcement listing.
//!
//! Every remote failure is folded into [`ApiFailure`] at this boundary; no
//! reqwest or serde error escapes the module.
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::model::{Announcement, Batch};

pub mod model;
use model::{Envelope, ErrorBody, VerifyData};

const DEFAULT_API_BASE: &str = "https://api.penpencil.co/";
const REFERER: &str = "https://www.pw.live/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const BATCHES_PATH: &str = "batch-service/v1/batches/purchased-batches?amount=paid&page=1&type=ALL";

/// Failure classification for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Credential rejected; the operator must supply a fresh token.
    Auth,
    /// Network-level or remote-side trouble; retry next cycle.
    Transient,
    /// Response did not match the expected envelope shape. Retryable.
    Malformed,
}

/// Uniform failure shape for every remote-call wrapper.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiFailure {
    pub kind: FailureKind,
    pub message: String,
    pub status: Option<u16>,
}

impl ApiFailure {
    pub fn is_auth(&self) -> bool {
        self.kind == FailureKind::Auth || matches!(self.status, Some(401) | Some(403))
    }

    fn transport(err: &reqwest::Error) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: err.to_string(),
            status: None,
        }
    }

    fn malformed(context: &str) -> Self {
        Self {
            kind: FailureKind::Malformed,
            message: format!("unexpected response shape: {context}"),
            status: None,
        }
    }
}

/// Outcome of the credential gate. `Valid` only when the platform explicitly
/// confirms verification; `Unknown` covers everything where no verdict was
/// received and must be retried rather than treated as a rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Valid,
    Invalid(ApiFailure),
    Unknown(ApiFailure),
}

/// Remote API surface the watcher depends on; implemented by [`PwClient`] and
/// by recording fakes in tests.
#[async_trait]
pub trait PwApi: Send + Sync {
    async fn verify_token(&self) -> TokenStatus;

    async fn list_batches(&self) -> Result<Vec<Batch>, ApiFailure>;

    async fn list_announcements(&self, batch_id: &str) -> Result<Vec<Announcement>, ApiFailure>;
}

#[derive(Clone)]
pub struct PwClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for PwClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PwClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PwClient {
    pub fn new(token: String) -> Self {
        let base_url = Url::parse(DEFAULT_API_BASE).expect("valid default API URL");
        Self::with_base_url(token, base_url)
    }

    pub fn from_config(platform: &crate::config::Platform) -> anyhow::Result<Self> {
        let mut raw = platform.base_url.trim_end_matches('/').to_string();
        raw.push('/');
        let base_url = Url::parse(&raw).context("invalid platform.base_url")?;
        Ok(Self::with_base_url(platform.token.clone(), base_url))
    }

    pub fn with_base_url(token: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("pw-announcer/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
        }
    }

    /// Build a request with the header set the platform expects: JSON content
    /// negotiation, the web-app referer, a fresh `Randomid` and the bearer
    /// token.
    pub fn build_request(&self, method: Method, path: &str) -> Result<reqwest::Request, ApiFailure> {
        let endpoint = self.base_url.join(path).map_err(|err| ApiFailure {
            kind: FailureKind::Transient,
            message: format!("invalid API URL: {err}"),
            status: None,
        })?;
        self.http
            .request(method, endpoint)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("Referer", REFERER)
            .header("Randomid", Uuid::new_v4().to_string())
            .header("Authorization", format!("Bearer {}", self.token))
            .build()
            .map_err(|err| ApiFailure::transport(&err))
    }

    async fn fetch(&self, method: Method, path: &str) -> Result<(StatusCode, String), ApiFailure> {
        let request = self.build_request(method, path)?;
        debug!(url = %request.url(), "platform request");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(|err| ApiFailure::transport(&err))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|err| ApiFailure::transport(&err))?;
        Ok((status, body))
    }

    pub async fn verify_token(&self) -> TokenStatus {
        match self.fetch(Method::POST, "v3/oauth/verify-token").await {
            Ok((status, body)) => interpret_verify(status, &body),
            Err(failure) => TokenStatus::Unknown(failure),
        }
    }

    pub async fn list_batches(&self) -> Result<Vec<Batch>, ApiFailure> {
        let (status, body) = self.fetch(Method::GET, BATCHES_PATH).await?;
        interpret_envelope(status, &body)
    }

    pub async fn list_announcements(&self, batch_id: &str) -> Result<Vec<Announcement>, ApiFailure> {
        let path = format!("v1/batches/{}/announcement?page=1", batch_id);
        let (status, body) = self.fetch(Method::GET, &path).await?;
        interpret_envelope(status, &body)
    }
}

#[async_trait]
impl PwApi for PwClient {
    async fn verify_token(&self) -> TokenStatus {
        PwClient::verify_token(self).await
    }

    async fn list_batches(&self) -> Result<Vec<Batch>, ApiFailure> {
        PwClient::list_batches(self).await
    }

    async fn list_announcements(&self, batch_id: &str) -> Result<Vec<Announcement>, ApiFailure> {
        PwClient::list_announcements(self, batch_id).await
    }
}

/// Interpret a data-bearing response body. Three branches: well-formed
/// success, well-formed error, malformed (always retryable).
fn interpret_envelope<T: DeserializeOwned>(
    http_status: StatusCode,
    body: &str,
) -> Result<T, ApiFailure> {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) => return Err(ApiFailure::malformed("not a JSON envelope")),
    };
    if envelope.success {
        let data = envelope
            .data
            .ok_or_else(|| ApiFailure::malformed("success without data"))?;
        return serde_json::from_value(data)
            .map_err(|_| ApiFailure::malformed("data did not match the expected schema"));
    }
    Err(structured_failure(http_status, envelope.error))
}

fn structured_failure(http_status: StatusCode, error: Option<ErrorBody>) -> ApiFailure {
    let (message, reported) = match error {
        Some(body) => (
            body.message
                .unwrap_or_else(|| "remote reported failure".to_string()),
            body.status,
        ),
        None => ("remote reported failure".to_string(), None),
    };
    let status = reported.or(Some(http_status.as_u16()));
    let kind = match status {
        Some(401) | Some(403) => FailureKind::Auth,
        _ => FailureKind::Transient,
    };
    ApiFailure {
        kind,
        message,
        status,
    }
}

/// Interpret a verify-token response. `Valid` requires an explicit
/// `isVerified: true`; a structured refusal is `Invalid`; anything that could
/// not be read is `Unknown`.
fn interpret_verify(http_status: StatusCode, body: &str) -> TokenStatus {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) => return TokenStatus::Unknown(ApiFailure::malformed("not a JSON envelope")),
    };
    if envelope.success {
        return match envelope.data.map(serde_json::from_value::<VerifyData>) {
            Some(Ok(data)) if data.is_verified => TokenStatus::Valid,
            Some(Ok(_)) => TokenStatus::Invalid(ApiFailure {
                kind: FailureKind::Auth,
                message: "token not verified".to_string(),
                status: Some(401),
            }),
            _ => TokenStatus::Unknown(ApiFailure::malformed("verify payload")),
        };
    }
    let mut failure = structured_failure(http_status, envelope.error);
    failure.kind = FailureKind::Auth;
    if failure.message == "remote reported failure" {
        failure.message = "Unauthorized Access".to_string();
    }
    TokenStatus::Invalid(failure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_confirmed_is_valid() {
        let body = r#"{ "success": true, "data": { "isVerified": true } }"#;
        assert_eq!(interpret_verify(StatusCode::OK, body), TokenStatus::Valid);
    }

    #[test]
    fn verify_structured_rejection_is_invalid() {
        let body = r#"{ "success": false, "error": { "message": "expired", "status": 401 } }"#;
        match interpret_verify(StatusCode::OK, body) {
            TokenStatus::Invalid(failure) => {
                assert_eq!(failure.message, "expired");
                assert_eq!(failure.status, Some(401));
                assert!(failure.is_auth());
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn verify_unconfirmed_flag_is_invalid() {
        let body = r#"{ "success": true, "data": { "isVerified": false } }"#;
        assert!(matches!(
            interpret_verify(StatusCode::OK, body),
            TokenStatus::Invalid(_)
        ));
    }

    #[test]
    fn verify_malformed_body_is_unknown_not_invalid() {
        for body in ["<html>504</html>", "", r#"{ "success": true }"#] {
            match interpret_verify(StatusCode::OK, body) {
                TokenStatus::Unknown(_) => {}
                other => panic!("expected Unknown for {:?}, got {:?}", body, other),
            }
        }
    }

    #[test]
    fn envelope_success_parses_data() {
        let body = r#"{ "success": true, "data": [ { "_id": "b1", "name": "Batch One", "slug": "batch-one" } ] }"#;
        let batches: Vec<crate::model::Batch> =
            interpret_envelope(StatusCode::OK, body).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].id, "b1");
        assert_eq!(batches[0].label(), "batch-one");
    }

    #[test]
    fn envelope_structured_error_carries_status() {
        let body = r#"{ "success": false, "error": { "message": "nope", "status": 403 } }"#;
        let failure =
            interpret_envelope::<Vec<crate::model::Batch>>(StatusCode::OK, body).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Auth);
        assert_eq!(failure.status, Some(403));
        assert!(failure.is_auth());
    }

    #[test]
    fn envelope_error_without_body_falls_back_to_http_status() {
        let body = r#"{ "success": false }"#;
        let failure = interpret_envelope::<Vec<crate::model::Batch>>(
            StatusCode::SERVICE_UNAVAILABLE,
            body,
        )
        .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Transient);
        assert_eq!(failure.status, Some(503));
        assert!(!failure.is_auth());
    }

    #[test]
    fn envelope_malformed_is_retryable() {
        let failure =
            interpret_envelope::<Vec<crate::model::Batch>>(StatusCode::OK, "not json").unwrap_err();
        assert_eq!(failure.kind, FailureKind::Malformed);
        assert!(!failure.is_auth());
    }

    #[test]
    fn build_request_sets_headers() {
        let client = PwClient::new("token".into());
        let request = client
            .build_request(Method::POST, "v3/oauth/verify-token")
            .unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().path(), "/v3/oauth/verify-token");
        let headers = request.headers();
        assert_eq!(
            headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer token"
        );
        assert_eq!(
            headers.get("Referer").and_then(|h| h.to_str().ok()).unwrap(),
            REFERER
        );
        assert!(headers.contains_key("Randomid"));
    }

    #[test]
    fn build_request_keeps_query() {
        let client = PwClient::new("token".into());
        let request = client.build_request(Method::GET, BATCHES_PATH).unwrap();
        assert_eq!(
            request.url().path(),
            "/batch-service/v1/batches/purchased-batches"
        );
        assert_eq!(
            request.url().query(),
            Some("amount=paid&page=1&type=ALL")
        );
    }
}
