//! [`Remote`] implementation over the authority's HTTP API.
//!
//! - `POST {base}/records` with `Idempotency-Key` creates a record
//! - `GET {base}/records?limit=N` lists records
//!
//! Connection failures, timeouts, `408`, `429` and `5xx` responses are
//! transient. Any other non-success status is a rejection.

use crate::remote::{Remote, Submission, SubmitError};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tether_engine::CanonicalRecord;

/// Header carrying the idempotency key on submissions.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the authority.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SubmitError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SubmitError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubmitError::rejected(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` on every request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn records_url(&self) -> String {
        format!("{}/records", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn submit(&self, submission: &Submission) -> Result<CanonicalRecord, SubmitError> {
        let request = self
            .client
            .post(self.records_url())
            .header(IDEMPOTENCY_HEADER, submission.idempotency_key())
            .json(submission);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(classify_transport)?;

        let response = check_status(response).await?;
        response
            .json::<CanonicalRecord>()
            .await
            .map_err(|e| SubmitError::transient(format!("invalid response body: {e}")))
    }

    async fn list(&self, limit: usize) -> Result<Vec<CanonicalRecord>, SubmitError> {
        let request = self
            .client
            .get(self.records_url())
            .query(&[("limit", limit)]);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(classify_transport)?;

        let response = check_status(response).await?;
        response
            .json::<Vec<CanonicalRecord>>()
            .await
            .map_err(|e| SubmitError::transient(format!("invalid response body: {e}")))
    }
}

fn classify_transport(error: reqwest::Error) -> SubmitError {
    if error.is_builder() {
        SubmitError::rejected(error.to_string())
    } else {
        SubmitError::transient(error.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SubmitError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{status}: {body}");
    if is_transient_status(status) {
        Err(SubmitError::Transient(message))
    } else {
        Err(SubmitError::Rejected(message))
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}
