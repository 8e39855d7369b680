//! Blocking HTTP client for the Cuckoo REST API.

use std::time::Duration;

use reqwest::blocking::{multipart, RequestBuilder};

use crate::config::SandboxConfig;
use crate::error::{CuckooError, Result};

use super::{classify_lookup, parse_task_response, truncate, Novelty, Sandbox, Submission, TaskId};

/// Cuckoo REST API client.
pub struct CuckooClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    api_token: Option<String>,
}

impl CuckooClient {
    /// Create a client for the API described by `config`.
    ///
    /// Every request is bounded by `config.timeout_secs`.
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("cuckoolyse/", env!("CARGO_PKG_VERSION")));
        if !config.use_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| CuckooError::Transport(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
            timeout_secs: config.timeout_secs,
            api_token: config.api_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> CuckooError {
        if e.is_timeout() {
            CuckooError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            CuckooError::Transport(format!("cannot connect to {}: {e}", self.base_url))
        } else {
            CuckooError::Transport(e.to_string())
        }
    }
}

impl Sandbox for CuckooClient {
    fn check_novelty(&self, sha256: &str) -> Novelty {
        let url = format!("{}/files/view/sha256/{}", self.base_url, sha256);
        tracing::debug!(sha256, "Checking if file has already been analysed");

        let response = match self.authorize(self.client.get(&url)).send() {
            Ok(response) => response,
            Err(e) => return Novelty::Indeterminate(self.transport_error(e)),
        };
        let status = response.status().as_u16();
        match response.text() {
            Ok(body) => classify_lookup(status, &body),
            Err(e) => Novelty::Indeterminate(self.transport_error(e)),
        }
    }

    fn submit(&self, submission: &Submission<'_>) -> Result<TaskId> {
        let url = format!("{}/tasks/create/file", self.base_url);
        tracing::info!(url = %self.base_url, filename = %submission.filename(), "Submitting to sandbox");

        let file = multipart::Part::bytes(submission.contents().to_vec())
            .file_name(submission.filename().to_string());
        let mut form = multipart::Form::new().part("file", file);
        if let Some(options) = submission.options() {
            tracing::info!(options = %options, "Submitting with analysis options");
            form = form.text("options", options);
        }

        let response = self
            .authorize(self.client.post(&url))
            .multipart(form)
            .send()
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(CuckooError::UnexpectedStatus {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        tracing::debug!(response = %truncate(&body), "Sandbox accepted submission");
        parse_task_response(&body)
    }
}
