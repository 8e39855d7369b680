//! Cuckoo sandbox API: novelty lookups and file submission.
//!
//! The [`Sandbox`] trait is the seam the pipeline drives; [`CuckooClient`]
//! is the HTTP implementation. Response interpretation lives in the pure
//! functions [`classify_lookup`] and [`parse_task_response`] so it can be
//! exercised without a network.

pub mod client;

pub use client::CuckooClient;

use serde_json::Value;

use crate::error::{CuckooError, Result};
use crate::model::attachment::{AnalysisMode, Attachment};

/// Answer to "has the sandbox seen this hash before?".
#[derive(Debug)]
pub enum Novelty {
    /// Already analysed. Carries the file information the sandbox returned.
    Known(Value),
    /// Never seen. Submit it.
    Unknown,
    /// Could not tell. The attachment fails.
    Indeterminate(CuckooError),
}

/// Identifier of a scheduled analysis task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One file upload, with the marker prefix already applied to the filename.
#[derive(Debug, Clone)]
pub struct Submission<'a> {
    filename: String,
    contents: &'a [u8],
    mode: AnalysisMode,
}

impl<'a> Submission<'a> {
    /// Prepare `attachment` for upload under `prefix + filename`.
    pub fn new(prefix: &str, attachment: &'a Attachment, mode: AnalysisMode) -> Self {
        Self {
            filename: format!("{prefix}{}", attachment.filename()),
            contents: attachment.contents(),
            mode,
        }
    }

    /// Prefixed filename sent to the sandbox.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn contents(&self) -> &[u8] {
        self.contents
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    /// The `options` form field, if one is sent.
    pub fn options(&self) -> Option<String> {
        self.mode.option_value().map(|mode| format!("mode={mode}"))
    }
}

/// Operations the pipeline needs from a sandbox.
pub trait Sandbox {
    /// Look up a SHA-256 hex digest.
    fn check_novelty(&self, sha256: &str) -> Novelty;

    /// Upload a file for analysis. No retries.
    fn submit(&self, submission: &Submission<'_>) -> Result<TaskId>;
}

impl<S: Sandbox + ?Sized> Sandbox for &S {
    fn check_novelty(&self, sha256: &str) -> Novelty {
        (**self).check_novelty(sha256)
    }

    fn submit(&self, submission: &Submission<'_>) -> Result<TaskId> {
        (**self).submit(submission)
    }
}

/// Interpret the response to `GET /files/view/sha256/{hash}`.
pub fn classify_lookup(status: u16, body: &str) -> Novelty {
    match status {
        200 => match serde_json::from_str::<Value>(body) {
            Ok(info) => Novelty::Known(info),
            Err(e) => Novelty::Indeterminate(CuckooError::MalformedResponse(e.to_string())),
        },
        404 => Novelty::Unknown,
        _ => Novelty::Indeterminate(CuckooError::UnexpectedStatus {
            status,
            body: truncate(body),
        }),
    }
}

/// Extract the task identifier from a `POST /tasks/create/file` response body.
pub fn parse_task_response(body: &str) -> Result<TaskId> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| CuckooError::MalformedResponse(e.to_string()))?;

    match value.get("task_id") {
        Some(Value::Number(n)) => Ok(TaskId(n.to_string())),
        Some(Value::String(s)) => Ok(TaskId(s.clone())),
        _ => Err(CuckooError::MissingTaskId),
    }
}

/// Keep error bodies short enough for a log line.
pub(crate) fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
