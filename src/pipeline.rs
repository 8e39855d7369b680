//! Per-message driver: walk, expand, look up, submit.
//!
//! Each candidate is handled on its own. Whatever goes wrong with one
//! candidate is recorded in its [`CandidateReport`] and logged; the next
//! candidate is processed regardless.

use crate::config::Config;
use crate::error::CuckooError;
use crate::model::attachment::Attachment;
use crate::model::message::MessageTree;
use crate::parser::walker::AttachmentWalker;
use crate::sandbox::{Novelty, Sandbox, Submission, TaskId};
use crate::unpack::Unpacker;

/// What happened to one candidate.
#[derive(Debug)]
pub enum Outcome {
    /// The sandbox already knew the file.
    SkippedKnown,
    /// A new analysis task was created.
    Submitted(TaskId),
    /// Processing failed at some stage.
    Failed(CuckooError),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Outcome of one candidate, with the context it was logged with.
#[derive(Debug)]
pub struct CandidateReport {
    pub filename: String,
    /// Content hash. Always present: expansion failures carry the archive's.
    pub sha256: String,
    pub outcome: Outcome,
}

/// `true` if any candidate failed.
pub fn any_failed(reports: &[CandidateReport]) -> bool {
    reports.iter().any(|r| r.outcome.is_failure())
}

/// Drives attachments of one message through a sandbox.
pub struct Pipeline<'a, S, U> {
    config: &'a Config,
    sandbox: S,
    unpacker: U,
}

impl<'a, S: Sandbox, U: Unpacker> Pipeline<'a, S, U> {
    pub fn new(config: &'a Config, sandbox: S, unpacker: U) -> Self {
        Self {
            config,
            sandbox,
            unpacker,
        }
    }

    /// Process every attachment of `message`, returning one report per candidate.
    pub fn process(&self, message: &MessageTree) -> Vec<CandidateReport> {
        tracing::debug!(
            subject = message.subject.as_deref().unwrap_or(""),
            from = message.from.as_deref().unwrap_or(""),
            message_id = message.message_id.as_deref().unwrap_or(""),
            "Received email"
        );

        let mut reports = Vec::new();
        for attachment in AttachmentWalker::new(message, &self.config.filter.excluded_types) {
            tracing::info!(
                filename = %attachment.filename(),
                from = message.from.as_deref().unwrap_or(""),
                "Found attachment"
            );
            for candidate in self.expand(attachment) {
                reports.push(match candidate {
                    Ok(candidate) => self.process_candidate(candidate),
                    Err(report) => report,
                });
            }
        }

        log_summary(&reports);
        reports
    }

    /// Replace an archive by its members. A failed expansion becomes a
    /// failed report for the archive itself.
    fn expand(&self, attachment: Attachment) -> Vec<Result<Attachment, CandidateReport>> {
        match self.unpacker.unpack(&attachment) {
            Ok(members) if members.is_empty() => vec![Ok(attachment)],
            Ok(members) => members.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(self.fail(&attachment, e))],
        }
    }

    fn process_candidate(&self, attachment: Attachment) -> CandidateReport {
        let mode = attachment.analysis_mode(&self.config.filter.office_extensions);
        tracing::info!(filename = %attachment.filename(), "Got file");
        if let Some(option) = mode.option_value() {
            tracing::info!(filename = %attachment.filename(), mode = option, "Changing analysis mode");
        }

        match self.sandbox.check_novelty(attachment.sha256()) {
            Novelty::Known(info) => {
                tracing::info!(
                    filename = %attachment.filename(),
                    sha256 = %attachment.sha256(),
                    "File has already been analysed, not submitting"
                );
                tracing::debug!(response = %info, "File info");
                self.report(&attachment, Outcome::SkippedKnown)
            }
            Novelty::Indeterminate(e) => self.fail(&attachment, e),
            Novelty::Unknown => {
                let submission = Submission::new(&self.config.sandbox.prefix, &attachment, mode);
                match self.sandbox.submit(&submission) {
                    Ok(task_id) => {
                        tracing::info!(
                            filename = %attachment.filename(),
                            sha256 = %attachment.sha256(),
                            task_id = %task_id,
                            "Submitted to sandbox"
                        );
                        self.report(&attachment, Outcome::Submitted(task_id))
                    }
                    Err(e) => self.fail(&attachment, e),
                }
            }
        }
    }

    fn fail(&self, attachment: &Attachment, error: CuckooError) -> CandidateReport {
        tracing::error!(
            filename = %attachment.filename(),
            sha256 = %attachment.sha256(),
            kind = %error.kind(),
            error = %error,
            "Unable to submit file to sandbox"
        );
        self.report(attachment, Outcome::Failed(error))
    }

    fn report(&self, attachment: &Attachment, outcome: Outcome) -> CandidateReport {
        CandidateReport {
            filename: attachment.filename().to_string(),
            sha256: attachment.sha256().to_string(),
            outcome,
        }
    }
}

fn log_summary(reports: &[CandidateReport]) {
    let (mut submitted, mut skipped, mut failed) = (0usize, 0usize, 0usize);
    for report in reports {
        match report.outcome {
            Outcome::Submitted(_) => submitted += 1,
            Outcome::SkippedKnown => skipped += 1,
            Outcome::Failed(_) => failed += 1,
        }
    }
    tracing::info!(submitted, skipped, failed, "Finished processing email");
}
