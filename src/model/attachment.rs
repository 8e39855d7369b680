//! Attachment candidates and their derived identity.
//!
//! An attachment is built once (while walking the MIME tree or while
//! expanding an archive) and never modified afterwards. Its content hash is
//! computed on first use and cached.

use std::sync::OnceLock;

use crate::identity;

/// Specialized analysis path requested from the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Default analysis, no options sent.
    None,
    /// Office document analysis (macro execution).
    Office,
}

impl AnalysisMode {
    /// Value for the sandbox `mode=` option, `None` when no option is sent.
    pub fn option_value(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Office => Some("office"),
        }
    }
}

/// A file extracted from an email, eligible for submission.
#[derive(Debug)]
pub struct Attachment {
    filename: String,
    contents: Vec<u8>,
    sha256: OnceLock<String>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            contents,
            sha256: OnceLock::new(),
        }
    }

    /// Filename as found in the message, possibly empty.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Decoded file bytes.
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// Hex SHA-256 of the contents, computed once.
    pub fn sha256(&self) -> &str {
        self.sha256.get_or_init(|| identity::sha256_hex(&self.contents))
    }

    /// Analysis mode derived from the filename suffix.
    pub fn analysis_mode(&self, office_extensions: &[String]) -> AnalysisMode {
        identity::classify_mode(&self.filename, office_extensions)
    }
}
