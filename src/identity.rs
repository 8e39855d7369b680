//! Content identity and analysis-mode classification.

use sha2::{Digest, Sha256};

use crate::model::attachment::AnalysisMode;

/// Lower-case hex SHA-256 of `data`.
///
/// This is the key the sandbox indexes samples by, so it must never change
/// between runs.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Pick the analysis mode for a filename.
///
/// Suffix match is case-sensitive against `office_extensions`.
pub fn classify_mode(filename: &str, office_extensions: &[String]) -> AnalysisMode {
    if office_extensions
        .iter()
        .any(|ext| !ext.is_empty() && filename.ends_with(ext.as_str()))
    {
        AnalysisMode::Office
    } else {
        AnalysisMode::None
    }
}
