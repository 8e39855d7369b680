//! Email parsing: MIME tree construction and attachment discovery.

pub mod mime;
pub mod walker;
