//! `cuckoolyse`: submit email attachments to a Cuckoo sandbox.
//!
//! This crate provides the core library: parsing a message into a MIME
//! tree, finding attachments, expanding archives, and asking the sandbox
//! to analyse every file it has not seen before.

pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod sandbox;
pub mod unpack;
