//! Core data model types: the parsed message tree and attachment candidates.

pub mod attachment;
pub mod message;
