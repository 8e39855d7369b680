//! Container expansion: replacing an archive attachment by its members.

pub mod archive;

pub use archive::ArchiveUnpacker;

use crate::error::Result;
use crate::model::attachment::Attachment;

/// Something that can look inside container files.
pub trait Unpacker {
    /// Unpack `attachment` into its member files.
    ///
    /// Returns an empty vector when the attachment is not a recognized
    /// container or contains no files; the caller then keeps the original.
    /// An error means the attachment looked like a container but could not
    /// be read.
    fn unpack(&self, attachment: &Attachment) -> Result<Vec<Attachment>>;
}

/// Unpacker that never recognizes anything. Used when expansion is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUnpack;

impl Unpacker for NoUnpack {
    fn unpack(&self, _attachment: &Attachment) -> Result<Vec<Attachment>> {
        Ok(Vec::new())
    }
}
