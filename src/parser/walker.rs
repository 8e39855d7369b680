//! Attachment discovery over a parsed [`MessageTree`].

use crate::model::attachment::Attachment;
use crate::model::message::{MessageTree, MimePart};

/// Lazy pre-order walk over a message's parts, yielding attachment candidates.
///
/// A part is a candidate when it carries a `Content-Disposition` header and
/// its content type is not in the exclusion list. Messages whose root is not
/// a container yield nothing.
pub struct AttachmentWalker<'a> {
    stack: Vec<&'a MimePart>,
    excluded_types: &'a [String],
}

impl<'a> AttachmentWalker<'a> {
    pub fn new(tree: &'a MessageTree, excluded_types: &'a [String]) -> Self {
        let stack = if tree.root.is_container() {
            vec![&tree.root]
        } else {
            tracing::debug!("Not a multipart message, nothing to extract");
            Vec::new()
        };
        Self {
            stack,
            excluded_types,
        }
    }

    fn is_excluded(&self, content_type: &str) -> bool {
        self.excluded_types.iter().any(|t| t == content_type)
    }
}

impl Iterator for AttachmentWalker<'_> {
    type Item = Attachment;

    fn next(&mut self) -> Option<Attachment> {
        while let Some(part) = self.stack.pop() {
            self.stack.extend(part.children.iter().rev());

            if part.disposition.is_none() {
                tracing::trace!(content_type = %part.content_type, "Part has no Content-Disposition");
                continue;
            }
            if self.is_excluded(&part.content_type) {
                continue;
            }

            tracing::debug!(content_type = %part.content_type, "Processing mail part");

            let filename = match part.filename.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => {
                    tracing::warn!(
                        content_type = %part.content_type,
                        "Attachment has no filename, submitting without one"
                    );
                    String::new()
                }
            };
            if part.payload.is_empty() {
                tracing::debug!(filename = %filename, "Attachment payload is empty");
            }

            return Some(Attachment::new(filename, part.payload.clone()));
        }
        None
    }
}
