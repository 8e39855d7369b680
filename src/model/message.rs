//! Parsed message tree, independent of the MIME parser that produced it.

/// A parsed email: a few headers for logging plus the MIME part tree.
#[derive(Debug, Clone, Default)]
pub struct MessageTree {
    /// Decoded `Subject:` header.
    pub subject: Option<String>,
    /// First address of the `From:` header.
    pub from: Option<String>,
    /// The `Message-ID` header value.
    pub message_id: Option<String>,
    /// Top-level MIME part.
    pub root: MimePart,
}

/// One node of the MIME tree.
#[derive(Debug, Clone)]
pub struct MimePart {
    /// Lower-cased `type/subtype`. `text/plain` when the header is absent.
    pub content_type: String,
    /// Disposition type (`attachment`, `inline`, ...) if the header is present.
    pub disposition: Option<String>,
    /// Filename from `Content-Disposition` or the `name` parameter of `Content-Type`.
    pub filename: Option<String>,
    /// Transfer-decoded body. Empty for container parts.
    pub payload: Vec<u8>,
    /// Sub-parts of a multipart, or the root of an embedded message.
    pub children: Vec<MimePart>,
}

impl Default for MimePart {
    fn default() -> Self {
        Self {
            content_type: "text/plain".to_string(),
            disposition: None,
            filename: None,
            payload: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl MimePart {
    /// Create a leaf part with a content type and payload.
    pub fn leaf(content_type: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Create a container part with the given children.
    pub fn container(content_type: impl Into<String>, children: Vec<MimePart>) -> Self {
        Self {
            content_type: content_type.into(),
            children,
            ..Self::default()
        }
    }

    /// Mark this part as an attachment with the given filename.
    pub fn attached(mut self, filename: impl Into<String>) -> Self {
        self.disposition = Some("attachment".to_string());
        self.filename = Some(filename.into());
        self
    }

    /// `true` for multipart bodies and embedded messages.
    pub fn is_container(&self) -> bool {
        !self.children.is_empty() || self.content_type.starts_with("multipart/")
    }
}

impl MessageTree {
    /// Wrap a root part with no header information.
    pub fn from_root(root: MimePart) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }
}
