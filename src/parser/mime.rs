//! MIME message parsing: turns raw RFC 5322 bytes into a [`MessageTree`].
//!
//! All knowledge of `mail-parser` is confined to this module.

use mail_parser::decoders::base64::base64_decode;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{Encoding, Message, MessageParser, MessagePart, MimeHeaders, PartType};

use crate::error::{CuckooError, Result};
use crate::model::message::{MessageTree, MimePart};

/// Maximum nesting depth followed when converting the part tree (to prevent
/// stack overflow on adversarial input). Deeper parts are dropped.
const MAX_DEPTH: usize = 32;

/// Parse a complete raw message (headers + body) into a [`MessageTree`].
///
/// A leading MBOX `From ` separator line and a UTF-8 BOM are ignored, so the
/// output of a `pipe(8)` transport with the `F` flag is accepted as-is.
pub fn parse_email(raw_message: &[u8]) -> Result<MessageTree> {
    let message_bytes = skip_from_line(raw_message);
    if message_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(CuckooError::InvalidEmail("input is empty".into()));
    }

    let parser = MessageParser::default();
    let msg = parser
        .parse(message_bytes)
        .ok_or_else(|| CuckooError::InvalidEmail("no message headers found".into()))?;

    Ok(tree_from_parsed(&msg))
}

/// Build the tree from a parsed `mail_parser::Message`.
fn tree_from_parsed(msg: &Message<'_>) -> MessageTree {
    MessageTree {
        subject: msg.subject().map(String::from),
        from: msg
            .from()
            .and_then(|addr| addr.first())
            .and_then(|addr| addr.address())
            .map(String::from),
        message_id: msg.message_id().map(String::from),
        root: convert_part(msg, 0, 0),
    }
}

/// Convert the part with index `id` of `msg` and, recursively, its children.
fn convert_part(msg: &Message<'_>, id: usize, depth: usize) -> MimePart {
    let Some(part) = msg.parts.get(id) else {
        tracing::warn!(part = id, "Dangling MIME part reference");
        return MimePart::default();
    };

    let mut node = MimePart {
        content_type: content_type_of(part),
        disposition: part
            .content_disposition()
            .map(|d: &mail_parser::ContentType| d.ctype().to_ascii_lowercase()),
        filename: part.attachment_name().map(String::from),
        payload: Vec::new(),
        children: Vec::new(),
    };

    if depth >= MAX_DEPTH {
        tracing::warn!(depth, "MIME structure too deeply nested, ignoring sub-parts");
        return node;
    }

    match &part.body {
        PartType::Multipart(ids) => {
            node.children = ids
                .iter()
                .map(|&child| convert_part(msg, child, depth + 1))
                .collect();
        }
        PartType::Message(inner) => {
            node.children = vec![convert_part(inner, 0, depth + 1)];
        }
        PartType::Text(_) | PartType::Html(_) => {
            node.payload = raw_payload(msg, part).unwrap_or_else(|| part.contents().to_vec());
        }
        _ => {
            node.payload = part.contents().to_vec();
        }
    }

    node
}

/// Body bytes of a textual part with only the transfer encoding undone.
///
/// `mail-parser` transcodes text bodies to UTF-8 from their declared
/// charset; attachments must keep the bytes the sender attached.
fn raw_payload(msg: &Message<'_>, part: &MessagePart<'_>) -> Option<Vec<u8>> {
    let raw = msg
        .raw_message
        .get(part.raw_body_offset()..part.raw_end_offset())?;
    let decoded = match part.encoding {
        Encoding::None => Some(raw.to_vec()),
        Encoding::Base64 => base64_decode(raw),
        Encoding::QuotedPrintable => quoted_printable_decode(raw),
    };
    if decoded.is_none() {
        tracing::warn!(
            encoding = ?part.encoding,
            "Cannot decode raw text body, using transcoded contents"
        );
    }
    decoded
}

/// Lower-cased `type/subtype` of a part, `text/plain` if the header is absent.
fn content_type_of(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct: &mail_parser::ContentType| {
            let main = ct.ctype().trim();
            match ct.subtype() {
                Some(sub) => format!("{main}/{}", sub.trim()),
                None => main.to_string(),
            }
        })
        .unwrap_or_else(|| "text/plain".to_string())
        .to_ascii_lowercase()
}

/// Skip the `From ` separator line at the start of MBOX-framed messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    // Handle BOM
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(data);

    if data.starts_with(b"From ") {
        // Find end of line
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}
