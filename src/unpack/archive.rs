//! Zip, tar and gzip expansion of attachments.
//!
//! The format is chosen from the filename extension, with magic bytes as a
//! fallback for names without one. Office documents are zip files too, so
//! sniffing content alone would tear `.docx` files apart; a sniffed zip that
//! is an OOXML or OpenDocument package is left whole. A file named like an
//! archive must also parse as one, otherwise the expansion fails.

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;

use crate::config::UnpackConfig;
use crate::error::{CuckooError, Result};
use crate::model::attachment::Attachment;

use super::Unpacker;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";
const OOXML_MARKER: &str = "[Content_Types].xml";
const ODF_MARKER: &str = "mimetype";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
    Gzip,
}

/// Unpacks zip, tar, tar.gz and single-file gzip attachments.
#[derive(Debug, Clone)]
pub struct ArchiveUnpacker {
    max_entries: usize,
    max_total_size: u64,
}

impl ArchiveUnpacker {
    pub fn new(config: &UnpackConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            max_total_size: config.max_total_size,
        }
    }

    fn unpack_zip(&self, name: &str, data: &[u8]) -> Result<Vec<Attachment>> {
        let mut archive =
            zip::ZipArchive::new(Cursor::new(data)).map_err(|e| CuckooError::unpack(name, e))?;
        let mut budget = Budget::new(self);
        let mut members = Vec::new();

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| CuckooError::unpack(name, e))?;
            if entry.is_dir() {
                continue;
            }
            let member = member_name(entry.name());
            let contents = budget.consume(name, &mut entry)?;
            members.push(Attachment::new(member, contents));
        }

        Ok(members)
    }

    fn unpack_tar<R: Read>(&self, name: &str, reader: R) -> Result<Vec<Attachment>> {
        let mut archive = tar::Archive::new(reader);
        let mut budget = Budget::new(self);
        let mut members = Vec::new();

        let entries = archive
            .entries()
            .map_err(|e| CuckooError::unpack(name, e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| CuckooError::unpack(name, e))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry
                .path()
                .map_err(|e| CuckooError::unpack(name, e))?
                .to_string_lossy()
                .into_owned();
            let contents = budget.consume(name, &mut entry)?;
            members.push(Attachment::new(member_name(&path), contents));
        }

        Ok(members)
    }

    fn unpack_gzip(&self, name: &str, data: &[u8]) -> Result<Vec<Attachment>> {
        if !data.starts_with(GZIP_MAGIC) {
            return Err(CuckooError::unpack(name, "not in gzip format"));
        }
        let mut budget = Budget::new(self);
        let contents = budget.consume(name, GzDecoder::new(data))?;
        Ok(vec![Attachment::new(strip_gz_suffix(name), contents)])
    }
}

impl Unpacker for ArchiveUnpacker {
    fn unpack(&self, attachment: &Attachment) -> Result<Vec<Attachment>> {
        let name = attachment.filename();
        let data = attachment.contents();

        let Some(kind) = detect_kind(name, data) else {
            return Ok(Vec::new());
        };
        tracing::debug!(filename = %name, kind = ?kind, "Unpacking archive");

        let members = match kind {
            ArchiveKind::Zip => self.unpack_zip(name, data)?,
            ArchiveKind::Tar => self.unpack_tar(name, data)?,
            ArchiveKind::TarGz => {
                if !data.starts_with(GZIP_MAGIC) {
                    return Err(CuckooError::unpack(name, "not in gzip format"));
                }
                self.unpack_tar(name, GzDecoder::new(data))?
            }
            ArchiveKind::Gzip => self.unpack_gzip(name, data)?,
        };

        tracing::info!(filename = %name, members = members.len(), "Expanded archive");
        Ok(members)
    }
}

/// Remaining entry and byte allowance while reading one archive.
struct Budget {
    max_entries: usize,
    entries_left: usize,
    bytes_left: u64,
}

impl Budget {
    fn new(unpacker: &ArchiveUnpacker) -> Self {
        Self {
            max_entries: unpacker.max_entries,
            entries_left: unpacker.max_entries,
            bytes_left: unpacker.max_total_size,
        }
    }

    /// Read one member completely, charging it against the budget.
    fn consume<R: Read>(&mut self, archive: &str, reader: R) -> Result<Vec<u8>> {
        if self.entries_left == 0 {
            return Err(CuckooError::unpack(
                archive,
                format!("more than {} entries", self.max_entries),
            ));
        }
        self.entries_left -= 1;

        let mut contents = Vec::new();
        reader
            .take(self.bytes_left.saturating_add(1))
            .read_to_end(&mut contents)
            .map_err(|e| CuckooError::unpack(archive, e))?;

        let len = contents.len() as u64;
        if len > self.bytes_left {
            return Err(CuckooError::unpack(
                archive,
                "decompressed size exceeds the configured limit",
            ));
        }
        self.bytes_left -= len;
        Ok(contents)
    }
}

fn detect_kind(filename: &str, data: &[u8]) -> Option<ArchiveKind> {
    let lower = filename.to_ascii_lowercase();

    if lower.ends_with(".zip") {
        Some(ArchiveKind::Zip)
    } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Some(ArchiveKind::TarGz)
    } else if lower.ends_with(".tar") {
        Some(ArchiveKind::Tar)
    } else if lower.ends_with(".gz") {
        Some(ArchiveKind::Gzip)
    } else if !has_extension(filename) {
        match sniff_kind(data) {
            Some(ArchiveKind::Zip) if is_office_package(data) => {
                tracing::debug!(filename = %filename, "Zip is an office package, keeping it whole");
                None
            }
            kind => kind,
        }
    } else {
        None
    }
}

/// Content-only detection for files whose name says nothing.
fn sniff_kind(data: &[u8]) -> Option<ArchiveKind> {
    if data.starts_with(ZIP_MAGIC) || data.starts_with(ZIP_EMPTY_MAGIC) {
        Some(ArchiveKind::Zip)
    } else if data.starts_with(GZIP_MAGIC) {
        Some(ArchiveKind::Gzip)
    } else if data
        .get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len())
        .is_some_and(|m| m == TAR_MAGIC)
    {
        Some(ArchiveKind::Tar)
    } else {
        None
    }
}

/// OOXML packages carry `[Content_Types].xml`; OpenDocument files start
/// with a `mimetype` entry.
fn is_office_package(data: &[u8]) -> bool {
    let Ok(archive) = zip::ZipArchive::new(Cursor::new(data)) else {
        return false;
    };
    archive.name_for_index(0) == Some(ODF_MARKER)
        || archive.file_names().any(|name| name == OOXML_MARKER)
}

fn has_extension(filename: &str) -> bool {
    member_name(filename)
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
}

/// Last path component of an archive member path.
fn member_name(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string()
}

fn strip_gz_suffix(name: &str) -> String {
    let cut = name.len().saturating_sub(3);
    match name.get(cut..) {
        Some(suffix) if suffix.eq_ignore_ascii_case(".gz") => name[..cut].to_string(),
        _ => name.to_string(),
    }
}
