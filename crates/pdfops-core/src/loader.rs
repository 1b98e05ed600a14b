//! Document loading and validation
//!
//! The magic-byte check is a fixed-size prefix comparison that runs before
//! lopdf sees the buffer, so garbage uploads are rejected without parsing.

use lopdf::{Document, Object, ObjectId};
use serde::Serialize;

use crate::error::{FormatError, PdfOpsError};

pub const PDF_MAGIC: &[u8; 4] = b"%PDF";
pub const ZIP_MAGIC: &[u8; 4] = &[0x50, 0x4B, 0x03, 0x04];

/// Container formats recognised by the header check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Pdf,
    /// Office-XML and other ZIP based formats
    Zip,
}

impl ContainerKind {
    pub fn magic(self) -> &'static [u8; 4] {
        match self {
            ContainerKind::Pdf => PDF_MAGIC,
            ContainerKind::Zip => ZIP_MAGIC,
        }
    }

    /// Identify a buffer by its first four bytes.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        [ContainerKind::Pdf, ContainerKind::Zip]
            .into_iter()
            .find(|kind| bytes.starts_with(kind.magic()))
    }
}

/// Check that `bytes` starts with the signature of `expected`.
pub fn check_magic(bytes: &[u8], expected: ContainerKind) -> Result<(), PdfOpsError> {
    if bytes.is_empty() {
        return Err(PdfOpsError::EmptyFile);
    }
    if !bytes.starts_with(expected.magic()) {
        return Err(match expected {
            ContainerKind::Pdf => FormatError::NotAPdf,
            ContainerKind::Zip => FormatError::NotAZip,
        }
        .into());
    }
    Ok(())
}

/// PDF file information extracted during loading
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct PdfInfo {
    /// Number of pages in the document
    pub page_count: u32,
    /// PDF version string (e.g., "1.7")
    pub version: String,
    /// Whether the document is encrypted
    pub encrypted: bool,
    /// File size in bytes
    pub size_bytes: usize,
    /// Document title from metadata (if available)
    pub title: Option<String>,
    /// Document author from metadata (if available)
    pub author: Option<String>,
}

/// A decoded PDF owned by the operation that loaded it.
#[derive(Debug, Clone)]
pub struct DocumentHandle {
    document: Document,
    info: PdfInfo,
}

impl DocumentHandle {
    pub fn page_count(&self) -> u32 {
        self.info.page_count
    }

    pub fn info(&self) -> &PdfInfo {
        &self.info
    }

    pub fn is_encrypted(&self) -> bool {
        self.document.trailer.get(b"Encrypt").is_ok()
    }

    /// Page object ids in document order.
    pub fn page_ids(&self) -> Vec<ObjectId> {
        self.document.get_pages().into_values().collect()
    }

    /// Effective `/Rotate` of a 1-based page, following page tree
    /// inheritance. Normalized to 0, 90, 180 or 270.
    pub fn rotation(&self, page: u32) -> Option<i64> {
        let page_id = *self.document.get_pages().get(&page)?;
        let rotate = inherited_attribute(&self.document, page_id, b"Rotate")
            .and_then(|obj| obj.as_i64().ok())
            .unwrap_or(0);
        Some(rotate.rem_euclid(360))
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    /// Serialize the document.
    pub fn into_bytes(mut self) -> Result<Vec<u8>, PdfOpsError> {
        save_document(&mut self.document)
    }
}

/// Validate and decode a PDF buffer.
pub fn load(bytes: &[u8]) -> Result<DocumentHandle, PdfOpsError> {
    check_magic(bytes, ContainerKind::Pdf)?;

    let document = Document::load_mem(bytes)
        .map_err(|e| FormatError::Unparseable(e.to_string()))?;

    let page_count = document.get_pages().len() as u32;
    if page_count == 0 {
        return Err(FormatError::NoPages.into());
    }

    let encrypted = document.trailer.get(b"Encrypt").is_ok();
    let (title, author) = if encrypted {
        // Info strings are ciphertext until the document is unlocked
        (None, None)
    } else {
        extract_metadata(&document)
    };

    let info = PdfInfo {
        page_count,
        version: extract_version(bytes),
        encrypted,
        size_bytes: bytes.len(),
        title,
        author,
    };

    tracing::debug!(
        pages = info.page_count,
        version = %info.version,
        encrypted,
        "loaded document"
    );

    Ok(DocumentHandle { document, info })
}

/// Load a document that transforms can rewrite; encrypted input is refused.
pub fn load_unlocked(bytes: &[u8]) -> Result<DocumentHandle, PdfOpsError> {
    let handle = load(bytes)?;
    ensure_unlocked(&handle)?;
    Ok(handle)
}

/// Refuse documents that still carry an `/Encrypt` dictionary.
pub(crate) fn ensure_unlocked(handle: &DocumentHandle) -> Result<(), PdfOpsError> {
    if handle.is_encrypted() {
        return Err(FormatError::Encrypted.into());
    }
    Ok(())
}

/// Inspect a PDF without keeping the decoded document.
pub fn inspect(bytes: &[u8]) -> Result<PdfInfo, PdfOpsError> {
    load(bytes).map(|handle| handle.info)
}

pub(crate) fn save_document(document: &mut Document) -> Result<Vec<u8>, PdfOpsError> {
    let mut buffer = Vec::new();
    document
        .save_to(&mut buffer)
        .map_err(|e| PdfOpsError::Operation(format!("Failed to save PDF: {}", e)))?;
    Ok(buffer)
}

/// Look up an inheritable page attribute, walking `/Parent` links.
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node_id = page_id;
    // Bounded walk: malformed files can contain parent cycles
    for _ in 0..64 {
        let dict = doc.get_object(node_id).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(key) {
            return match value {
                Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            };
        }
        node_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

/// Extract PDF version from header
fn extract_version(bytes: &[u8]) -> String {
    // Header format: %PDF-1.7
    if bytes.len() >= 8 && bytes.starts_with(b"%PDF-") {
        if let Ok(version) = std::str::from_utf8(&bytes[5..8]) {
            return version.trim().to_string();
        }
    }
    "1.4".to_string()
}

/// Extract title and author from the Info dictionary
fn extract_metadata(document: &Document) -> (Option<String>, Option<String>) {
    let info_dict = document
        .trailer
        .get(b"Info")
        .and_then(Object::as_reference)
        .and_then(|id| document.get_object(id))
        .and_then(Object::as_dict);

    let Ok(info_dict) = info_dict else {
        return (None, None);
    };

    let text = |key: &[u8]| {
        info_dict
            .get(key)
            .and_then(Object::as_str)
            .ok()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .filter(|s| !s.is_empty())
    };

    (text(b"Title"), text(b"Author"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_pdf, create_test_pdf_with_info};

    #[test]
    fn test_load_counts_pages() {
        let pdf = create_test_pdf(5, "Doc");
        let handle = load(&pdf).unwrap();
        assert_eq!(handle.page_count(), 5);
        assert_eq!(handle.page_ids().len(), 5);
        assert!(!handle.is_encrypted());
    }

    #[test]
    fn test_empty_buffer_is_empty_file() {
        assert!(matches!(load(&[]), Err(PdfOpsError::EmptyFile)));
    }

    #[test]
    fn test_non_pdf_rejected_before_parse() {
        let err = load(b"GIF89a not a pdf").unwrap_err();
        assert!(matches!(err, PdfOpsError::Format(FormatError::NotAPdf)));
    }

    #[test]
    fn test_magic_check_independent_of_size() {
        // A large buffer with a wrong header fails the same way as a small one
        let big = vec![0u8; 8 * 1024 * 1024];
        let err = load(&big).unwrap_err();
        assert!(matches!(err, PdfOpsError::Format(FormatError::NotAPdf)));
    }

    #[test]
    fn test_truncated_pdf_is_unparseable() {
        let err = load(b"%PDF-1.7\n garbage").unwrap_err();
        assert!(matches!(
            err,
            PdfOpsError::Format(FormatError::Unparseable(_))
        ));
    }

    #[test]
    fn test_zip_magic() {
        let zip = [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00];
        assert!(check_magic(&zip, ContainerKind::Zip).is_ok());
        assert!(matches!(
            check_magic(b"%PDF-1.4", ContainerKind::Zip),
            Err(PdfOpsError::Format(FormatError::NotAZip))
        ));
        assert_eq!(ContainerKind::detect(&zip), Some(ContainerKind::Zip));
        assert_eq!(ContainerKind::detect(b"%PDF-1.4"), Some(ContainerKind::Pdf));
        assert_eq!(ContainerKind::detect(b"PK"), None);
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(extract_version(b"%PDF-1.7\n"), "1.7");
        assert_eq!(extract_version(b"%PDF-2.0\n"), "2.0");
        assert_eq!(extract_version(b"%PDF"), "1.4");
    }

    #[test]
    fn test_inspect_reads_metadata() {
        let pdf = create_test_pdf_with_info(2, "Quarterly Report", "Jane Doe");
        let info = inspect(&pdf).unwrap();
        assert_eq!(info.page_count, 2);
        assert_eq!(info.title.as_deref(), Some("Quarterly Report"));
        assert_eq!(info.author.as_deref(), Some("Jane Doe"));
        assert_eq!(info.size_bytes, pdf.len());
    }

    #[test]
    fn test_rotation_defaults_to_zero() {
        let pdf = create_test_pdf(2, "Doc");
        let handle = load(&pdf).unwrap();
        assert_eq!(handle.rotation(1), Some(0));
        assert_eq!(handle.rotation(3), None);
    }
}
