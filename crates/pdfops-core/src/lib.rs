//! PDF structural transforms
//!
//! Merge, split, rotate, compress, encrypt and decrypt PDFs held in memory,
//! using lopdf for parsing and serialization.
//!
//! Each transform can be called directly (`merge::merge`, `split::split`,
//! ...) or driven through a [`job::TransformJob`], which records the
//! lifecycle state, or through [`command::execute`] for JSON callers.
//! Password attempts go through a [`guard::BruteForceGuard`].

pub mod command;
pub mod compress;
pub mod error;
pub mod guard;
pub mod job;
pub mod loader;
pub mod merge;
pub mod naming;
pub mod progress;
pub mod range;
pub mod rotate;
pub mod security;
pub mod split;

mod assemble;
mod codec;

#[cfg(test)]
mod test_support;

use std::fmt;

pub use command::{execute, EncodedFile, PdfCommand, ProcessMetrics, ProcessResult};
pub use compress::{compress, CompressSpec, CompressionLevel};
pub use error::{FormatError, PasswordError, PdfOpsError, RangeError, ValidationError};
pub use guard::{BruteForceGuard, LockoutPolicy, LockoutState};
pub use job::{DocumentOp, Transform, TransformJob, TransformState};
pub use loader::{inspect, load, DocumentHandle, PdfInfo};
pub use merge::{merge, merge_documents, MergeEntry, MergeSpec};
pub use progress::{CancellationToken, ProgressReporter, TaskContext};
pub use range::{parse_page_range, PageRange, PageSelection};
pub use rotate::{rotate, RotateSpec};
pub use security::{decrypt, encrypt, is_encrypted, EncryptSpec, EncryptionAlgorithm, Permissions};
pub use split::{split, split_document, OutputMode, SplitMode, SplitSpec};

/// An input document and the file name it came with.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A produced document with its suggested file name.
#[derive(Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for OutputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, PdfOpsError> {
    load(bytes).map(|handle| handle.page_count())
}

/// Effective rotation of a 1-based page, following page tree inheritance.
pub fn page_rotation(handle: &DocumentHandle, page: u32) -> Option<i64> {
    handle.rotation(page)
}
