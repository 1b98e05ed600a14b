//! PDF Merge algorithm
//!
//! Combines pages of several PDFs into a single document.

use std::collections::BTreeSet;

use lopdf::{Document, ObjectId};
use serde::{Deserialize, Serialize};

use crate::assemble::{flatten_inherited_attributes, import_document, rebuild_page_tree};
use crate::error::{PdfOpsError, ValidationError};
use crate::loader::{self, save_document, DocumentHandle};
use crate::naming;
use crate::progress::TaskContext;
use crate::range::PageSelection;
use crate::SourceFile;

/// One source document and the pages taken from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeEntry {
    /// Index into the list of source files
    pub document: usize,
    #[serde(default)]
    pub pages: PageSelection,
}

/// Ordered merge plan. Output pages follow entry order, then page order
/// within each entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSpec {
    pub entries: Vec<MergeEntry>,
}

impl MergeSpec {
    /// Every page of `count` documents, in order.
    pub fn all(count: usize) -> Self {
        Self {
            entries: (0..count)
                .map(|document| MergeEntry {
                    document,
                    pages: PageSelection::All,
                })
                .collect(),
        }
    }
}

/// A validated merge: each loaded source with the zero-based pages to copy.
pub(crate) struct MergePlan {
    parts: Vec<(DocumentHandle, Vec<usize>)>,
}

impl MergePlan {
    pub(crate) fn page_count(&self) -> usize {
        self.parts.iter().map(|(_, pages)| pages.len()).sum()
    }
}

/// Load every source referenced by `spec`.
///
/// At least two distinct uploaded documents must be referenced; one
/// document listed in several entries counts once.
pub(crate) fn load_sources(
    sources: &[SourceFile],
    spec: &MergeSpec,
) -> Result<Vec<DocumentHandle>, PdfOpsError> {
    let referenced: BTreeSet<usize> = spec
        .entries
        .iter()
        .map(|entry| entry.document)
        .filter(|&document| document < sources.len())
        .collect();
    let count = referenced.len();
    if count < 2 {
        return Err(ValidationError::InsufficientSources(count).into());
    }

    // Header checks first so a bad upload fails before any parse
    for source in sources {
        loader::check_magic(&source.bytes, loader::ContainerKind::Pdf)?;
    }

    sources
        .iter()
        .map(|source| loader::load_unlocked(&source.bytes))
        .collect()
}

/// Resolve each entry's page selection against its loaded document.
pub(crate) fn plan_merge(
    documents: &[DocumentHandle],
    spec: &MergeSpec,
) -> Result<MergePlan, PdfOpsError> {
    let mut parts = Vec::with_capacity(spec.entries.len());
    for entry in &spec.entries {
        let handle = documents
            .get(entry.document)
            .ok_or(ValidationError::UnknownDocument {
                index: entry.document,
                available: documents.len(),
            })?;
        let pages = entry.pages.resolve(handle.page_count())?.into_indices();
        parts.push((handle.clone(), pages));
    }
    Ok(MergePlan { parts })
}

/// Assemble the planned pages into one document.
///
/// Each entry gets its own copy of its source's objects, so a document may
/// appear in several entries.
pub(crate) fn execute_merge(
    plan: MergePlan,
    ctx: &mut TaskContext,
) -> Result<Vec<u8>, PdfOpsError> {
    let total = plan.parts.len();
    let expected_pages = plan.page_count();

    let version = plan
        .parts
        .iter()
        .map(|(handle, _)| handle.document().version.clone())
        .max()
        .unwrap_or_else(|| "1.5".to_string());
    let mut dest = Document::with_version(version);
    let mut page_refs: Vec<ObjectId> = Vec::with_capacity(expected_pages);

    for (i, (handle, pages)) in plan.parts.into_iter().enumerate() {
        ctx.step(
            i,
            total,
            &format!("Processing document {}/{}...", i + 1, total),
        )?;

        let mut source = handle.into_document();
        flatten_inherited_attributes(&mut source);
        let source_pages = import_document(&mut dest, source);
        page_refs.extend(pages.into_iter().map(|index| source_pages[index]));
    }

    ctx.step(total, total, "Merging...")?;
    rebuild_page_tree(&mut dest, &page_refs)?;

    let output = save_document(&mut dest)?;
    tracing::info!(
        sources = total,
        pages = expected_pages,
        bytes = output.len(),
        "merged documents"
    );
    Ok(output)
}

/// Merge the pages selected by `spec` into one PDF named `<stem>_merged.pdf`
/// after the first entry's source.
pub fn merge(
    sources: &[SourceFile],
    spec: &MergeSpec,
    ctx: &mut TaskContext,
) -> Result<crate::OutputFile, PdfOpsError> {
    let documents = load_sources(sources, spec)?;
    let plan = plan_merge(&documents, spec)?;
    drop(documents);
    let bytes = execute_merge(plan, ctx)?;

    let base = spec
        .entries
        .first()
        .and_then(|entry| sources.get(entry.document))
        .map(|source| source.name.as_str())
        .unwrap_or("document");
    ctx.finish("Complete");
    Ok(crate::OutputFile {
        name: naming::merged_name(base),
        bytes,
    })
}

/// Merge all pages of every document, in order.
pub fn merge_documents(documents: Vec<Vec<u8>>) -> Result<Vec<u8>, PdfOpsError> {
    let sources: Vec<SourceFile> = documents
        .into_iter()
        .enumerate()
        .map(|(i, bytes)| SourceFile::new(format!("document{}.pdf", i + 1), bytes))
        .collect();
    let spec = MergeSpec::all(sources.len());
    merge(&sources, &spec, &mut TaskContext::detached()).map(|output| output.bytes)
}
