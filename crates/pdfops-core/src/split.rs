//! PDF Split algorithm
//!
//! Every requested part is resolved against the page count before the first
//! output is built, so a bad page number anywhere aborts the whole split.

use std::collections::HashSet;

use lopdf::ObjectId;
use serde::{Deserialize, Serialize};

use crate::assemble::{flatten_inherited_attributes, rebuild_page_tree};
use crate::error::{PdfOpsError, ValidationError};
use crate::loader::{ensure_unlocked, save_document, DocumentHandle};
use crate::naming;
use crate::progress::TaskContext;
use crate::range::{page_numbers_to_indices, parse_page_range};
use crate::OutputFile;

/// How pages are picked out of the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum SplitMode {
    /// One part per range string, e.g. `["1-3", "4-6"]`
    Ranges(Vec<String>),
    /// One part per listed 1-based page; repeats allowed
    Extract(Vec<u32>),
    /// Consecutive chunks of this many pages
    EveryN(u32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// One file per part
    #[default]
    Separate,
    /// All parts concatenated into a single file
    Merged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSpec {
    pub mode: SplitMode,
    #[serde(default)]
    pub output: OutputMode,
}

/// Zero-based page indices of each output part.
pub(crate) struct SplitPlan {
    parts: Vec<Vec<usize>>,
    output: OutputMode,
}

pub(crate) fn plan_split(page_count: u32, spec: &SplitSpec) -> Result<SplitPlan, PdfOpsError> {
    let parts: Vec<Vec<usize>> = match &spec.mode {
        SplitMode::Ranges(ranges) => {
            if ranges.is_empty() {
                return Err(ValidationError::NoPages.into());
            }
            let parsed = ranges
                .iter()
                .map(|range| parse_page_range(range, page_count).map(|r| r.into_indices()))
                .collect::<Result<Vec<_>, _>>()?;
            match spec.output {
                OutputMode::Separate => parsed,
                OutputMode::Merged => vec![union_in_order(parsed)],
            }
        }
        SplitMode::Extract(pages) => {
            let indices = page_numbers_to_indices(pages, page_count)?;
            match spec.output {
                OutputMode::Separate => indices.into_iter().map(|i| vec![i]).collect(),
                OutputMode::Merged => vec![indices],
            }
        }
        SplitMode::EveryN(chunk_size) => {
            if *chunk_size == 0 {
                return Err(ValidationError::InvalidChunkSize.into());
            }
            let all: Vec<usize> = (0..page_count as usize).collect();
            let chunks: Vec<Vec<usize>> = all
                .chunks(*chunk_size as usize)
                .map(|chunk| chunk.to_vec())
                .collect();
            match spec.output {
                OutputMode::Separate => chunks,
                OutputMode::Merged => vec![all],
            }
        }
    };

    Ok(SplitPlan {
        parts,
        output: spec.output,
    })
}

/// Concatenate parts, keeping only the first occurrence of each page.
fn union_in_order(parts: Vec<Vec<usize>>) -> Vec<usize> {
    let mut seen = HashSet::new();
    parts
        .into_iter()
        .flatten()
        .filter(|index| seen.insert(*index))
        .collect()
}

pub(crate) fn execute_split(
    handle: DocumentHandle,
    plan: SplitPlan,
    name: &str,
    ctx: &mut TaskContext,
) -> Result<Vec<OutputFile>, PdfOpsError> {
    let mut base = handle.into_document();
    flatten_inherited_attributes(&mut base);
    let page_ids: Vec<ObjectId> = base.get_pages().into_values().collect();

    let total = plan.parts.len();
    let mut outputs = Vec::with_capacity(total);

    for (i, part) in plan.parts.iter().enumerate() {
        ctx.step(i, total, &format!("Extracting part {}/{}...", i + 1, total))?;

        let mut doc = base.clone();
        let selected: Vec<ObjectId> = part.iter().map(|&index| page_ids[index]).collect();
        rebuild_page_tree(&mut doc, &selected)?;

        let file_name = match plan.output {
            OutputMode::Separate => naming::pages_name(name, i + 1),
            OutputMode::Merged => naming::split_name(name),
        };
        outputs.push(OutputFile {
            name: file_name,
            bytes: save_document(&mut doc)?,
        });
    }

    ctx.finish("Complete");
    tracing::info!(parts = outputs.len(), "split document");
    Ok(outputs)
}

/// Split a document into one or more outputs named after `name`.
pub fn split(
    handle: DocumentHandle,
    spec: &SplitSpec,
    name: &str,
    ctx: &mut TaskContext,
) -> Result<Vec<OutputFile>, PdfOpsError> {
    ensure_unlocked(&handle)?;
    let plan = plan_split(handle.page_count(), spec)?;
    execute_split(handle, plan, name, ctx)
}

/// Extract the given 1-indexed pages, in order, into a single PDF.
pub fn split_document(bytes: &[u8], pages: Vec<u32>) -> Result<Vec<u8>, PdfOpsError> {
    let handle = crate::loader::load_unlocked(bytes)?;
    let spec = SplitSpec {
        mode: SplitMode::Extract(pages),
        output: OutputMode::Merged,
    };
    let mut outputs = split(handle, &spec, "document", &mut TaskContext::detached())?;
    outputs
        .pop()
        .map(|output| output.bytes)
        .ok_or_else(|| PdfOpsError::Operation("Split produced no output".into()))
}
