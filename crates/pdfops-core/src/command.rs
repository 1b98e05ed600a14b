use std::time::Instant;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::compress::CompressSpec;
use crate::error::{FormatError, PdfOpsError};
use crate::guard::BruteForceGuard;
use crate::job::{DocumentOp, Transform, TransformJob};
use crate::loader;
use crate::merge::MergeSpec;
use crate::progress::TaskContext;
use crate::rotate::RotateSpec;
use crate::security::EncryptSpec;
use crate::split::SplitSpec;
use crate::{OutputFile, SourceFile};

/// A named file carried as base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedFile {
    pub name: String,
    /// Base64-encoded bytes
    pub data: String,
}

impl EncodedFile {
    pub fn encode(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            data: STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<SourceFile, PdfOpsError> {
        let bytes = STANDARD.decode(self.data.as_bytes()).map_err(|e| {
            FormatError::Unparseable(format!("{}: invalid base64: {}", self.name, e))
        })?;
        Ok(SourceFile::new(self.name.clone(), bytes))
    }
}

impl From<&OutputFile> for EncodedFile {
    fn from(output: &OutputFile) -> Self {
        EncodedFile::encode(output.name.clone(), &output.bytes)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PdfCommand {
    Merge {
        files: Vec<EncodedFile>,
        /// Every page of every file, in order, when absent
        #[serde(default)]
        spec: Option<MergeSpec>,
    },
    Split {
        file: EncodedFile,
        spec: SplitSpec,
    },
    Rotate {
        file: EncodedFile,
        spec: RotateSpec,
    },
    Compress {
        file: EncodedFile,
        #[serde(default)]
        spec: CompressSpec,
    },
    Encrypt {
        file: EncodedFile,
        spec: EncryptSpec,
    },
    Decrypt {
        file: EncodedFile,
        password: String,
    },
}

impl PdfCommand {
    pub fn from_json(json: &str) -> Result<Self, PdfOpsError> {
        serde_json::from_str(json)
            .map_err(|e| PdfOpsError::Operation(format!("Invalid command: {}", e)))
    }

    fn into_transform(self) -> Result<Transform, PdfOpsError> {
        let single = |file: EncodedFile, op: DocumentOp| -> Result<Transform, PdfOpsError> {
            Ok(Transform::Single {
                source: file.decode()?,
                op,
            })
        };

        match self {
            PdfCommand::Merge { files, spec } => {
                let spec = spec.unwrap_or_else(|| MergeSpec::all(files.len()));
                let sources = files
                    .iter()
                    .map(EncodedFile::decode)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Transform::Merge { sources, spec })
            }
            PdfCommand::Split { file, spec } => single(file, DocumentOp::Split(spec)),
            PdfCommand::Rotate { file, spec } => single(file, DocumentOp::Rotate(spec)),
            PdfCommand::Compress { file, spec } => single(file, DocumentOp::Compress(spec)),
            PdfCommand::Encrypt { file, spec } => single(file, DocumentOp::Encrypt(spec)),
            PdfCommand::Decrypt { file, password } => {
                single(file, DocumentOp::Decrypt { password })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub success: bool,
    pub outputs: Vec<EncodedFile>,
    pub error: Option<String>,
    pub metrics: Option<ProcessMetrics>,
}

impl ProcessResult {
    pub fn to_json(&self) -> Result<String, PdfOpsError> {
        serde_json::to_string(self)
            .map_err(|e| PdfOpsError::Operation(format!("Failed to encode result: {}", e)))
    }

    fn failure(error: &PdfOpsError) -> Self {
        Self {
            success: false,
            outputs: Vec::new(),
            error: Some(error.to_string()),
            metrics: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    /// Pages across all outputs
    pub page_count: u32,
    pub processing_time_ms: u64,
}

/// Run a command to completion. Failures are reported in the result, never
/// as partial output.
pub fn execute(
    command: PdfCommand,
    ctx: &mut TaskContext,
    guard: Option<&mut BruteForceGuard>,
) -> ProcessResult {
    let start = Instant::now();

    let transform = match command.into_transform() {
        Ok(transform) => transform,
        Err(err) => return ProcessResult::failure(&err),
    };
    let input_size_bytes = match &transform {
        Transform::Merge { sources, .. } => sources.iter().map(|s| s.bytes.len()).sum(),
        Transform::Single { source, .. } => source.bytes.len(),
    };

    let mut job = TransformJob::new(transform);
    let outputs = match job.run(ctx, guard) {
        Ok(outputs) => outputs,
        Err(err) => {
            tracing::debug!(state = ?job.state(), error = %err, "command failed");
            return ProcessResult::failure(&err);
        }
    };

    let page_count = outputs
        .iter()
        .filter_map(|output| loader::inspect(&output.bytes).ok())
        .map(|info| info.page_count)
        .sum();

    ProcessResult {
        success: true,
        metrics: Some(ProcessMetrics {
            input_size_bytes,
            output_size_bytes: outputs.iter().map(|o| o.bytes.len()).sum(),
            page_count,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }),
        outputs: outputs.iter().map(EncodedFile::from).collect(),
        error: None,
    }
}
