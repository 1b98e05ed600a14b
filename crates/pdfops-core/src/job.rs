//! Transform lifecycle
//!
//! Every transform moves through
//! `Idle -> Validating -> Configuring -> Running` and ends in exactly one of
//! `Completed`, `Failed` or `Cancelled`. Loading and header checks happen
//! while validating, page ranges and profiles are resolved while
//! configuring, and only the running phase builds output.

use serde::Serialize;

use crate::compress::{execute_compress, CompressSpec};
use crate::error::{PasswordError, PdfOpsError, ValidationError};
use crate::guard::BruteForceGuard;
use crate::loader::{self, ensure_unlocked, DocumentHandle};
use crate::merge::{execute_merge, load_sources, plan_merge, MergePlan, MergeSpec};
use crate::naming;
use crate::progress::TaskContext;
use crate::rotate::{execute_rotate, plan_rotate, RotatePlan, RotateSpec};
use crate::security::{self, EncryptSpec};
use crate::split::{execute_split, plan_split, SplitPlan, SplitSpec};
use crate::{OutputFile, SourceFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransformState {
    Idle,
    Validating,
    Configuring,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TransformState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransformState::Completed | TransformState::Failed | TransformState::Cancelled
        )
    }

    fn can_become(self, next: TransformState) -> bool {
        use TransformState::*;
        match (self, next) {
            (Idle, Validating)
            | (Validating, Configuring)
            | (Configuring, Running)
            | (Running, Completed) => true,
            (Validating | Configuring | Running, Failed | Cancelled) => true,
            _ => false,
        }
    }
}

/// A single-document operation.
#[derive(Debug, Clone)]
pub enum DocumentOp {
    Split(SplitSpec),
    Rotate(RotateSpec),
    Compress(CompressSpec),
    Encrypt(EncryptSpec),
    Decrypt { password: String },
}

#[derive(Debug, Clone)]
pub enum Transform {
    Merge {
        sources: Vec<SourceFile>,
        spec: MergeSpec,
    },
    Single { source: SourceFile, op: DocumentOp },
}

/// Loaded input, after validation.
enum Validated {
    Merge {
        documents: Vec<DocumentHandle>,
        spec: MergeSpec,
        name: String,
    },
    Single {
        handle: DocumentHandle,
        op: DocumentOp,
        name: String,
    },
}

/// Fully resolved work, ready to run.
enum Configured {
    Merge { plan: MergePlan, name: String },
    Split {
        handle: DocumentHandle,
        plan: SplitPlan,
        name: String,
    },
    Rotate {
        handle: DocumentHandle,
        plan: RotatePlan,
        name: String,
    },
    Compress {
        handle: DocumentHandle,
        spec: CompressSpec,
        name: String,
    },
    Encrypt {
        handle: DocumentHandle,
        spec: EncryptSpec,
        name: String,
    },
    Decrypt {
        handle: DocumentHandle,
        password: String,
        name: String,
    },
}

#[derive(Debug)]
pub struct TransformJob {
    transform: Option<Transform>,
    state: TransformState,
    history: Vec<TransformState>,
}

impl TransformJob {
    pub fn new(transform: Transform) -> Self {
        Self {
            transform: Some(transform),
            state: TransformState::Idle,
            history: vec![TransformState::Idle],
        }
    }

    pub fn state(&self) -> TransformState {
        self.state
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn history(&self) -> &[TransformState] {
        &self.history
    }

    fn transition(&mut self, next: TransformState) {
        debug_assert!(
            self.state.can_become(next),
            "{:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "transform state");
        self.state = next;
        self.history.push(next);
    }

    /// Run the transform to a terminal state. A job runs once.
    ///
    /// Decryption goes through `guard` when one is supplied.
    pub fn run(
        &mut self,
        ctx: &mut TaskContext,
        guard: Option<&mut BruteForceGuard>,
    ) -> Result<Vec<OutputFile>, PdfOpsError> {
        let Some(transform) = self.transform.take() else {
            return Err(PdfOpsError::Operation("Transform has already run".into()));
        };

        let result = self.drive(transform, ctx, guard);
        let terminal = match &result {
            Ok(_) => TransformState::Completed,
            Err(err) if err.is_cancelled() => TransformState::Cancelled,
            Err(_) => TransformState::Failed,
        };
        self.transition(terminal);
        if terminal == TransformState::Completed {
            ctx.finish("Complete");
        }
        result
    }

    fn drive(
        &mut self,
        transform: Transform,
        ctx: &mut TaskContext,
        guard: Option<&mut BruteForceGuard>,
    ) -> Result<Vec<OutputFile>, PdfOpsError> {
        self.transition(TransformState::Validating);
        ctx.checkpoint()?;
        let validated = validate(transform)?;

        self.transition(TransformState::Configuring);
        ctx.checkpoint()?;
        let configured = configure(validated)?;

        self.transition(TransformState::Running);
        execute(configured, ctx, guard)
    }
}

fn validate(transform: Transform) -> Result<Validated, PdfOpsError> {
    match transform {
        Transform::Merge { sources, spec } => {
            let documents = load_sources(&sources, &spec)?;
            let name = spec
                .entries
                .first()
                .and_then(|entry| sources.get(entry.document))
                .map(|source| source.name.clone())
                .unwrap_or_default();
            Ok(Validated::Merge {
                documents,
                spec,
                name,
            })
        }
        Transform::Single { source, op } => {
            if let DocumentOp::Encrypt(spec) = &op {
                if spec.password.trim().is_empty() {
                    return Err(PasswordError::PasswordRequired.into());
                }
            }
            let handle = loader::load(&source.bytes)?;
            match &op {
                DocumentOp::Encrypt(_) if handle.is_encrypted() => {
                    return Err(ValidationError::AlreadyEncrypted.into())
                }
                DocumentOp::Encrypt(_) | DocumentOp::Decrypt { .. } => {}
                _ => ensure_unlocked(&handle)?,
            }
            Ok(Validated::Single {
                handle,
                op,
                name: source.name,
            })
        }
    }
}

fn configure(validated: Validated) -> Result<Configured, PdfOpsError> {
    Ok(match validated {
        Validated::Merge { documents, spec, name } => Configured::Merge {
            plan: plan_merge(&documents, &spec)?,
            name,
        },
        Validated::Single { handle, op, name } => match op {
            DocumentOp::Split(spec) => Configured::Split {
                plan: plan_split(handle.page_count(), &spec)?,
                handle,
                name,
            },
            DocumentOp::Rotate(spec) => Configured::Rotate {
                plan: plan_rotate(&handle, &spec)?,
                handle,
                name,
            },
            DocumentOp::Compress(spec) => Configured::Compress { handle, spec, name },
            DocumentOp::Encrypt(spec) => Configured::Encrypt { handle, spec, name },
            DocumentOp::Decrypt { password } => Configured::Decrypt {
                handle,
                password,
                name,
            },
        },
    })
}

fn execute(
    configured: Configured,
    ctx: &mut TaskContext,
    guard: Option<&mut BruteForceGuard>,
) -> Result<Vec<OutputFile>, PdfOpsError> {
    let single = |name: String, bytes: Vec<u8>| -> Result<Vec<OutputFile>, PdfOpsError> {
        Ok(vec![OutputFile { name, bytes }])
    };

    match configured {
        Configured::Merge { plan, name } => {
            let bytes = execute_merge(plan, ctx)?;
            single(naming::merged_name(&name), bytes)
        }
        Configured::Split { handle, plan, name } => execute_split(handle, plan, &name, ctx),
        Configured::Rotate { handle, plan, name } => {
            let bytes = execute_rotate(handle, plan, ctx)?;
            single(naming::rotated_name(&name), bytes)
        }
        Configured::Compress { handle, spec, name } => {
            let bytes = execute_compress(handle, &spec, ctx)?;
            single(naming::compressed_name(&name), bytes)
        }
        Configured::Encrypt { handle, spec, name } => {
            ctx.report(50, "Encrypting...");
            let bytes = security::encrypt(handle, &spec)?;
            single(naming::encrypted_name(&name), bytes)
        }
        Configured::Decrypt { handle, password, name } => {
            ctx.report(50, "Decrypting...");
            let bytes = match guard {
                Some(guard) => guard.unlock(handle, &password)?,
                None => security::decrypt(handle, &password)?,
            };
            single(naming::unlocked_name(&name), bytes)
        }
    }
}
