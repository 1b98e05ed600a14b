//! Page rotation
//!
//! Rotation is absolute: the selected pages get `/Rotate` set to the
//! requested angle whatever they were before. Pages outside the selection
//! are not touched.

use lopdf::{Object, ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::{PdfOpsError, ValidationError};
use crate::loader::{ensure_unlocked, save_document, DocumentHandle};
use crate::progress::TaskContext;
use crate::range::PageSelection;

/// The rotations a page may be set to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotationAngle {
    Deg90,
    Deg180,
    Deg270,
}

impl RotationAngle {
    pub fn degrees(self) -> i64 {
        match self {
            RotationAngle::Deg90 => 90,
            RotationAngle::Deg180 => 180,
            RotationAngle::Deg270 => 270,
        }
    }
}

impl TryFrom<i64> for RotationAngle {
    type Error = ValidationError;

    fn try_from(degrees: i64) -> Result<Self, Self::Error> {
        match degrees {
            90 => Ok(RotationAngle::Deg90),
            180 => Ok(RotationAngle::Deg180),
            270 => Ok(RotationAngle::Deg270),
            other => Err(ValidationError::InvalidAngle(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotateSpec {
    /// Degrees clockwise; must be 90, 180 or 270
    pub angle: i64,
    #[serde(default)]
    pub pages: PageSelection,
}

/// Validated rotation: the angle and the page objects it applies to.
pub(crate) struct RotatePlan {
    angle: RotationAngle,
    targets: Vec<ObjectId>,
}

pub(crate) fn plan_rotate(
    handle: &DocumentHandle,
    spec: &RotateSpec,
) -> Result<RotatePlan, PdfOpsError> {
    let angle = RotationAngle::try_from(spec.angle)?;
    let selection = spec.pages.resolve(handle.page_count())?;
    let page_ids = handle.page_ids();
    let targets = selection
        .ascending()
        .into_iter()
        .map(|index| page_ids[index])
        .collect();
    Ok(RotatePlan { angle, targets })
}

pub(crate) fn execute_rotate(
    mut handle: DocumentHandle,
    plan: RotatePlan,
    ctx: &mut TaskContext,
) -> Result<Vec<u8>, PdfOpsError> {
    let total = plan.targets.len();
    let degrees = plan.angle.degrees();
    let doc = handle.document_mut();

    for (i, page_id) in plan.targets.iter().enumerate() {
        ctx.step(i, total, &format!("Rotating page {}/{}...", i + 1, total))?;
        let page = doc
            .get_object_mut(*page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| PdfOpsError::Operation(format!("Invalid page object {:?}", page_id)))?;
        page.set("Rotate", Object::Integer(degrees));
    }

    let output = save_document(doc)?;
    ctx.finish("Complete");
    tracing::info!(pages = total, degrees, "rotated pages");
    Ok(output)
}

/// Set the rotation of the selected pages.
pub fn rotate(
    handle: DocumentHandle,
    spec: &RotateSpec,
    ctx: &mut TaskContext,
) -> Result<Vec<u8>, PdfOpsError> {
    ensure_unlocked(&handle)?;
    let plan = plan_rotate(&handle, spec)?;
    execute_rotate(handle, plan, ctx)
}
