//! Compression profiles
//!
//! Best effort: the output keeps every page and its visual content, but is
//! not guaranteed to be smaller than the input. Already well-packed files can
//! grow slightly after re-serialization.

use std::collections::HashSet;

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

use crate::codec::{deflate, inflate};
use crate::error::PdfOpsError;
use crate::loader::{ensure_unlocked, save_document, DocumentHandle};
use crate::progress::TaskContext;

/// Info dictionary entries dropped by `remove_metadata`.
const METADATA_KEYS: [&[u8]; 5] = [
    b"Author",
    b"Creator",
    b"Producer",
    b"CreationDate",
    b"ModDate",
];

/// Form XObjects nest; stop following them past this depth.
const MAX_FORM_DEPTH: usize = 8;

/// Streams shorter than this are left as they are.
const MIN_STREAM_LEN: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    #[default]
    Medium,
    High,
    Extreme,
}

/// Concrete parameters behind a [`CompressionLevel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionProfile {
    /// zlib level used for every stream written
    pub flate_level: u32,
    /// Images whose larger side exceeds this are downsampled
    pub max_image_dimension: u32,
    /// Inflate and re-deflate streams that are already FlateDecode
    pub recompress_deflated: bool,
}

impl CompressionLevel {
    pub fn profile(self) -> CompressionProfile {
        match self {
            CompressionLevel::Low => CompressionProfile {
                flate_level: 5,
                max_image_dimension: 4096,
                recompress_deflated: false,
            },
            CompressionLevel::Medium => CompressionProfile {
                flate_level: 6,
                max_image_dimension: 2400,
                recompress_deflated: false,
            },
            CompressionLevel::High => CompressionProfile {
                flate_level: 8,
                max_image_dimension: 1600,
                recompress_deflated: true,
            },
            CompressionLevel::Extreme => CompressionProfile {
                flate_level: 9,
                max_image_dimension: 1024,
                recompress_deflated: true,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressSpec {
    #[serde(default)]
    pub level: CompressionLevel,
    #[serde(default)]
    pub optimize_images: bool,
    #[serde(default)]
    pub remove_metadata: bool,
}

/// Apply a compression profile to a document.
pub fn compress(
    handle: DocumentHandle,
    spec: &CompressSpec,
    ctx: &mut TaskContext,
) -> Result<Vec<u8>, PdfOpsError> {
    ensure_unlocked(&handle)?;
    execute_compress(handle, spec, ctx)
}

pub(crate) fn execute_compress(
    handle: DocumentHandle,
    spec: &CompressSpec,
    ctx: &mut TaskContext,
) -> Result<Vec<u8>, PdfOpsError> {
    let profile = spec.level.profile();
    let input_size = handle.info().size_bytes;
    let mut doc = handle.into_document();

    if spec.remove_metadata {
        strip_metadata(&mut doc);
    }

    let mut images_done = HashSet::new();
    if spec.optimize_images {
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        let total = page_ids.len();
        for (i, page_id) in page_ids.into_iter().enumerate() {
            ctx.step(
                i,
                total * 2,
                &format!("Optimizing images on page {}/{}...", i + 1, total),
            )?;
            for image_id in page_images(&doc, page_id) {
                if images_done.insert(image_id) {
                    optimize_image(&mut doc, image_id, &profile)?;
                }
            }
        }
    }

    recompress_streams(&mut doc, &profile, &images_done, ctx)?;
    doc.prune_objects();

    let output = save_document(&mut doc)?;
    ctx.finish("Complete");
    tracing::info!(
        level = ?spec.level,
        input_bytes = input_size,
        output_bytes = output.len(),
        "compressed document"
    );
    Ok(output)
}

/// Drop author, producer and date fields plus the XMP metadata stream.
fn strip_metadata(doc: &mut Document) {
    let info_id = doc.trailer.get(b"Info").and_then(Object::as_reference).ok();
    let info = match info_id {
        Some(id) => doc.get_object_mut(id).and_then(Object::as_dict_mut).ok(),
        None => doc
            .trailer
            .get_mut(b"Info")
            .and_then(Object::as_dict_mut)
            .ok(),
    };
    if let Some(info) = info {
        for key in METADATA_KEYS {
            info.remove(key);
        }
    }

    if let Ok(catalog_id) = doc.trailer.get(b"Root").and_then(Object::as_reference) {
        if let Ok(catalog) = doc.get_object_mut(catalog_id).and_then(Object::as_dict_mut) {
            catalog.remove(b"Metadata");
        }
    }
}

/// Image XObjects drawn by a page, including those inside form XObjects
/// and soft masks.
fn page_images(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let mut images = Vec::new();
    let mut visited = HashSet::new();
    if let Ok(page) = doc.get_object(page_id).and_then(Object::as_dict) {
        collect_images(doc, page, 0, &mut visited, &mut images);
    }
    images
}

fn collect_images(
    doc: &Document,
    owner: &Dictionary,
    depth: usize,
    visited: &mut HashSet<ObjectId>,
    images: &mut Vec<ObjectId>,
) {
    if depth > MAX_FORM_DEPTH {
        return;
    }
    let Some(resources) = resolve_dict(doc, owner.get(b"Resources").ok()) else {
        return;
    };
    let Some(xobjects) = resolve_dict(doc, resources.get(b"XObject").ok()) else {
        return;
    };

    for (_, value) in xobjects.iter() {
        let Ok(id) = value.as_reference() else {
            continue;
        };
        if !visited.insert(id) {
            continue;
        }
        let Ok(Object::Stream(stream)) = doc.get_object(id) else {
            continue;
        };
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => {
                images.push(id);
                if let Ok(mask_id) = stream.dict.get(b"SMask").and_then(Object::as_reference) {
                    if visited.insert(mask_id) {
                        images.push(mask_id);
                    }
                }
            }
            Ok(b"Form") => collect_images(doc, &stream.dict, depth + 1, visited, images),
            _ => {}
        }
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: Option<&'a Object>) -> Option<&'a Dictionary> {
    match obj? {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_object(*id).and_then(Object::as_dict).ok(),
        _ => None,
    }
}

/// Raster layout of an image we know how to resample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RasterLayout {
    width: usize,
    height: usize,
    components: usize,
    /// Bytes of decoded samples the dimensions call for
    sample_len: usize,
    deflated: bool,
}

impl RasterLayout {
    /// `None` for anything other than 8-bit Gray/RGB/CMYK samples stored raw
    /// or with plain FlateDecode.
    fn read(doc: &Document, dict: &Dictionary) -> Option<Self> {
        if dict
            .get(b"ImageMask")
            .and_then(Object::as_bool)
            .unwrap_or(false)
        {
            return None;
        }
        if dict.get(b"BitsPerComponent").and_then(Object::as_i64).ok()? != 8 {
            return None;
        }
        if has_predictor(doc, dict) {
            return None;
        }

        let deflated = match dict.get(b"Filter") {
            Err(_) => false,
            Ok(filter) => match single_filter(filter)? {
                b"FlateDecode" => true,
                _ => return None,
            },
        };

        let components = color_components(doc, dict.get(b"ColorSpace").ok()?)?;
        let width = usize::try_from(dict.get(b"Width").and_then(Object::as_i64).ok()?).ok()?;
        let height = usize::try_from(dict.get(b"Height").and_then(Object::as_i64).ok()?).ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        let sample_len = width.checked_mul(height)?.checked_mul(components)?;

        Some(Self {
            width,
            height,
            components,
            sample_len,
            deflated,
        })
    }
}

fn single_filter(filter: &Object) -> Option<&[u8]> {
    match filter {
        Object::Name(name) => Some(name),
        Object::Array(filters) if filters.len() == 1 => filters[0].as_name().ok(),
        _ => None,
    }
}

/// True unless the decode parameters are absent or say "no predictor".
/// Parameter arrays are treated as predicted.
fn has_predictor(doc: &Document, dict: &Dictionary) -> bool {
    let parms = match dict.get(b"DecodeParms") {
        Err(_) | Ok(Object::Null) => return false,
        Ok(parms) => parms,
    };
    match resolve_dict(doc, Some(parms)) {
        Some(parms) => parms
            .get(b"Predictor")
            .and_then(Object::as_i64)
            .map_or(false, |predictor| predictor > 1),
        None => true,
    }
}

fn color_components(doc: &Document, color_space: &Object) -> Option<usize> {
    match color_space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Some(1),
            b"DeviceRGB" | b"CalRGB" => Some(3),
            b"DeviceCMYK" => Some(4),
            _ => None,
        },
        Object::Array(parts) if parts.len() == 2 && parts[0].as_name().ok()? == b"ICCBased" => {
            let profile_id = parts[1].as_reference().ok()?;
            let Ok(Object::Stream(profile)) = doc.get_object(profile_id) else {
                return None;
            };
            let n = profile.dict.get(b"N").and_then(Object::as_i64).ok()?;
            matches!(n, 1 | 3 | 4).then_some(n as usize)
        }
        Object::Reference(id) => color_components(doc, doc.get_object(*id).ok()?),
        _ => None,
    }
}

/// Re-encode one image at the profile's target. Images in formats we do not
/// decode are left byte-identical.
fn optimize_image(
    doc: &mut Document,
    image_id: ObjectId,
    profile: &CompressionProfile,
) -> Result<(), PdfOpsError> {
    let (layout, samples, original_len) = {
        let Ok(Object::Stream(stream)) = doc.get_object(image_id) else {
            return Ok(());
        };
        let Some(layout) = RasterLayout::read(doc, &stream.dict) else {
            tracing::debug!(?image_id, "skipping image in unsupported encoding");
            return Ok(());
        };
        let samples = if layout.deflated {
            match inflate(&stream.content) {
                Ok(samples) => samples,
                Err(_) => return Ok(()),
            }
        } else {
            stream.content.clone()
        };
        (layout, samples, stream.content.len())
    };

    if samples.len() < layout.sample_len {
        tracing::debug!(?image_id, "skipping image with short sample data");
        return Ok(());
    }

    let max_side = layout.width.max(layout.height);
    let limit = profile.max_image_dimension as usize;
    let (samples, width, height) = if max_side > limit {
        let factor = max_side.div_ceil(limit);
        downsample(&samples, &layout, factor)
    } else {
        (samples, layout.width, layout.height)
    };
    let resized = width != layout.width || height != layout.height;

    let used = if resized {
        samples.len()
    } else {
        layout.sample_len
    };
    let encoded = deflate(&samples[..used], profile.flate_level)?;
    if !resized && encoded.len() >= original_len {
        return Ok(());
    }

    if let Ok(Object::Stream(stream)) = doc.get_object_mut(image_id) {
        stream.dict.set("Width", Object::Integer(width as i64));
        stream.dict.set("Height", Object::Integer(height as i64));
        stream
            .dict
            .set("Filter", Object::Name(b"FlateDecode".to_vec()));
        stream.dict.remove(b"DecodeParms");
        stream.set_content(encoded);
    }
    tracing::debug!(
        ?image_id,
        from = ?(layout.width, layout.height),
        to = ?(width, height),
        "re-encoded image"
    );
    Ok(())
}

/// Box-filter downsample by an integer factor.
fn downsample(samples: &[u8], layout: &RasterLayout, factor: usize) -> (Vec<u8>, usize, usize) {
    let RasterLayout {
        width,
        height,
        components,
        ..
    } = *layout;
    let new_width = width.div_ceil(factor);
    let new_height = height.div_ceil(factor);
    let mut out = Vec::with_capacity(new_width * new_height * components);

    for oy in 0..new_height {
        let y0 = oy * factor;
        let y1 = (y0 + factor).min(height);
        for ox in 0..new_width {
            let x0 = ox * factor;
            let x1 = (x0 + factor).min(width);
            let count = ((y1 - y0) * (x1 - x0)) as u32;
            for c in 0..components {
                let mut sum = 0u32;
                for y in y0..y1 {
                    let row = y * width;
                    for x in x0..x1 {
                        sum += samples[(row + x) * components + c] as u32;
                    }
                }
                out.push(((sum + count / 2) / count) as u8);
            }
        }
    }

    (out, new_width, new_height)
}

/// Deflate unfiltered streams and, on aggressive profiles, re-deflate
/// FlateDecode streams at a higher level. A stream is only replaced when
/// the new encoding is smaller.
fn recompress_streams(
    doc: &mut Document,
    profile: &CompressionProfile,
    skip: &HashSet<ObjectId>,
    ctx: &mut TaskContext,
) -> Result<(), PdfOpsError> {
    let ids: Vec<ObjectId> = doc.objects.keys().copied().collect();
    let total = ids.len();

    for (i, id) in ids.into_iter().enumerate() {
        if i % 32 == 0 {
            ctx.step(total + i, total * 2, "Compressing streams...")?;
        }
        if skip.contains(&id) {
            continue;
        }
        let Some(Object::Stream(stream)) = doc.objects.get_mut(&id) else {
            continue;
        };
        if !stream.allows_compression || stream.content.len() < MIN_STREAM_LEN {
            continue;
        }
        if let Ok(kind) = stream.dict.get(b"Type").and_then(Object::as_name) {
            if matches!(kind, b"XRef" | b"ObjStm" | b"Metadata") {
                continue;
            }
        }

        let decoded = match stream.dict.get(b"Filter") {
            Err(_) => stream.content.clone(),
            Ok(filter) if profile.recompress_deflated && !stream.dict.has(b"DecodeParms") => {
                match single_filter(filter) {
                    Some(b"FlateDecode") => match inflate(&stream.content) {
                        Ok(decoded) => decoded,
                        Err(_) => continue,
                    },
                    _ => continue,
                }
            }
            Ok(_) => continue,
        };

        let encoded = deflate(&decoded, profile.flate_level)?;
        if encoded.len() < stream.content.len() {
            stream
                .dict
                .set("Filter", Object::Name(b"FlateDecode".to_vec()));
            stream.set_content(encoded);
        }
    }
    Ok(())
}
