//! Page tree assembly shared by merge and split.
//!
//! Pages are moved between trees by reference: content streams and
//! resources are never re-encoded. Inheritable attributes are pushed down
//! onto each page first so a page keeps its box, resources and rotation once
//! it leaves its original parent.

use std::collections::{BTreeMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::PdfOpsError;
use crate::loader::inherited_attribute;

/// Attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Copy inherited attributes onto every page that does not set them itself.
pub(crate) fn flatten_inherited_attributes(doc: &mut Document) {
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

    for page_id in page_ids {
        let missing: Vec<(&[u8], Object)> = {
            let Ok(page) = doc.get_object(page_id).and_then(Object::as_dict) else {
                continue;
            };
            let Ok(parent) = page.get(b"Parent").and_then(Object::as_reference) else {
                continue;
            };
            INHERITABLE_KEYS
                .iter()
                .filter(|key| !page.has(key))
                .filter_map(|key| {
                    inherited_attribute(doc, parent, key).map(|value| (*key, value.clone()))
                })
                .collect()
        };

        if missing.is_empty() {
            continue;
        }
        if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            for (key, value) in missing {
                page.set(key, value);
            }
        }
    }
}

/// Replace the document's page tree with a flat tree holding `pages` in the
/// given order, then drop everything no longer reachable.
///
/// A page id listed more than once is duplicated as a new page object that
/// shares its content and resources with the original.
pub(crate) fn rebuild_page_tree(doc: &mut Document, pages: &[ObjectId]) -> Result<(), PdfOpsError> {
    if pages.is_empty() {
        return Err(PdfOpsError::Operation(
            "Cannot build a document with no pages".into(),
        ));
    }

    let pages_id = doc.new_object_id();
    let mut used = HashSet::with_capacity(pages.len());
    let mut kids = Vec::with_capacity(pages.len());

    for &page_id in pages {
        let target_id = if used.insert(page_id) {
            page_id
        } else {
            let copy = doc
                .get_object(page_id)
                .map_err(|_| PdfOpsError::Operation(format!("Page object {:?} missing", page_id)))?
                .clone();
            doc.add_object(copy)
        };

        let page = doc
            .get_object_mut(target_id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| PdfOpsError::Operation(format!("Invalid page object {:?}", target_id)))?;
        page.set("Parent", Object::Reference(pages_id));
        kids.push(Object::Reference(target_id));
    }

    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(kids.len() as i64)),
        ("Kids", Object::Array(kids)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    attach_pages_to_catalog(doc, pages_id);
    doc.prune_objects();
    Ok(())
}

/// Point the catalog at a new Pages node, creating the catalog if needed.
///
/// Outlines and page labels describe the old page sequence and are dropped.
fn attach_pages_to_catalog(doc: &mut Document, pages_id: ObjectId) {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .ok()
        .filter(|id| matches!(doc.objects.get(id), Some(Object::Dictionary(_))));

    match catalog_id {
        Some(id) => {
            if let Ok(catalog) = doc.get_object_mut(id).and_then(Object::as_dict_mut) {
                catalog.set("Pages", Object::Reference(pages_id));
                catalog.remove(b"Outlines");
                catalog.remove(b"PageLabels");
                catalog.remove(b"OpenAction");
            }
        }
        None => {
            let catalog = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Catalog".to_vec())),
                ("Pages", Object::Reference(pages_id)),
            ]);
            let id = doc.add_object(catalog);
            doc.trailer.set("Root", Object::Reference(id));
        }
    }
}

/// Move every object of `source` into `dest` under fresh ids.
///
/// Returns the page ids of `source`, in document order, translated into
/// `dest`'s id space.
pub(crate) fn import_document(dest: &mut Document, source: Document) -> Vec<ObjectId> {
    let id_offset = dest.max_id;

    let source_pages: Vec<ObjectId> = source
        .get_pages()
        .into_values()
        .map(|id| (id.0 + id_offset, id.1))
        .collect();

    let mut remapped_objects = BTreeMap::new();
    for (old_id, object) in source.objects.into_iter() {
        let new_id = (old_id.0 + id_offset, old_id.1);
        remapped_objects.insert(new_id, remap_object_refs(object, id_offset));
    }
    dest.objects.extend(remapped_objects);

    dest.max_id = (source.max_id + id_offset).max(dest.max_id);
    source_pages
}

/// Recursively shift object references by `offset`.
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            remap_dict_refs(&mut dict, offset);
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            remap_dict_refs(&mut stream.dict, offset);
            Object::Stream(stream)
        }
        other => other,
    }
}

fn remap_dict_refs(dict: &mut Dictionary, offset: u32) {
    for (_, value) in dict.iter_mut() {
        let owned = std::mem::replace(value, Object::Null);
        *value = remap_object_refs(owned, offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::save_document;
    use crate::test_support::{build_document, create_inherited_rotation_pdf, page_labels};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rebuild_reorders_pages() {
        let mut doc = build_document(3, "Doc");
        let ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        rebuild_page_tree(&mut doc, &[ids[2], ids[0]]).unwrap();

        let bytes = save_document(&mut doc).unwrap();
        assert_eq!(page_labels(&bytes), vec!["Doc-Page-3", "Doc-Page-1"]);
    }

    #[test]
    fn test_rebuild_duplicates_pages() {
        let mut doc = build_document(2, "Doc");
        let ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        rebuild_page_tree(&mut doc, &[ids[1], ids[1], ids[0]]).unwrap();

        let bytes = save_document(&mut doc).unwrap();
        assert_eq!(
            page_labels(&bytes),
            vec!["Doc-Page-2", "Doc-Page-2", "Doc-Page-1"]
        );
    }

    #[test]
    fn test_rebuild_prunes_dropped_pages() {
        let mut doc = build_document(4, "Doc");
        let before = doc.objects.len();
        let ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        rebuild_page_tree(&mut doc, &[ids[0]]).unwrap();
        assert!(doc.objects.len() < before);
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_rebuild_rejects_empty_selection() {
        let mut doc = build_document(1, "Doc");
        assert!(rebuild_page_tree(&mut doc, &[]).is_err());
    }

    #[test]
    fn test_flatten_pushes_down_inherited_attributes() {
        let bytes = create_inherited_rotation_pdf(2, 90);
        let mut doc = Document::load_mem(&bytes).unwrap();
        flatten_inherited_attributes(&mut doc);

        for page_id in doc.get_pages().into_values() {
            let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
            assert_eq!(page.get(b"Rotate").unwrap().as_i64().unwrap(), 90);
            assert!(page.has(b"MediaBox"));
        }
    }

    #[test]
    fn test_import_offsets_ids() {
        let mut dest = build_document(1, "A");
        let source = build_document(2, "B");
        let source_max = source.max_id;
        let dest_max = dest.max_id;

        let pages = import_document(&mut dest, source);
        assert_eq!(pages.len(), 2);
        assert!(pages.iter().all(|id| id.0 > dest_max));
        assert_eq!(dest.max_id, dest_max + source_max);
    }
}
