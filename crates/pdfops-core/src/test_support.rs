//! Fixture builders shared by unit tests.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// Create a simple PDF with N pages containing identifiable text
/// (`<prefix>-Page-<n>`).
pub fn create_test_pdf(num_pages: u32, content_prefix: &str) -> Vec<u8> {
    let mut doc = build_document(num_pages, content_prefix);
    save(&mut doc)
}

pub fn build_document(num_pages: u32, content_prefix: &str) -> Document {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let catalog_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for page_num in 0..num_pages {
        let page_id = add_page(&mut doc, pages_id, content_prefix, page_num + 1);
        page_ids.push(Object::Reference(page_id));
    }

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
    pages_dict.set("Count", Object::Integer(num_pages as i64));
    pages_dict.set("Kids", Object::Array(page_ids));
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog_dict = Dictionary::new();
    catalog_dict.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog_dict.set("Pages", Object::Reference(pages_id));
    doc.objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));

    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc
}

fn add_page(doc: &mut Document, parent: ObjectId, prefix: &str, number: u32) -> ObjectId {
    let content = format!("BT /F1 12 Tf 50 700 Td ({}-Page-{}) Tj ET", prefix, number);
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

    let page = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(parent)),
        ("Contents", Object::Reference(content_id)),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        ),
    ]);
    doc.add_object(page)
}

/// A PDF whose Info dictionary carries a title, author, producer and dates.
pub fn create_test_pdf_with_info(num_pages: u32, title: &str, author: &str) -> Vec<u8> {
    let mut doc = build_document(num_pages, "Info");
    let info = Dictionary::from_iter(vec![
        ("Title", literal(title)),
        ("Author", literal(author)),
        ("Producer", literal("Fixture Producer 1.0")),
        ("Creator", literal("Fixture Creator")),
        ("CreationDate", literal("D:20240101120000Z")),
        ("ModDate", literal("D:20240102120000Z")),
    ]);
    let info_id = doc.add_object(info);
    doc.trailer.set("Info", Object::Reference(info_id));
    save(&mut doc)
}

/// A PDF where `/Rotate` and `/MediaBox` live on the root Pages node and
/// are inherited by every page.
pub fn create_inherited_rotation_pdf(num_pages: u32, rotate: i64) -> Vec<u8> {
    let mut doc = build_document(num_pages, "Inherit");
    let root_pages = pages_root(&doc);
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in page_ids {
        if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
            page.remove(b"MediaBox");
        }
    }
    if let Ok(Object::Dictionary(pages)) = doc.get_object_mut(root_pages) {
        pages.set("Rotate", Object::Integer(rotate));
        pages.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(300),
                Object::Integer(400),
            ]),
        );
    }
    save(&mut doc)
}

/// A one-page PDF drawing a `width` x `height` DeviceRGB gradient image.
pub fn create_image_pdf(width: u32, height: u32) -> Vec<u8> {
    let mut samples = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            samples.push((x % 256) as u8);
            samples.push((y % 256) as u8);
            samples.push(((x + y) % 256) as u8);
        }
    }
    create_raw_image_pdf(width as i64, height as i64, "DeviceRGB", samples)
}

/// A one-page PDF drawing an unfiltered 8-bit image whose declared size
/// need not match `samples`.
pub fn create_raw_image_pdf(
    width: i64,
    height: i64,
    color_space: &str,
    samples: Vec<u8>,
) -> Vec<u8> {
    let mut doc = build_document(1, "Image");

    let image_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(width)),
        ("Height", Object::Integer(height)),
        ("ColorSpace", Object::Name(color_space.as_bytes().to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
    ]);
    let image_id = doc.add_object(Stream::new(image_dict, samples));

    let page_id = doc.get_pages()[&1];
    let resources = Dictionary::from_iter(vec![(
        "XObject",
        Object::Dictionary(Dictionary::from_iter(vec![(
            "Im1",
            Object::Reference(image_id),
        )])),
    )]);
    if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
        page.set("Resources", Object::Dictionary(resources));
    }
    save(&mut doc)
}

/// Text label drawn on each page, in page order.
pub fn page_labels(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let content_id = doc
                .get_object(page_id)
                .unwrap()
                .as_dict()
                .unwrap()
                .get(b"Contents")
                .unwrap()
                .as_reference()
                .unwrap();
            let stream = doc.get_object(content_id).unwrap().as_stream().unwrap();
            let content = match stream.dict.get(b"Filter") {
                Ok(_) => crate::codec::inflate(&stream.content).unwrap(),
                Err(_) => stream.content.clone(),
            };
            let text = String::from_utf8_lossy(&content).into_owned();
            let start = text.find('(').unwrap() + 1;
            let end = text[start..].find(')').unwrap() + start;
            text[start..end].to_string()
        })
        .collect()
}

/// Effective rotation of every page, in page order.
pub fn page_rotations(bytes: &[u8]) -> Vec<i64> {
    let handle = crate::loader::load(bytes).unwrap();
    (1..=handle.page_count())
        .map(|page| handle.rotation(page).unwrap())
        .collect()
}

pub fn pages_root(doc: &Document) -> ObjectId {
    let catalog_id = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    doc.get_object(catalog_id)
        .unwrap()
        .as_dict()
        .unwrap()
        .get(b"Pages")
        .unwrap()
        .as_reference()
        .unwrap()
}

fn literal(text: &str) -> Object {
    Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
}

fn save(doc: &mut Document) -> Vec<u8> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}
