//! Password protection
//!
//! Encryption writes the standard security handler with AES-128 (V4/R4) or
//! RC4-128 (V2/R3). Decryption accepts revisions 2 to 4.

mod cipher;
mod handler;

use lopdf::{Document, Object, ObjectId, StringFormat};
use serde::{Deserialize, Serialize};

use crate::error::{FormatError, PasswordError, PdfOpsError, ValidationError};
use crate::loader::{save_document, DocumentHandle};
use handler::{CryptMethod, EncryptParams, StandardSecurityHandler};

/// `/P` with every permission bit cleared that this engine controls.
/// Bits 7, 8 and 13 to 32 must be set; bits 1 and 2 must be clear.
const PERMISSION_BASE: u32 = 0xFFFF_F0C0;
const PERMIT_PRINT: u32 = 1 << 2;
const PERMIT_MODIFY: u32 = 1 << 3;
const PERMIT_COPY: u32 = 1 << 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub printing: bool,
    #[serde(default)]
    pub copying: bool,
    #[serde(default)]
    pub modifying: bool,
}

impl Permissions {
    pub fn all() -> Self {
        Self {
            printing: true,
            copying: true,
            modifying: true,
        }
    }

    /// The signed `/P` value. Each flag owns exactly one bit.
    pub fn bits(&self) -> i32 {
        let mut bits = PERMISSION_BASE;
        if self.printing {
            bits |= PERMIT_PRINT;
        }
        if self.modifying {
            bits |= PERMIT_MODIFY;
        }
        if self.copying {
            bits |= PERMIT_COPY;
        }
        bits as i32
    }

    pub fn from_bits(bits: i32) -> Self {
        let bits = bits as u32;
        Self {
            printing: bits & PERMIT_PRINT != 0,
            copying: bits & PERMIT_COPY != 0,
            modifying: bits & PERMIT_MODIFY != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionAlgorithm {
    #[default]
    Aes128,
    Rc4_128,
}

impl EncryptionAlgorithm {
    fn crypt_method(self) -> CryptMethod {
        match self {
            EncryptionAlgorithm::Aes128 => CryptMethod::Aes128,
            EncryptionAlgorithm::Rc4_128 => CryptMethod::Rc4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptSpec {
    pub password: String,
    /// Falls back to `password` when absent or blank
    #[serde(default)]
    pub owner_password: Option<String>,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub algorithm: EncryptionAlgorithm,
}

impl EncryptSpec {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            owner_password: None,
            permissions: Permissions::default(),
            algorithm: EncryptionAlgorithm::default(),
        }
    }
}

pub fn is_encrypted(handle: &DocumentHandle) -> bool {
    handle.is_encrypted()
}

/// Permissions recorded in an encrypted document, `None` if unencrypted.
pub fn permissions(handle: &DocumentHandle) -> Option<Permissions> {
    let dict = encrypt_dictionary(handle.document()).ok()?.1;
    let bits = dict.get(b"P").and_then(Object::as_i64).ok()?;
    Some(Permissions::from_bits(bits as i32))
}

/// Password-protect a document.
pub fn encrypt(handle: DocumentHandle, spec: &EncryptSpec) -> Result<Vec<u8>, PdfOpsError> {
    if spec.password.trim().is_empty() {
        return Err(PasswordError::PasswordRequired.into());
    }
    if handle.is_encrypted() {
        return Err(ValidationError::AlreadyEncrypted.into());
    }

    let owner_password = spec
        .owner_password
        .as_deref()
        .filter(|owner| !owner.trim().is_empty())
        .unwrap_or(&spec.password);

    let mut doc = handle.into_document();
    // Cross-reference and object streams are rebuilt on save
    doc.objects
        .retain(|_, object| !is_structural_stream(object));

    let file_id = ensure_file_id(&mut doc)?;
    let method = spec.algorithm.crypt_method();
    let security = StandardSecurityHandler::create(
        spec.password.as_bytes(),
        owner_password.as_bytes(),
        spec.permissions.bits(),
        method,
        &file_id,
    );

    let ids: Vec<ObjectId> = doc.objects.keys().copied().collect();
    for id in ids {
        if let Some(object) = doc.objects.get_mut(&id) {
            seal_object(object, id, &security)?;
        }
    }

    let encrypt_id = doc.add_object(security.params().to_dict());
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    if method == CryptMethod::Aes128 && doc.version.as_str() < "1.6" {
        doc.version = "1.6".to_string();
    }

    tracing::info!(
        algorithm = ?spec.algorithm,
        objects = doc.objects.len(),
        "encrypted document"
    );
    save_document(&mut doc)
}

/// Remove password protection.
///
/// An unencrypted document is returned re-serialized. An empty password is
/// tried as the user password; documents that need a real one report
/// `PasswordRequired`.
pub fn decrypt(handle: DocumentHandle, password: &str) -> Result<Vec<u8>, PdfOpsError> {
    if !handle.is_encrypted() {
        return handle.into_bytes();
    }

    let mut doc = handle.into_document();
    let (encrypt_id, encrypt_dict) = encrypt_dictionary(&doc)?;
    let params = EncryptParams::from_dict(encrypt_dict)?;
    let file_id = file_id(&doc).unwrap_or_default();

    let security = StandardSecurityHandler::authenticate(params, &file_id, password.as_bytes());
    let Some(security) = security else {
        tracing::debug!("password rejected");
        return Err(if password.is_empty() {
            PasswordError::PasswordRequired
        } else {
            PasswordError::IncorrectPassword
        }
        .into());
    };

    let ids: Vec<ObjectId> = doc.objects.keys().copied().collect();
    for id in ids {
        if Some(id) == encrypt_id {
            continue;
        }
        if let Some(object) = doc.objects.get_mut(&id) {
            unseal_object(object, id, &security)?;
        }
    }

    doc.trailer.remove(b"Encrypt");
    if let Some(id) = encrypt_id {
        doc.objects.remove(&id);
    }

    tracing::info!(revision = security.params().revision, "decrypted document");
    save_document(&mut doc)
}

/// The `/Encrypt` dictionary and, when indirect, its object id.
fn encrypt_dictionary(
    doc: &Document,
) -> Result<(Option<ObjectId>, &lopdf::Dictionary), PdfOpsError> {
    let missing = || FormatError::Unparseable("invalid /Encrypt entry".into());
    match doc.trailer.get(b"Encrypt") {
        Ok(Object::Reference(id)) => {
            let dict = doc
                .get_object(*id)
                .and_then(Object::as_dict)
                .map_err(|_| missing())?;
            Ok((Some(*id), dict))
        }
        Ok(Object::Dictionary(dict)) => Ok((None, dict)),
        _ => Err(missing().into()),
    }
}

fn file_id(doc: &Document) -> Option<Vec<u8>> {
    let ids = doc.trailer.get(b"ID").and_then(Object::as_array).ok()?;
    ids.first()?.as_str().ok().map(<[u8]>::to_vec)
}

/// First file identifier, generating a random pair when the trailer has none.
fn ensure_file_id(doc: &mut Document) -> Result<Vec<u8>, PdfOpsError> {
    if let Some(id) = file_id(doc).filter(|id| !id.is_empty()) {
        return Ok(id);
    }
    let mut id = vec![0u8; 16];
    getrandom::getrandom(&mut id)
        .map_err(|e| PdfOpsError::Operation(format!("No randomness for file identifier: {}", e)))?;
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(id.clone(), StringFormat::Hexadecimal),
            Object::String(id.clone(), StringFormat::Hexadecimal),
        ]),
    );
    Ok(id)
}

fn is_structural_stream(object: &Object) -> bool {
    match object {
        Object::Stream(stream) => matches!(
            stream.dict.get(b"Type").and_then(Object::as_name),
            Ok(b"XRef") | Ok(b"ObjStm")
        ),
        _ => false,
    }
}

fn is_metadata_stream(dict: &lopdf::Dictionary) -> bool {
    matches!(dict.get(b"Type").and_then(Object::as_name), Ok(b"Metadata"))
}

fn seal_object(
    object: &mut Object,
    id: ObjectId,
    security: &StandardSecurityHandler,
) -> Result<(), PdfOpsError> {
    match object {
        Object::String(bytes, format) => {
            *bytes = security.encrypt(security.string_method(), id, bytes)?;
            *format = StringFormat::Hexadecimal;
        }
        Object::Array(items) => {
            for item in items {
                seal_object(item, id, security)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                seal_object(value, id, security)?;
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                seal_object(value, id, security)?;
            }
            if security.encrypt_metadata() || !is_metadata_stream(&stream.dict) {
                let content = security.encrypt(security.stream_method(), id, &stream.content)?;
                stream.set_content(content);
            }
        }
        _ => {}
    }
    Ok(())
}

fn unseal_object(
    object: &mut Object,
    id: ObjectId,
    security: &StandardSecurityHandler,
) -> Result<(), PdfOpsError> {
    match object {
        Object::String(bytes, _) => {
            *bytes = security.decrypt(security.string_method(), id, bytes)?;
        }
        Object::Array(items) => {
            for item in items {
                unseal_object(item, id, security)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                unseal_object(value, id, security)?;
            }
        }
        Object::Stream(stream) => {
            if matches!(
                stream.dict.get(b"Type").and_then(Object::as_name),
                Ok(b"XRef")
            ) {
                return Ok(());
            }
            for (_, value) in stream.dict.iter_mut() {
                unseal_object(value, id, security)?;
            }
            if security.encrypt_metadata() || !is_metadata_stream(&stream.dict) {
                let content = security.decrypt(security.stream_method(), id, &stream.content)?;
                stream.set_content(content);
            }
        }
        _ => {}
    }
    Ok(())
}
