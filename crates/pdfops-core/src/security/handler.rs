//! Standard security handler, revisions 2 to 4.
//!
//! Key derivation follows the password algorithms of ISO 32000-1 §7.6.3:
//! the file key is an MD5 digest over the padded user password, `/O`, `/P`
//! and the first file identifier. Each object is then ciphered with a key
//! salted by its object number and generation.

use lopdf::{Dictionary, Object, ObjectId, StringFormat};

use super::cipher::{aes_decrypt, aes_encrypt, malformed, rc4, AES_BLOCK_LEN};
use crate::error::{FormatError, PdfOpsError};

/// Password padding string (ISO 32000-1 Algorithm 2, step a).
pub(crate) const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

const STD_CRYPT_FILTER: &[u8] = b"StdCF";

/// Cipher applied to one class of objects (strings or streams).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CryptMethod {
    Identity,
    Rc4,
    Aes128,
}

impl CryptMethod {
    fn from_crypt_filters(filters: Option<&Dictionary>, name: &[u8]) -> Result<Self, PdfOpsError> {
        if name == b"Identity" {
            return Ok(CryptMethod::Identity);
        }
        let filter = filters
            .and_then(|cf| cf.get(name).and_then(Object::as_dict).ok())
            .ok_or_else(|| {
                FormatError::Unparseable(format!(
                    "crypt filter {} not defined",
                    String::from_utf8_lossy(name)
                ))
            })?;
        match filter.get(b"CFM").and_then(Object::as_name) {
            Ok(b"V2") => Ok(CryptMethod::Rc4),
            Ok(b"AESV2") => Ok(CryptMethod::Aes128),
            Ok(b"None") | Err(_) => Ok(CryptMethod::Identity),
            Ok(other) => Err(FormatError::Unsupported(format!(
                "crypt filter method {}",
                String::from_utf8_lossy(other)
            ))
            .into()),
        }
    }
}

/// Parameters stored in the `/Encrypt` dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EncryptParams {
    pub version: i64,
    pub revision: i64,
    /// File key length in bytes
    pub key_length: usize,
    pub owner: Vec<u8>,
    pub user: Vec<u8>,
    pub permissions: i32,
    pub encrypt_metadata: bool,
    pub string_method: CryptMethod,
    pub stream_method: CryptMethod,
}

impl EncryptParams {
    pub(crate) fn from_dict(dict: &Dictionary) -> Result<Self, PdfOpsError> {
        match dict.get(b"Filter").and_then(Object::as_name) {
            Ok(b"Standard") => {}
            Ok(other) => {
                return Err(FormatError::Unsupported(format!(
                    "security handler {}",
                    String::from_utf8_lossy(other)
                ))
                .into())
            }
            Err(_) => return Err(malformed("encryption dictionary has no /Filter")),
        }

        let int = |key: &[u8]| dict.get(key).and_then(Object::as_i64).ok();
        let bytes = |key: &[u8]| {
            dict.get(key)
                .and_then(Object::as_str)
                .map(<[u8]>::to_vec)
                .map_err(|_| {
                    malformed(format!(
                        "encryption dictionary has no /{}",
                        String::from_utf8_lossy(key)
                    ))
                })
        };

        let version = int(b"V").unwrap_or(0);
        let revision = int(b"R").ok_or_else(|| malformed("encryption dictionary has no /R"))?;
        if revision >= 5 || version >= 5 {
            let reason = format!("AES-256 encryption (revision {})", revision);
            return Err(FormatError::Unsupported(reason).into());
        }
        if revision < 2 {
            return Err(malformed(format!("invalid security revision {}", revision)));
        }

        let key_length = match revision {
            2 => 5,
            3 => (int(b"Length").unwrap_or(40) / 8).clamp(5, 16) as usize,
            _ => 16,
        };

        let (string_method, stream_method) = if version == 4 {
            let filters = dict.get(b"CF").and_then(Object::as_dict).ok();
            let name = |key: &[u8]| {
                dict.get(key)
                    .and_then(Object::as_name)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_else(|_| b"Identity".to_vec())
            };
            (
                CryptMethod::from_crypt_filters(filters, &name(b"StrF"))?,
                CryptMethod::from_crypt_filters(filters, &name(b"StmF"))?,
            )
        } else {
            (CryptMethod::Rc4, CryptMethod::Rc4)
        };

        Ok(Self {
            version,
            revision,
            key_length,
            owner: bytes(b"O")?,
            user: bytes(b"U")?,
            permissions: int(b"P").unwrap_or(-1) as i32,
            encrypt_metadata: dict
                .get(b"EncryptMetadata")
                .and_then(Object::as_bool)
                .unwrap_or(true),
            string_method,
            stream_method,
        })
    }

    pub(crate) fn to_dict(&self) -> Dictionary {
        let mut dict = Dictionary::from_iter(vec![
            ("Filter", Object::Name(b"Standard".to_vec())),
            ("V", Object::Integer(self.version)),
            ("R", Object::Integer(self.revision)),
            ("Length", Object::Integer(self.key_length as i64 * 8)),
            ("O", Object::String(self.owner.clone(), StringFormat::Hexadecimal)),
            ("U", Object::String(self.user.clone(), StringFormat::Hexadecimal)),
            ("P", Object::Integer(self.permissions as i64)),
        ]);

        if self.version == 4 {
            let cfm: &[u8] = match self.stream_method {
                CryptMethod::Aes128 => b"AESV2",
                CryptMethod::Rc4 => b"V2",
                CryptMethod::Identity => b"None",
            };
            let std_cf = Dictionary::from_iter(vec![
                ("AuthEvent", Object::Name(b"DocOpen".to_vec())),
                ("CFM", Object::Name(cfm.to_vec())),
                ("Length", Object::Integer(self.key_length as i64)),
            ]);
            dict.set(
                "CF",
                Object::Dictionary(Dictionary::from_iter(vec![(
                    "StdCF",
                    Object::Dictionary(std_cf),
                )])),
            );
            dict.set("StmF", Object::Name(STD_CRYPT_FILTER.to_vec()));
            dict.set("StrF", Object::Name(STD_CRYPT_FILTER.to_vec()));
            dict.set("EncryptMetadata", Object::Boolean(self.encrypt_metadata));
        }
        dict
    }
}

/// An authenticated handler holding the file key.
pub(crate) struct StandardSecurityHandler {
    params: EncryptParams,
    key: Vec<u8>,
}

impl std::fmt::Debug for StandardSecurityHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardSecurityHandler")
            .field("revision", &self.params.revision)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl StandardSecurityHandler {
    /// Build the parameters and file key for a newly encrypted document.
    pub(crate) fn create(
        user_password: &[u8],
        owner_password: &[u8],
        permissions: i32,
        method: CryptMethod,
        file_id: &[u8],
    ) -> Self {
        let (version, revision) = match method {
            CryptMethod::Aes128 => (4, 4),
            _ => (2, 3),
        };
        let key_length = 16;
        let owner = compute_owner_value(owner_password, user_password, revision, key_length);

        let mut params = EncryptParams {
            version,
            revision,
            key_length,
            owner,
            user: Vec::new(),
            permissions,
            encrypt_metadata: true,
            string_method: method,
            stream_method: method,
        };
        let key = compute_file_key(&params, file_id, user_password);
        params.user = compute_user_value(&key, revision, file_id);

        Self { params, key }
    }

    /// Authenticate as user, then as owner. `None` when neither matches.
    pub(crate) fn authenticate(
        params: EncryptParams,
        file_id: &[u8],
        password: &[u8],
    ) -> Option<Self> {
        let key = authenticate_user(&params, file_id, password)
            .or_else(|| authenticate_owner(&params, file_id, password))?;
        Some(Self { params, key })
    }

    pub(crate) fn params(&self) -> &EncryptParams {
        &self.params
    }

    pub(crate) fn encrypt_metadata(&self) -> bool {
        self.params.encrypt_metadata
    }

    pub(crate) fn string_method(&self) -> CryptMethod {
        self.params.string_method
    }

    pub(crate) fn stream_method(&self) -> CryptMethod {
        self.params.stream_method
    }

    /// Per-object key (Algorithm 1).
    fn object_key(&self, method: CryptMethod, id: ObjectId) -> Vec<u8> {
        let mut input = self.key.clone();
        input.extend_from_slice(&id.0.to_le_bytes()[..3]);
        input.extend_from_slice(&id.1.to_le_bytes()[..2]);
        if method == CryptMethod::Aes128 {
            input.extend_from_slice(b"sAlT");
        }
        let digest = md5::compute(&input);
        let len = (self.key.len() + 5).min(16);
        digest.0[..len].to_vec()
    }

    pub(crate) fn encrypt(
        &self,
        method: CryptMethod,
        id: ObjectId,
        data: &[u8],
    ) -> Result<Vec<u8>, PdfOpsError> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4(&self.object_key(method, id), data)),
            CryptMethod::Aes128 => {
                let mut iv = [0u8; AES_BLOCK_LEN];
                getrandom::getrandom(&mut iv).map_err(|e| {
                    PdfOpsError::Operation(format!("No randomness for AES IV: {}", e))
                })?;
                aes_encrypt(&self.object_key(method, id), iv, data)
            }
        }
    }

    pub(crate) fn decrypt(
        &self,
        method: CryptMethod,
        id: ObjectId,
        data: &[u8],
    ) -> Result<Vec<u8>, PdfOpsError> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4(&self.object_key(method, id), data)),
            CryptMethod::Aes128 => aes_decrypt(&self.object_key(method, id), data),
        }
    }
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

/// File key from a user password (Algorithm 2).
fn compute_file_key(params: &EncryptParams, file_id: &[u8], password: &[u8]) -> Vec<u8> {
    let mut context = md5::Context::new();
    context.consume(pad_password(password));
    context.consume(&params.owner);
    context.consume(params.permissions.to_le_bytes());
    context.consume(file_id);
    if params.revision >= 4 && !params.encrypt_metadata {
        context.consume([0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut key = context.finalize().0.to_vec();

    let n = params.key_length;
    if params.revision >= 3 {
        for _ in 0..50 {
            key = md5::compute(&key[..n]).0.to_vec();
        }
    }
    key.truncate(n);
    key
}

/// RC4 key derived from the owner password (Algorithm 3, steps a to d).
fn owner_key(owner_password: &[u8], revision: i64, key_length: usize) -> Vec<u8> {
    let mut hash = md5::compute(pad_password(owner_password)).0.to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(&hash).0.to_vec();
        }
    }
    hash.truncate(if revision >= 3 { key_length } else { 5 });
    hash
}

fn xor_key(key: &[u8], round: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ round).collect()
}

/// `/O` value (Algorithm 3).
fn compute_owner_value(
    owner_password: &[u8],
    user_password: &[u8],
    revision: i64,
    key_length: usize,
) -> Vec<u8> {
    let key = owner_key(owner_password, revision, key_length);
    let mut value = rc4(&key, &pad_password(user_password));
    if revision >= 3 {
        for round in 1..20u8 {
            value = rc4(&xor_key(&key, round), &value);
        }
    }
    value
}

/// `/U` value (Algorithm 4 for revision 2, Algorithm 5 otherwise).
fn compute_user_value(key: &[u8], revision: i64, file_id: &[u8]) -> Vec<u8> {
    if revision == 2 {
        return rc4(key, &PASSWORD_PADDING);
    }
    let mut context = md5::Context::new();
    context.consume(PASSWORD_PADDING);
    context.consume(file_id);
    let mut value = rc4(key, &context.finalize().0);
    for round in 1..20u8 {
        value = rc4(&xor_key(key, round), &value);
    }
    // The trailing 16 bytes are arbitrary padding
    value.extend_from_slice(&PASSWORD_PADDING[..16]);
    value
}

/// Algorithm 6.
fn authenticate_user(params: &EncryptParams, file_id: &[u8], password: &[u8]) -> Option<Vec<u8>> {
    let key = compute_file_key(params, file_id, password);
    let expected = compute_user_value(&key, params.revision, file_id);
    let compared = if params.revision == 2 { 32 } else { 16 };
    let matches = params.user.len() >= compared && expected[..compared] == params.user[..compared];
    matches.then_some(key)
}

/// Algorithm 7: recover the user password from `/O`.
fn authenticate_owner(params: &EncryptParams, file_id: &[u8], password: &[u8]) -> Option<Vec<u8>> {
    let key = owner_key(password, params.revision, params.key_length);
    let user_password = if params.revision == 2 {
        rc4(&key, &params.owner)
    } else {
        let mut value = params.owner.clone();
        for round in (0..20u8).rev() {
            value = rc4(&xor_key(&key, round), &value);
        }
        value
    };
    authenticate_user(params, file_id, &user_password)
}
