//! RC4 and AES-128-CBC primitives for the standard security handler.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::{FormatError, PdfOpsError};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

pub(crate) const AES_BLOCK_LEN: usize = 16;

/// RC4 stream cipher. Encryption and decryption are the same operation.
pub(crate) struct Arcfour {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Arcfour {
    /// `key` must be 1 to 256 bytes; handler keys are always 5 to 16.
    pub(crate) fn new(key: &[u8]) -> Self {
        debug_assert!(!key.is_empty() && key.len() <= 256);
        let mut state: [u8; 256] = std::array::from_fn(|i| i as u8);

        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }

        Self { state, i: 0, j: 0 }
    }

    pub(crate) fn process(&mut self, data: &[u8]) -> Vec<u8> {
        data.iter().map(|byte| byte ^ self.next_byte()).collect()
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[self.i as usize]);
        self.state.swap(self.i as usize, self.j as usize);

        let idx = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
        self.state[idx as usize]
    }
}

/// One-shot RC4 with a fresh key schedule.
pub(crate) fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    Arcfour::new(key).process(data)
}

/// AES-128-CBC with PKCS#7 padding. Output is `iv || ciphertext`.
pub(crate) fn aes_encrypt(
    key: &[u8],
    iv: [u8; AES_BLOCK_LEN],
    data: &[u8],
) -> Result<Vec<u8>, PdfOpsError> {
    let pad = AES_BLOCK_LEN - data.len() % AES_BLOCK_LEN;
    let mut buf = Vec::with_capacity(data.len() + pad);
    buf.extend_from_slice(data);
    buf.resize(data.len() + pad, pad as u8);

    let cipher = Aes128CbcEnc::new_from_slices(key, &iv)
        .map_err(|e| PdfOpsError::Operation(format!("AES key setup failed: {}", e)))?;
    let len = buf.len();
    cipher
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|e| PdfOpsError::Operation(format!("AES encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(AES_BLOCK_LEN + len);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buf);
    Ok(out)
}

pub(super) fn malformed(reason: impl Into<String>) -> PdfOpsError {
    FormatError::Unparseable(reason.into()).into()
}

/// Inverse of [`aes_encrypt`]. Malformed padding is left in place rather
/// than rejected. Empty input is returned as is, since some writers leave
/// empty strings unencrypted.
pub(crate) fn aes_decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>, PdfOpsError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() < AES_BLOCK_LEN {
        return Err(malformed("AES payload shorter than its IV"));
    }
    let (iv, ciphertext) = data.split_at(AES_BLOCK_LEN);
    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }
    if ciphertext.len() % AES_BLOCK_LEN != 0 {
        return Err(malformed("AES payload is not block aligned"));
    }

    let mut buf = ciphertext.to_vec();
    let cipher = Aes128CbcDec::new_from_slices(key, iv)
        .map_err(|e| PdfOpsError::Operation(format!("AES key setup failed: {}", e)))?;
    cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| PdfOpsError::Operation(format!("AES decryption failed: {}", e)))?;

    let unpadded = unpad(&buf).len();
    buf.truncate(unpadded);
    Ok(buf)
}

fn unpad(data: &[u8]) -> &[u8] {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad = last as usize;
    if pad == 0 || pad > AES_BLOCK_LEN || pad > data.len() {
        return data;
    }
    let start = data.len() - pad;
    if data[start..].iter().all(|&b| b == last) {
        &data[..start]
    } else {
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02X}", b)).collect()
    }

    #[test]
    fn test_rc4_known_vectors() {
        assert_eq!(hex(&rc4(b"Key", b"Plaintext")), "BBF316E8D940AF0AD3");
        assert_eq!(hex(&rc4(b"Wiki", b"pedia")), "1021BF0420");
        assert_eq!(
            hex(&rc4(b"Secret", b"Attack at dawn")),
            "45A01F645FC35B383552544B9BF5"
        );
    }

    #[test]
    fn test_rc4_is_symmetric() {
        let data = b"stream content 0123456789";
        assert_eq!(rc4(b"k", &rc4(b"k", data)), data.to_vec());
    }

    #[test]
    fn test_aes_round_trip() {
        let key = [7u8; 16];
        let iv = [3u8; 16];
        for len in [0, 1, 15, 16, 17, 100] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let encrypted = aes_encrypt(&key, iv, &data).unwrap();
            assert_eq!(&encrypted[..16], &iv);
            assert_eq!((encrypted.len() - 16) % 16, 0);
            assert!(encrypted.len() > data.len() + 16 - 1);
            assert_eq!(aes_decrypt(&key, &encrypted).unwrap(), data);
        }
    }

    #[test]
    fn test_aes_empty_payload_is_empty() {
        assert_eq!(aes_decrypt(&[0u8; 16], &[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_aes_rejects_short_payload() {
        assert!(aes_decrypt(&[0u8; 16], &[0u8; 10]).is_err());
        assert!(aes_decrypt(&[0u8; 16], &[0u8; 20]).is_err());
    }

    #[test]
    fn test_unpad_leaves_bad_padding() {
        assert_eq!(unpad(&[1, 2, 3, 3, 3]), &[1, 2]);
        assert_eq!(unpad(&[1, 2, 0]), &[1, 2, 0]);
        assert_eq!(unpad(&[1, 2, 2, 3]), &[1, 2, 2, 3]);
    }
}
