//! PBKDF2 key derivation and AES-CFB streaming encryption for index entries.
//!
//! Key derivation: PBKDF2-HMAC-SHA1(passphrase, SALT, keysize) → key bytes,
//! where SALT is the deployment-wide constant below — changing it breaks
//! every encrypted index built against the old value, the same way changing
//! the position codec's alphabet would.
//!
//! Encryption: AES in CFB mode, one randomly generated 16-byte IV per entry,
//! no authentication tag. Integrity, when wanted, comes from the separate
//! CRC32 checksum field (`xsanity`), not from the cipher mode.

use aes::{Aes128, Aes192, Aes256};
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use cfb_mode::{Decryptor, Encryptor};
use rand::RngCore;

pub use crate::error::CryptoError;

/// Deployment-wide PBKDF2 salt. Frozen; see module docs.
pub const SALT: &[u8] = b"5ed3a4284d6a9c1e4e4f6b4729b254be";

/// PBKDF2 iteration count.
const ITERATIONS: u32 = 1_000;

/// Cipher identity carried alongside the derived key, and the letter used to
/// tag it in an index line's position field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Aes128,
    Aes192,
    Aes256,
}

impl CipherKind {
    pub fn from_letter(c: char) -> Result<Self, CryptoError> {
        match c {
            'A' => Ok(CipherKind::Aes128),
            'B' => Ok(CipherKind::Aes192),
            'C' => Ok(CipherKind::Aes256),
            _ => Err(CryptoError::BadKeySize(0)),
        }
    }

    pub fn letter(self) -> char {
        match self {
            CipherKind::Aes128 => 'A',
            CipherKind::Aes192 => 'B',
            CipherKind::Aes256 => 'C',
        }
    }

    pub fn keysize(self) -> usize {
        match self {
            CipherKind::Aes128 => 16,
            CipherKind::Aes192 => 24,
            CipherKind::Aes256 => 32,
        }
    }

    pub fn from_keysize(keysize: usize) -> Result<Self, CryptoError> {
        match keysize {
            16 => Ok(CipherKind::Aes128),
            24 => Ok(CipherKind::Aes192),
            32 => Ok(CipherKind::Aes256),
            other => Err(CryptoError::BadKeySize(other)),
        }
    }
}

/// Derive a key for `kind` from `passphrase` using fixed-salt PBKDF2.
pub fn derive_key(passphrase: &str, kind: CipherKind) -> Result<Vec<u8>, CryptoError> {
    let mut key = vec![0u8; kind.keysize()];
    pbkdf2::pbkdf2_hmac::<sha1::Sha1>(passphrase.as_bytes(), SALT, ITERATIONS, &mut key);
    Ok(key)
}

/// A fresh random 16-byte IV, one per entry.
pub fn generate_iv() -> [u8; 16] {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` in place under AES-CFB with `key` and `iv`.
pub fn encrypt(kind: CipherKind, key: &[u8], iv: &[u8; 16], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut buf = plaintext.to_vec();
    match kind {
        CipherKind::Aes128 => Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::BadKeySize(key.len()))?
            .encrypt(&mut buf),
        CipherKind::Aes192 => Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::BadKeySize(key.len()))?
            .encrypt(&mut buf),
        CipherKind::Aes256 => Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::BadKeySize(key.len()))?
            .encrypt(&mut buf),
    }
    Ok(buf)
}

/// Decrypt `ciphertext` produced by [`encrypt`] under the same key and iv.
pub fn decrypt(kind: CipherKind, key: &[u8], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut buf = ciphertext.to_vec();
    match kind {
        CipherKind::Aes128 => Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::BadKeySize(key.len()))?
            .decrypt(&mut buf),
        CipherKind::Aes192 => Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::BadKeySize(key.len()))?
            .decrypt(&mut buf),
        CipherKind::Aes256 => Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::BadKeySize(key.len()))?
            .decrypt(&mut buf),
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_keysizes() {
        for kind in [CipherKind::Aes128, CipherKind::Aes192, CipherKind::Aes256] {
            let key = derive_key("correct horse battery staple", kind).unwrap();
            let iv = generate_iv();
            let plaintext = b"the entry content to protect";
            let ciphertext = encrypt(kind, &key, &iv, plaintext).unwrap();
            assert_ne!(ciphertext, plaintext);
            let decrypted = decrypt(kind, &key, &iv, &ciphertext).unwrap();
            assert_eq!(decrypted, plaintext);
        }
    }

    #[test]
    fn letters_roundtrip() {
        for kind in [CipherKind::Aes128, CipherKind::Aes192, CipherKind::Aes256] {
            assert_eq!(CipherKind::from_letter(kind.letter()).unwrap(), kind);
        }
    }
}
