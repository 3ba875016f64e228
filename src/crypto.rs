// authenticated encryption for opaque byte blocks (SST records, manifest body)
//
// every ciphertext is self-contained: a fresh random nonce is drawn per call
// and prepended, so the layout is | nonce (12 bytes) | ciphertext + tag |

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use thiserror::Error;

pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be {KEY_LEN} bytes (AES-256)")]
    KeyLength,
    #[error("ciphertext shorter than the nonce")]
    ShortCiphertext,
    #[error("authentication failed")]
    Auth,
}

pub fn encrypt(plain: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::KeyLength)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let sealed = cipher.encrypt(&nonce, plain).map_err(|_| CryptoError::Auth)?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&sealed);
    Ok(out)
}

pub fn decrypt(data: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::KeyLength)?;
    if data.len() < NONCE_LEN {
        return Err(CryptoError::ShortCiphertext);
    }

    let (nonce, sealed) = data.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Auth)
}
