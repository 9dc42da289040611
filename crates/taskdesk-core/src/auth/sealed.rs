//! Passphrase sealing for the file token store.
//!
//! Key: Argon2id(passphrase, 16-byte random salt) -> 32 bytes.
//! Cipher: ChaCha20-Poly1305 with a random 12-byte nonce. Salt and nonce are
//! regenerated on every save.

use argon2::Argon2;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::store::StoreError;

const RECORD_VERSION: u32 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

#[derive(Debug, Serialize, Deserialize)]
pub struct SealedRecord {
    pub version: u32,
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<Key, StoreError> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| StoreError::Encrypt(e.to_string()))?;
    Ok(*Key::from_slice(&key))
}

pub fn seal(passphrase: &str, plain: &[u8]) -> Result<SealedRecord, StoreError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(&derive_key(passphrase, &salt)?);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plain)
        .map_err(|e| StoreError::Encrypt(e.to_string()))?;

    Ok(SealedRecord {
        version: RECORD_VERSION,
        salt: STANDARD.encode(salt),
        nonce: STANDARD.encode(nonce),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

pub fn open(passphrase: &str, record: &SealedRecord) -> Result<Vec<u8>, StoreError> {
    if record.version != RECORD_VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported sealed record version {}",
            record.version
        )));
    }

    let decode = |field: &str, value: &str| {
        STANDARD
            .decode(value)
            .map_err(|_| StoreError::Corrupt(format!("{} is not valid base64", field)))
    };
    let salt = decode("salt", &record.salt)?;
    let nonce = decode("nonce", &record.nonce)?;
    let ciphertext = decode("ciphertext", &record.ciphertext)?;
    if nonce.len() != NONCE_LEN {
        return Err(StoreError::Corrupt("nonce has the wrong length".to_string()));
    }

    let cipher = ChaCha20Poly1305::new(&derive_key(passphrase, &salt)?);
    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| StoreError::Decrypt)
}
