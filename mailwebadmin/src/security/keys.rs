//! Cookie key material
//!
//! The key file holds one base64 encoded key per line, always in pairs:
//! a 64 byte authentication key followed by a 32 byte encryption key.
//! The last pair is the active one; earlier pairs are kept for rotation.

use axum_extra::extract::cookie::Key;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{rngs::OsRng, RngCore};
use std::path::Path;
use tracing::info;

use crate::error::{AdminError, Result};

pub const AUTH_KEY_LEN: usize = 64;
pub const ENCRYPTION_KEY_LEN: usize = 32;

#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub auth: Vec<u8>,
    pub encryption: Vec<u8>,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").finish_non_exhaustive()
    }
}

impl KeyPair {
    pub fn generate() -> Self {
        let mut auth = vec![0u8; AUTH_KEY_LEN];
        let mut encryption = vec![0u8; ENCRYPTION_KEY_LEN];
        OsRng.fill_bytes(&mut auth);
        OsRng.fill_bytes(&mut encryption);
        Self { auth, encryption }
    }

    /// Build the cookie key: signing half from the auth key, encryption
    /// half from the encryption key.
    pub fn cookie_key(&self) -> Result<Key> {
        if self.auth.len() < 32 || self.encryption.len() < 32 {
            return Err(AdminError::Config(
                "keys must be at least 32 bytes long".to_string(),
            ));
        }
        let mut master = Vec::with_capacity(64);
        master.extend_from_slice(&self.auth[..32]);
        master.extend_from_slice(&self.encryption[..32]);
        Key::try_from(master.as_slice()).map_err(|e| AdminError::Config(e.to_string()))
    }
}

pub fn read_key_pairs(path: &Path) -> Result<Vec<KeyPair>> {
    let content = std::fs::read_to_string(path)?;
    let keys = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            BASE64
                .decode(line.trim())
                .map_err(|e| AdminError::Config(format!("invalid key in key file: {}", e)))
        })
        .collect::<Result<Vec<_>>>()?;

    if keys.len() % 2 != 0 {
        return Err(AdminError::Config(format!(
            "Expected a list of keyPairs, i.e. length mod 2 == 0, got length {}",
            keys.len()
        )));
    }

    Ok(keys
        .chunks(2)
        .map(|pair| KeyPair {
            auth: pair[0].clone(),
            encryption: pair[1].clone(),
        })
        .collect())
}

pub fn write_key_pairs(path: &Path, pairs: &[KeyPair]) -> Result<()> {
    let mut content = String::new();
    for pair in pairs {
        content.push_str(&BASE64.encode(&pair.auth));
        content.push('\n');
        content.push_str(&BASE64.encode(&pair.encryption));
        content.push('\n');
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Read the key file or create it with a fresh pair.
pub fn read_or_create_keys(path: &Path) -> Result<Vec<KeyPair>> {
    if path.exists() {
        let pairs = read_key_pairs(path)?;
        if pairs.is_empty() {
            return Err(AdminError::Config(format!(
                "key file {} contains no keys",
                path.display()
            )));
        }
        return Ok(pairs);
    }

    info!("Key file doesn't exist, creating new keys.");
    let pairs = vec![KeyPair::generate()];
    write_key_pairs(path, &pairs)?;
    Ok(pairs)
}

/// Cookie key derived from the most recent pair.
pub fn active_cookie_key(pairs: &[KeyPair]) -> Result<Key> {
    pairs
        .last()
        .ok_or_else(|| AdminError::Config("no key pairs available".to_string()))?
        .cookie_key()
}
