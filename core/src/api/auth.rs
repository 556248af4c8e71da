//! Control-Plane shared secret.

use std::fs;
use std::path::Path;

use log::info;
use rand::RngCore;

use crate::data::write_private;
use crate::error::ControlError;

/// Request header carrying the secret. The `secret` query parameter is
/// accepted as an alternative.
pub const SECRET_HEADER: &str = "x-minerdock-secret";


#[derive(Clone)]
pub struct Secret(String);

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl Secret {
    /// 32 random bytes, hex encoded.
    pub fn generate() -> Secret {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Secret(hex::encode(bytes))
    }

    pub fn new(value: &str) -> Secret {
        Secret(value.to_string())
    }

    /// Read the persisted secret, generating and persisting one (mode 0600)
    /// the first time.
    pub fn load_or_create(path: &Path) -> Result<Secret, ControlError> {
        if let Ok(content) = fs::read_to_string(path) {
            let value = content.trim();
            if !value.is_empty() {
                return Ok(Secret::new(value));
            }
        }
        let secret = Secret::generate();
        write_private(path, secret.0.as_bytes())?;
        info!("generated control secret at {}", path.display());
        Ok(secret)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a presented value.
    pub fn matches(&self, candidate: &str) -> bool {
        let a = self.0.as_bytes();
        let b = candidate.as_bytes();
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}
