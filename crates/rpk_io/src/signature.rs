//! Optional keyed MAC over the envelope (`hmac-sha256`).
//!
//! The key is provided by the embedding environment (`RPK_SIGNING_KEY`,
//! `RPK_KEY_ID`); it is never written into artifacts.

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use rpk_core::ids::Sha256Digest;

use crate::hasher::signing_input;
use crate::IoError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_ALGORITHM: &str = "hmac-sha256";

pub const SIGNING_KEY_ENV: &str = "RPK_SIGNING_KEY";
pub const KEY_ID_ENV: &str = "RPK_KEY_ID";
const DEFAULT_KEY_ID: &str = "default";

/// Persisted signature object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub algorithm: String,
    pub key_id: String,
    /// Lowercase hex MAC.
    pub value: String,
}

/// Key material held in memory only.
#[derive(Clone)]
pub struct SigningKey {
    pub key_id: String,
    secret: Vec<u8>,
}

impl SigningKey {
    pub fn new(key_id: impl Into<String>, secret: Vec<u8>) -> Self {
        Self {
            key_id: key_id.into(),
            secret,
        }
    }

    /// Read key material from the environment; `None` when unset.
    pub fn from_env() -> Option<Self> {
        let secret = std::env::var(SIGNING_KEY_ENV).ok()?;
        if secret.is_empty() {
            return None;
        }
        let key_id = std::env::var(KEY_ID_ENV).unwrap_or_else(|_| DEFAULT_KEY_ID.to_string());
        Some(Self::new(key_id, secret.into_bytes()))
    }
}

// Key bytes must never reach logs or error messages.
impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Compute the envelope MAC over `{checksum, metadata, payload, version}`.
pub fn sign(
    version: &str,
    metadata: &Value,
    payload: &Value,
    checksum: &Sha256Digest,
    key: &SigningKey,
) -> Result<Signature, IoError> {
    let input = signing_input(version, metadata, payload, checksum)?;
    let mut mac =
        HmacSha256::new_from_slice(&key.secret).expect("HMAC accepts any key length");
    mac.update(&input);
    let value = hex::encode(mac.finalize().into_bytes());
    Ok(Signature {
        algorithm: SIGNATURE_ALGORITHM.to_string(),
        key_id: key.key_id.clone(),
        value,
    })
}

/// Verify a persisted signature (constant-time compare).
pub fn verify(
    version: &str,
    metadata: &Value,
    payload: &Value,
    checksum: &Sha256Digest,
    signature: &Signature,
    key: &SigningKey,
) -> Result<(), IoError> {
    if signature.algorithm != SIGNATURE_ALGORITHM {
        return Err(IoError::UnsupportedSignatureAlgorithm(
            signature.algorithm.clone(),
        ));
    }
    let expected = hex::decode(&signature.value).map_err(|_| IoError::SignatureMismatch {
        key_id: signature.key_id.clone(),
    })?;
    let input = signing_input(version, metadata, payload, checksum)?;
    let mut mac =
        HmacSha256::new_from_slice(&key.secret).expect("HMAC accepts any key length");
    mac.update(&input);
    mac.verify_slice(&expected)
        .map_err(|_| IoError::SignatureMismatch {
            key_id: signature.key_id.clone(),
        })
}
