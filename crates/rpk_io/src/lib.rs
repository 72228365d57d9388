//! rpk_io — Canonical JSON, hashing, signatures, envelope I/O, and migration.
//!
//! Single source of truth for everything that touches artifact bytes:
//! - `canonical`: the byte-exact codec
//! - `hasher` / `signature`: content addressing and the integrity contract
//! - `schema` / `envelope`: validated read/write with atomic replace
//! - `migrate`: prior-major upgrades
//!
//! Shared error type (`IoError`) with stable machine codes used across
//! modules and by the embedding surfaces.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Unified error for rpk_io. Every variant carries a stable machine code
/// (see [`IoError::code`]) matching the documented taxonomy.
#[derive(Debug, Error)]
pub enum IoError {
    /// Filesystem / path errors (create_dir_all, rename, fsync, etc.)
    #[error("io/path error: {0}")]
    Path(String),

    /// The bytes are not JSON at all.
    #[error("invalid json: {0}")]
    InvalidJson(String),

    /// Strict parsing rejected a repeated object key.
    #[error("duplicate object key: {key}")]
    DuplicateKey { key: String },

    /// NaN / ±Infinity reached the canonical codec.
    #[error("non-finite number is not representable in canonical form")]
    NonFiniteNumber,

    /// Structural validation against the published schema failed.
    #[error("schema violation at {pointer}: {msg}")]
    SchemaViolation { pointer: String, msg: String },

    /// The envelope names a schema major this reader does not speak.
    #[error("unknown schema major in version {found} (migrate the artifact)")]
    UnknownMajor { found: String },

    /// Stored checksum does not match the canonical payload bytes.
    #[error("checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: String, computed: String },

    /// Signature verification was required but the artifact is unsigned.
    #[error("signature required but absent")]
    SignatureMissing,

    /// Signature verification failed.
    #[error("signature mismatch for key {key_id}")]
    SignatureMismatch { key_id: String },

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedSignatureAlgorithm(String),

    /// Verification demanded but no key is available in the environment.
    #[error("signing key missing")]
    KeyMissing,

    /// Migration source version has no supported transition.
    #[error("unsupported artifact version: {0}")]
    UnsupportedVersion(String),

    /// Payload shape does not deserialize into the typed model.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Step hash recomputation failed during migration.
    #[error("hash recompute failed for {step_id}: {msg}")]
    RecomputeFailed { step_id: String, msg: String },
}

pub type IoResult<T> = Result<T, IoError>;

impl IoError {
    /// Stable machine code for user-visible failures.
    pub fn code(&self) -> &'static str {
        match self {
            IoError::Path(_) => "io_error",
            IoError::InvalidJson(_) => "invalid_json",
            IoError::DuplicateKey { .. } => "duplicate_key",
            IoError::NonFiniteNumber => "non_finite_number",
            IoError::SchemaViolation { .. } => "schema_violation",
            IoError::UnknownMajor { .. } => "unknown_major",
            IoError::ChecksumMismatch { .. } => "checksum_mismatch",
            IoError::SignatureMissing => "signature_missing",
            IoError::SignatureMismatch { .. } => "signature_mismatch",
            IoError::UnsupportedSignatureAlgorithm(_) => "unsupported_signature_algorithm",
            IoError::KeyMissing => "key_missing",
            IoError::UnsupportedVersion(_) => "unsupported_version",
            IoError::MalformedPayload(_) => "malformed_payload",
            IoError::RecomputeFailed { .. } => "recompute_failed",
        }
    }
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Path(e.to_string())
    }
}

pub mod canonical;
pub mod envelope;
pub mod hasher;
pub mod migrate;
pub mod schema;
pub mod signature;

pub mod prelude {
    pub use crate::canonical::{canonical_bytes_of, parse_strict, to_canonical_bytes};
    pub use crate::envelope::{
        read_artifact, read_artifact_with, write_envelope, Artifact, Envelope, ReadOptions,
    };
    pub use crate::hasher::{artifact_checksum, sha256_hex, step_hash};
    pub use crate::{IoError, IoResult};
}
