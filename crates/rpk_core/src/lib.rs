//! rpk_core — Core types, domains, and deterministic primitives for ReplayKit.
//!
//! This crate is **I/O-free**. It defines stable types/APIs used across the
//! engine (`rpk_io`, `rpk_redact`, `rpk_capture`, `rpk_replay`, `rpk_diff`,
//! `rpk_cli`).
//!
//! - Identifiers: `Sha256Digest` (`sha256:` + 64-hex), `StepId` (`step-NNNNNN`),
//!   `RunId`
//! - Step/Run model: the closed `StepType` set and the ordered `Run` container
//! - Policy value types: interception, redaction, replay, hybrid replay
//! - The volatile-metadata denylist shared by hashing and diff-ignore
//! - Seedable RNG (ChaCha20) for deterministic synthetic workloads
//! - Plugin hook contract with panic isolation

#![forbid(unsafe_code)]

pub mod errors;
pub mod hooks;
pub mod ids;
pub mod policy;
pub mod rng;
pub mod run;
pub mod step;
pub mod volatile;

pub use errors::CoreError;
pub use ids::{RunId, Sha256Digest, StepId};
pub use policy::{
    HybridReplayPolicy, InterceptionPolicy, NondeterminismMode, RedactionPolicy, ReplayConfig,
};
pub use run::Run;
pub use step::{Step, StepType};
