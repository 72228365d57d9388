//! The offline network guard.
//!
//! A process-wide deny flag, held as an atomic depth counter so nested
//! replays compose. Installation and teardown are paired on all exit paths:
//! the guard is a plain RAII value, so panics and `?` both release it.
//!
//! Every outbound-capable seam in this codebase calls [`check_outbound`]
//! before opening a socket; while a guard is active the check fails with a
//! distinct error and the socket is never opened.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use rpk_core::policy::host_of;

use crate::ReplayError;

static GUARD_DEPTH: AtomicUsize = AtomicUsize::new(0);

/// RAII handle; dropping releases one level of the deny guard.
#[derive(Debug)]
pub struct NetworkGuard {
    _private: (),
}

/// Install one level of the process-wide deny guard.
pub fn install() -> NetworkGuard {
    GUARD_DEPTH.fetch_add(1, Ordering::SeqCst);
    tracing::debug!("network deny guard installed");
    NetworkGuard { _private: () }
}

impl Drop for NetworkGuard {
    fn drop(&mut self) {
        GUARD_DEPTH.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!("network deny guard released");
    }
}

/// Whether the deny guard is currently active.
pub fn denying() -> bool {
    GUARD_DEPTH.load(Ordering::SeqCst) > 0
}

/// Gate an outbound socket open. Fails while the guard is active.
pub fn check_outbound(url: &str) -> Result<(), ReplayError> {
    if denying() {
        return Err(ReplayError::NetworkAttemptBlocked {
            host: host_of(url),
        });
    }
    Ok(())
}

/// The seam a live transport implements. Provider adapters are out of the
/// core's scope; the trait exists so replay can prove a mis-wired adapter
/// is stopped before any socket opens.
pub trait OutboundAdapter {
    fn fetch(&self, url: &str) -> Result<Value, ReplayError>;
}

/// Guard-checked fetch: the only sanctioned way to reach an adapter.
pub fn guarded_fetch(adapter: &dyn OutboundAdapter, url: &str) -> Result<Value, ReplayError> {
    check_outbound(url)?;
    adapter.fetch(url)
}
