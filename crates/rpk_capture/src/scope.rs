//! Capture scope: ownership of one run from open to close.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use rpk_core::hooks::HookSet;
use rpk_core::ids::RunId;
use rpk_core::policy::{InterceptionPolicy, RedactionPolicy};
use rpk_core::run::Run;
use rpk_core::step::Step;
use rpk_io::envelope::{build_envelope, write_envelope};
use rpk_io::hasher::sha256_hex;
use rpk_io::signature::SigningKey;
use rpk_redact::RedactionEngine;

use crate::CaptureError;

#[derive(Debug)]
pub(crate) struct RecorderState {
    pub(crate) next_index: u64,
    pub(crate) steps: Vec<Step>,
    pub(crate) closed: bool,
}

pub(crate) struct ScopeInner {
    pub(crate) run_id: RunId,
    pub(crate) timestamp: String,
    pub(crate) intercept: InterceptionPolicy,
    pub(crate) redactor: RedactionEngine,
    pub(crate) scope_metadata: Map<String, Value>,
    pub(crate) hooks: Option<Arc<HookSet>>,
    /// Write-exclusive lock around `(next_id, steps)`; appenders hold it for
    /// the duration of one append only.
    pub(crate) state: Mutex<RecorderState>,
}

impl std::fmt::Debug for ScopeInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeInner")
            .field("run_id", &self.run_id)
            .field("timestamp", &self.timestamp)
            .field("scope_metadata", &self.scope_metadata)
            .field("state", &self.state)
            .finish()
    }
}

/// The run-scoped recorder. Cheap to clone; clones share the recorder, so a
/// scope can be handed to worker threads explicitly.
#[derive(Clone, Debug)]
pub struct CaptureScope {
    pub(crate) inner: Arc<ScopeInner>,
}

impl CaptureScope {
    /// Open a scope with a wall-clock timestamp.
    pub fn open(
        metadata: Map<String, Value>,
        intercept: InterceptionPolicy,
        redaction: &RedactionPolicy,
    ) -> Result<Self, CaptureError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        Self::open_at(&now, metadata, intercept, redaction)
    }

    /// Open a scope with a pinned timestamp (demo/replay-adjacent paths).
    pub fn open_at(
        timestamp: &str,
        mut metadata: Map<String, Value>,
        intercept: InterceptionPolicy,
        redaction: &RedactionPolicy,
    ) -> Result<Self, CaptureError> {
        // Regex compile failures are fatal here, never at record time.
        let redactor = RedactionEngine::compile(redaction)?;
        metadata.insert(
            "redaction_policy_version".to_string(),
            Value::String(redactor.version().to_string()),
        );

        let run_id = derive_run_id(timestamp, &metadata);
        tracing::debug!(run_id = %run_id, "capture scope opened");

        Ok(Self {
            inner: Arc::new(ScopeInner {
                run_id,
                timestamp: timestamp.to_string(),
                intercept,
                redactor,
                scope_metadata: metadata,
                hooks: None,
                state: Mutex::new(RecorderState {
                    next_index: 1,
                    steps: Vec::new(),
                    closed: false,
                }),
            }),
        })
    }

    /// Attach lifecycle hooks. Must be called before recording starts; the
    /// scope announces `capture_start` here.
    pub fn with_hooks(mut self, hooks: Arc<HookSet>) -> Self {
        hooks.capture_start(self.inner.run_id.as_str());
        // Sole owner until the first clone escapes, so this cannot fail.
        let inner = Arc::get_mut(&mut self.inner).expect("scope not yet shared");
        inner.hooks = Some(hooks);
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.inner.run_id
    }

    /// Number of steps appended so far.
    pub fn step_count(&self) -> usize {
        self.lock_state().steps.len()
    }

    pub(crate) fn lock_state(&self) -> std::sync::MutexGuard<'_, RecorderState> {
        self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Finalize the run. After this, every recorder operation on surviving
    /// clones fails with `scope_closed`; the returned `Run` is an immutable
    /// value. Cancellation paths call this too: the run keeps whatever steps
    /// were appended.
    pub fn finalize(self) -> Run {
        let (steps, count) = {
            let mut state = self.lock_state();
            state.closed = true;
            let steps = std::mem::take(&mut state.steps);
            let count = steps.len();
            (steps, count)
        };

        let run = Run {
            id: self.inner.run_id.clone(),
            timestamp: self.inner.timestamp.clone(),
            environment_fingerprint: environment_fingerprint(),
            runtime_versions: runtime_versions(),
            steps,
            extra: BTreeMap::new(),
        };
        tracing::debug!(run_id = %run.id, steps = count, "capture scope closed");
        if let Some(hooks) = &self.inner.hooks {
            hooks.capture_end(&run);
        }
        run
    }

    /// Finalize and persist atomically; the standard close path.
    pub fn close_and_write(
        self,
        path: &Path,
        key: Option<&SigningKey>,
    ) -> Result<Run, CaptureError> {
        let scope_metadata = self.inner.scope_metadata.clone();
        let run = self.finalize();
        let envelope = build_envelope(run.clone(), scope_metadata, key)?;
        write_envelope(path, &envelope)?;
        Ok(run)
    }
}

/// `run-<YYYYMMDDTHHMMSSZ>-<hex8>`: content-derived, no OS entropy.
fn derive_run_id(timestamp: &str, metadata: &Map<String, Value>) -> RunId {
    let compact: String = timestamp
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let seed_doc = Value::Object(
        [
            ("metadata".to_string(), Value::Object(metadata.clone())),
            ("timestamp".to_string(), Value::String(timestamp.to_string())),
        ]
        .into_iter()
        .collect(),
    );
    let digest = match rpk_io::canonical::to_canonical_bytes(&seed_doc) {
        Ok(bytes) => sha256_hex(&bytes),
        // Non-canonical scope metadata cannot occur from parsed input; fall
        // back to hashing the timestamp alone.
        Err(_) => sha256_hex(timestamp.as_bytes()),
    };
    RunId::derive(&compact, &digest[..8])
}

fn environment_fingerprint() -> BTreeMap<String, Value> {
    [
        (
            "arch".to_string(),
            Value::String(std::env::consts::ARCH.to_string()),
        ),
        (
            "family".to_string(),
            Value::String(std::env::consts::FAMILY.to_string()),
        ),
        (
            "os".to_string(),
            Value::String(std::env::consts::OS.to_string()),
        ),
    ]
    .into_iter()
    .collect()
}

fn runtime_versions() -> BTreeMap<String, String> {
    [(
        "replaykit".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    )]
    .into_iter()
    .collect()
}
