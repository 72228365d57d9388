//! Plugin hook contract: lifecycle notifications with panic isolation.
//!
//! Hook failures never abort the core operation; a panicking hook is caught
//! and recorded in a diagnostics buffer the host can drain. Loading
//! mechanics live outside the core; hosts hand fully constructed hook
//! objects to [`HookSet::register`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use crate::errors::CoreError;
use crate::run::Run;
use crate::step::Step;

/// Hook hosts reject plugins whose major differs from this.
pub const PLUGIN_API_VERSION: &str = "1.0";

/// Lifecycle notifications. All methods default to no-ops so plugins
/// implement only what they observe.
pub trait LifecycleHooks: Send + Sync {
    /// Stable name used in diagnostics.
    fn name(&self) -> &str;

    /// Plugin API version; hosts compare majors against [`PLUGIN_API_VERSION`].
    fn api_version(&self) -> &str {
        PLUGIN_API_VERSION
    }

    fn on_capture_start(&self, _run_id: &str) {}
    fn on_step(&self, _step: &Step) {}
    fn on_capture_end(&self, _run: &Run) {}
    fn on_replay_start(&self, _source_run_id: &str) {}
    fn on_replay_end(&self, _run: &Run) {}
    fn on_diff_start(&self, _left_run_id: &str, _right_run_id: &str) {}
    fn on_diff_end(&self, _entry_count: usize) {}
}

/// One isolated hook failure.
#[derive(Clone, Debug, PartialEq)]
pub struct HookDiagnostic {
    pub hook: String,
    pub event: &'static str,
    pub detail: String,
}

/// A set of registered hooks plus the diagnostics buffer for their failures.
#[derive(Default)]
pub struct HookSet {
    hooks: Vec<Box<dyn LifecycleHooks>>,
    diagnostics: Mutex<Vec<HookDiagnostic>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook, rejecting an incompatible API major.
    pub fn register(&mut self, hook: Box<dyn LifecycleHooks>) -> Result<(), CoreError> {
        let major = hook.api_version().split('.').next().unwrap_or("");
        let expected = PLUGIN_API_VERSION.split('.').next().unwrap_or("");
        if major != expected {
            return Err(CoreError::IncompatiblePluginApi);
        }
        self.hooks.push(hook);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Drain accumulated diagnostics.
    pub fn take_diagnostics(&self) -> Vec<HookDiagnostic> {
        let mut guard = self.diagnostics.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *guard)
    }

    fn dispatch<F: Fn(&dyn LifecycleHooks)>(&self, event: &'static str, f: F) {
        for hook in &self.hooks {
            let result = catch_unwind(AssertUnwindSafe(|| f(hook.as_ref())));
            if let Err(panic) = result {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                let mut guard = self.diagnostics.lock().unwrap_or_else(|p| p.into_inner());
                guard.push(HookDiagnostic {
                    hook: hook.name().to_string(),
                    event,
                    detail,
                });
            }
        }
    }

    pub fn capture_start(&self, run_id: &str) {
        self.dispatch("capture_start", |h| h.on_capture_start(run_id));
    }

    pub fn step(&self, step: &Step) {
        self.dispatch("step", |h| h.on_step(step));
    }

    pub fn capture_end(&self, run: &Run) {
        self.dispatch("capture_end", |h| h.on_capture_end(run));
    }

    pub fn replay_start(&self, source_run_id: &str) {
        self.dispatch("replay_start", |h| h.on_replay_start(source_run_id));
    }

    pub fn replay_end(&self, run: &Run) {
        self.dispatch("replay_end", |h| h.on_replay_end(run));
    }

    pub fn diff_start(&self, left: &str, right: &str) {
        self.dispatch("diff_start", |h| h.on_diff_start(left, right));
    }

    pub fn diff_end(&self, entry_count: usize) {
        self.dispatch("diff_end", |h| h.on_diff_end(entry_count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Panicky;
    impl LifecycleHooks for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        fn on_capture_start(&self, _run_id: &str) {
            panic!("boom");
        }
    }

    struct OldApi;
    impl LifecycleHooks for OldApi {
        fn name(&self) -> &str {
            "old"
        }
        fn api_version(&self) -> &str {
            "0.3"
        }
    }

    #[test]
    fn panicking_hook_is_isolated() {
        let mut set = HookSet::new();
        set.register(Box::new(Panicky)).unwrap();
        set.capture_start("run-x");
        let diags = set.take_diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].hook, "panicky");
        assert_eq!(diags[0].event, "capture_start");
        assert_eq!(diags[0].detail, "boom");
        assert!(set.take_diagnostics().is_empty());
    }

    #[test]
    fn incompatible_major_rejected() {
        let mut set = HookSet::new();
        assert_eq!(
            set.register(Box::new(OldApi)),
            Err(CoreError::IncompatiblePluginApi)
        );
        assert!(set.is_empty());
    }
}
