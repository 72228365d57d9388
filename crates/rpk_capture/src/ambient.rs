//! Thread-local scope stack: optional sugar over explicit handles.
//!
//! Scopes nest by stack semantics: entering pushes, the guard's drop pops
//! and restores the outer scope. This lookup is convenience for embedding
//! surfaces, never load-bearing — new OS threads start with **no** active
//! scope, and boundaries emitted from them without an explicit handle are
//! silently uncaptured. Share a recorder across tasks by passing the
//! `CaptureScope` clone explicitly.

use std::cell::RefCell;

use crate::scope::CaptureScope;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<CaptureScope>> = const { RefCell::new(Vec::new()) };
}

/// Guard returned by [`enter`]; popping happens on drop.
pub struct ScopeGuard {
    _private: (),
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Push a scope for the current thread; the inner scope shadows the outer
/// until the guard drops.
pub fn enter(scope: CaptureScope) -> ScopeGuard {
    SCOPE_STACK.with(|stack| stack.borrow_mut().push(scope));
    ScopeGuard { _private: () }
}

/// The innermost active scope on this thread, if any.
pub fn active() -> Option<CaptureScope> {
    SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpk_core::policy::{InterceptionPolicy, RedactionPolicy};
    use serde_json::Map;

    fn open(ts: &str) -> CaptureScope {
        CaptureScope::open_at(
            ts,
            Map::new(),
            InterceptionPolicy::default(),
            &RedactionPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn nesting_restores_outer_scope() {
        assert!(active().is_none());
        let outer = open("2026-01-01T00:00:00Z");
        let outer_id = outer.run_id().clone();
        let _g1 = enter(outer);
        assert_eq!(active().unwrap().run_id(), &outer_id);

        {
            let inner = open("2026-01-02T00:00:00Z");
            let inner_id = inner.run_id().clone();
            let _g2 = enter(inner);
            assert_eq!(active().unwrap().run_id(), &inner_id);
        }

        assert_eq!(active().unwrap().run_id(), &outer_id);
        drop(_g1);
        assert!(active().is_none());
    }

    #[test]
    fn fresh_threads_have_no_scope() {
        let _g = enter(open("2026-01-01T00:00:00Z"));
        let seen = std::thread::spawn(|| active().is_some()).join().unwrap();
        assert!(!seen);
    }
}
