//! Post-evaluation hooks.
//!
//! Consumers (UI refresh, notification triggers, export pipelines)
//! register a hook to observe each committed snapshot. Hooks run
//! synchronously after the commit, one after another; a failing hook
//! is logged and skipped so it can never block the evaluation path or
//! its siblings.
//!
//! Contract: hooks must not call back into evaluation. Re-entrant
//! evaluations would race the commit they are being notified about;
//! the sequence guard would reject them and the work would be wasted.

use std::sync::Arc;

use crate::context::ContextSnapshot;
use crate::error::{Result, ValidationError};

/// Upper bound on registered hooks.
pub const MAX_HOOKS: usize = 16;

/// Observer of committed context snapshots.
pub trait PostEvalHook: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Called after every committed evaluation.
    fn on_context(
        &self,
        snapshot: &ContextSnapshot,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// The registered hook list.
#[derive(Default)]
pub struct HookSet {
    hooks: Vec<Arc<dyn PostEvalHook>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. Fails when the set is full.
    pub fn register(&mut self, hook: Arc<dyn PostEvalHook>) -> Result<()> {
        if self.hooks.len() >= MAX_HOOKS {
            return Err(ValidationError::InvalidValue {
                field: "hooks".into(),
                message: format!("hook limit of {MAX_HOOKS} reached"),
            }
            .into());
        }
        self.hooks.push(hook);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Notify every hook. Returns the number of hook failures.
    pub fn notify(&self, snapshot: &ContextSnapshot) -> usize {
        let mut failures = 0;
        for hook in &self.hooks {
            if let Err(e) = hook.on_context(snapshot) {
                log::warn!("hook '{}' failed: {e}", hook.name());
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    impl PostEvalHook for Counting {
        fn name(&self) -> &str {
            "counting"
        }
        fn on_context(
            &self,
            _snapshot: &ContextSnapshot,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl PostEvalHook for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn on_context(
            &self,
            _snapshot: &ContextSnapshot,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("refused".into())
        }
    }

    #[test]
    fn failing_hook_does_not_block_the_rest() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut set = HookSet::new();
        set.register(Arc::new(Failing)).unwrap();
        set.register(Arc::new(Counting {
            calls: Arc::clone(&calls),
        }))
        .unwrap();

        let snap = ContextSnapshot::initial(Utc::now());
        let failures = set.notify(&snap);
        assert_eq!(failures, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registration_is_bounded() {
        let mut set = HookSet::new();
        for _ in 0..MAX_HOOKS {
            set.register(Arc::new(Failing)).unwrap();
        }
        assert!(set.register(Arc::new(Failing)).is_err());
        assert_eq!(set.len(), MAX_HOOKS);
    }
}
