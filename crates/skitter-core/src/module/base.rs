//! Shared counter bookkeeping embedded by every concrete module.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::module::{
    calculate_score_simple, split_mid, CalculateScore, Counts, ModuleError, SummaryStruct, MID,
};

/// Counter and score plumbing common to downloaders, analyzers, and
/// pipelines. Concrete modules embed one of these and delegate their
/// `Module` impl to it (see `impl_module_delegate!`).
pub struct ModuleBase {
    mid: MID,
    addr: Option<String>,
    score: AtomicU64,
    score_calculator: CalculateScore,
    called_count: AtomicU64,
    accepted_count: AtomicU64,
    completed_count: AtomicU64,
    handling_number: AtomicU64,
}

impl ModuleBase {
    /// Validates the MID and extracts its address part. A `None` calculator
    /// falls back to [`calculate_score_simple`].
    pub fn new(mid: MID, score_calculator: Option<CalculateScore>) -> Result<Self, ModuleError> {
        let (_, _, addr) = split_mid(&mid)?;
        Ok(ModuleBase {
            mid,
            addr,
            score: AtomicU64::new(0),
            score_calculator: score_calculator.unwrap_or(calculate_score_simple),
            called_count: AtomicU64::new(0),
            accepted_count: AtomicU64::new(0),
            completed_count: AtomicU64::new(0),
            handling_number: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> &MID {
        &self.mid
    }

    pub fn addr(&self) -> Option<&str> {
        self.addr.as_deref()
    }

    pub fn score(&self) -> u64 {
        self.score.load(Ordering::SeqCst)
    }

    pub fn set_score(&self, score: u64) {
        self.score.store(score, Ordering::SeqCst);
    }

    pub fn score_calculator(&self) -> CalculateScore {
        self.score_calculator
    }

    pub fn incr_called_count(&self) {
        self.called_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_accepted_count(&self) {
        self.accepted_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_completed_count(&self) {
        self.completed_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Marks one invocation as in-flight; the counter drops again when the
    /// guard does, on every exit path.
    pub fn start_handling(&self) -> HandlingGuard<'_> {
        self.handling_number.fetch_add(1, Ordering::SeqCst);
        HandlingGuard { base: self }
    }

    pub fn called_count(&self) -> u64 {
        self.called_count.load(Ordering::SeqCst)
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted_count.load(Ordering::SeqCst)
    }

    pub fn completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::SeqCst)
    }

    pub fn handling_number(&self) -> u64 {
        self.handling_number.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> Counts {
        Counts {
            called_count: self.called_count(),
            accepted_count: self.accepted_count(),
            completed_count: self.completed_count(),
            handling_number: self.handling_number(),
        }
    }

    pub fn summary(&self) -> SummaryStruct {
        let counts = self.counts();
        SummaryStruct {
            id: self.mid.clone(),
            called: counts.called_count,
            accepted: counts.accepted_count,
            completed: counts.completed_count,
            handling: counts.handling_number,
            extra: None,
        }
    }

    /// Resets all counters for reuse.
    pub fn clear(&self) {
        self.called_count.store(0, Ordering::SeqCst);
        self.accepted_count.store(0, Ordering::SeqCst);
        self.completed_count.store(0, Ordering::SeqCst);
        self.handling_number.store(0, Ordering::SeqCst);
    }
}

/// Scope guard pairing `start_handling` with its decrement.
pub struct HandlingGuard<'a> {
    base: &'a ModuleBase,
}

impl Drop for HandlingGuard<'_> {
    fn drop(&mut self) {
        self.base.handling_number.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Implements the `Module` trait by delegating to a `base: ModuleBase`
/// field, optionally with an overridden `summary` body.
macro_rules! impl_module_delegate {
    ($ty:ty) => {
        impl_module_delegate!($ty, |this: &$ty| this.base.summary());
    };
    ($ty:ty, $summary:expr) => {
        impl $crate::module::Module for $ty {
            fn id(&self) -> &$crate::module::MID {
                self.base.id()
            }
            fn addr(&self) -> Option<&str> {
                self.base.addr()
            }
            fn score(&self) -> u64 {
                self.base.score()
            }
            fn set_score(&self, score: u64) {
                self.base.set_score(score)
            }
            fn score_calculator(&self) -> $crate::module::CalculateScore {
                self.base.score_calculator()
            }
            fn called_count(&self) -> u64 {
                self.base.called_count()
            }
            fn accepted_count(&self) -> u64 {
                self.base.accepted_count()
            }
            fn completed_count(&self) -> u64 {
                self.base.completed_count()
            }
            fn handling_number(&self) -> u64 {
                self.base.handling_number()
            }
            fn counts(&self) -> $crate::module::Counts {
                self.base.counts()
            }
            fn summary(&self) -> $crate::module::SummaryStruct {
                let f: fn(&$ty) -> $crate::module::SummaryStruct = $summary;
                f(self)
            }
        }
    };
}

pub(crate) use impl_module_delegate;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{gen_mid, Type};

    #[test]
    fn new_rejects_malformed_mid() {
        assert!(ModuleBase::new(MID::new("Q9"), None).is_err());
    }

    #[test]
    fn counters_and_clear() {
        let base = ModuleBase::new(gen_mid(Type::Downloader, 1, None), None).unwrap();
        base.incr_called_count();
        base.incr_called_count();
        base.incr_accepted_count();
        base.incr_completed_count();
        let counts = base.counts();
        assert_eq!(counts.called_count, 2);
        assert_eq!(counts.accepted_count, 1);
        assert_eq!(counts.completed_count, 1);
        base.clear();
        assert_eq!(base.counts(), Counts::default());
    }

    #[test]
    fn handling_guard_decrements_on_drop_even_on_panic_paths() {
        let base = ModuleBase::new(gen_mid(Type::Pipeline, 2, None), None).unwrap();
        {
            let _guard = base.start_handling();
            assert_eq!(base.handling_number(), 1);
            let _inner = base.start_handling();
            assert_eq!(base.handling_number(), 2);
        }
        assert_eq!(base.handling_number(), 0);
    }

    #[test]
    fn address_is_extracted_from_the_mid() {
        let base =
            ModuleBase::new(gen_mid(Type::Analyzer, 3, Some("10.0.0.1:9000")), None).unwrap();
        assert_eq!(base.addr(), Some("10.0.0.1:9000"));
        assert_eq!(base.id().as_str(), "A3|10.0.0.1:9000");
    }
}
