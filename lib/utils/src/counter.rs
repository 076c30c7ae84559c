use core::sync::atomic::{AtomicUsize, Ordering};

/// Nesting counter for a disable request that may be issued from several places.
///
/// The counter only reports the edges that matter to hardware: [DisableCounter::disable]
/// returns `true` on the 0 → 1 transition and [DisableCounter::enable] returns `true`
/// on the 1 → 0 transition. Calls in between only change the nesting depth.
///
/// ## Notes:
/// The counter is updated without any outer lock, so every update is a single
/// atomic read-modify-write. [DisableCounter::enable] saturates at zero: an
/// unmatched enable is a no-op and reports no transition.
#[derive(Debug)]
pub struct DisableCounter {
    counter: AtomicUsize,
}

impl DisableCounter {
    pub const fn new() -> DisableCounter {
        DisableCounter {
            counter: AtomicUsize::new(0),
        }
    }

    /// Increase the nesting depth. Return `true` if this call disabled the owner.
    pub fn disable(&self) -> bool {
        self.counter.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Decrease the nesting depth. Return `true` if this call re-enabled the owner.
    pub fn enable(&self) -> bool {
        match self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            }) {
            Ok(previous) => previous == 1,
            Err(_) => false,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.get_count() != 0
    }

    pub fn get_count(&self) -> usize {
        self.counter.load(Ordering::Acquire)
    }
}

impl Default for DisableCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::DisableCounter;

    #[test]
    fn only_outer_transitions_are_reported() {
        let counter = DisableCounter::new();
        assert!(counter.disable());
        assert!(!counter.disable());
        assert_eq!(counter.get_count(), 2);

        assert!(!counter.enable());
        assert!(counter.is_disabled());
        assert!(counter.enable());
        assert!(!counter.is_disabled());
    }

    #[test]
    fn enable_saturates_at_zero() {
        let counter = DisableCounter::new();
        assert!(!counter.enable());
        assert_eq!(counter.get_count(), 0);
        assert!(counter.disable());
    }
}
