// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Two-phase pending/committed values.
//!
//! A [`LatchedValue`] separates what the caller last asked for (*pending*)
//! from what the adapter last handed to the backend (*committed*). Mutators
//! report a [`DirtyDelta`] so that an owner can keep an aggregate count of
//! dirty values without scanning them:
//!
//! ```text
//!   set_pending(x) ──► BecameDirty / BecameClean / Unchanged ──► owner count ±1
//!   latch()        ──► BecameClean / Unchanged               ──► owner count -1
//! ```
//!
//! Setting pending back to the committed value before the next latch cancels
//! the dirty contribution, so the count changes once per net transition.

/// Net change in dirtiness caused by a mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirtyDelta {
    /// Dirtiness did not change.
    Unchanged,
    /// The value went from clean to dirty.
    BecameDirty,
    /// The value went from dirty to clean.
    BecameClean,
}

impl DirtyDelta {
    /// Applies this delta to an aggregate dirty counter.
    #[inline]
    pub fn apply_to(self, counter: &mut usize) {
        match self {
            Self::Unchanged => {}
            Self::BecameDirty => *counter += 1,
            Self::BecameClean => *counter = counter.saturating_sub(1),
        }
    }

    /// Returns `true` unless the delta is [`Unchanged`](Self::Unchanged).
    #[inline]
    #[must_use]
    pub const fn is_transition(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// A value with separate pending and committed states.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LatchedValue<T> {
    committed: T,
    pending: T,
}

impl<T: Clone + PartialEq> LatchedValue<T> {
    /// Creates a clean value whose pending and committed states are `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            committed: value.clone(),
            pending: value,
        }
    }

    /// Returns the value last requested by the caller.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &T {
        &self.pending
    }

    /// Returns the value last latched.
    #[inline]
    #[must_use]
    pub fn committed(&self) -> &T {
        &self.committed
    }

    /// Returns `true` when pending differs from committed.
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.pending != self.committed
    }

    /// Sets the pending value and reports the net dirtiness transition.
    pub fn set_pending(&mut self, value: T) -> DirtyDelta {
        if value == self.pending {
            return DirtyDelta::Unchanged;
        }
        let was_dirty = self.is_dirty();
        self.pending = value;
        match (was_dirty, self.is_dirty()) {
            (false, true) => DirtyDelta::BecameDirty,
            (true, false) => DirtyDelta::BecameClean,
            _ => DirtyDelta::Unchanged,
        }
    }

    /// Commits the pending value.
    pub fn latch(&mut self) -> DirtyDelta {
        if !self.is_dirty() {
            return DirtyDelta::Unchanged;
        }
        self.committed = self.pending.clone();
        DirtyDelta::BecameClean
    }
}

impl<T: Clone + PartialEq + Default> Default for LatchedValue<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::{DirtyDelta, LatchedValue};

    #[test]
    fn new_value_is_clean() {
        let value = LatchedValue::new(3_u8);
        assert!(!value.is_dirty(), "fresh value is clean");
        assert_eq!(*value.pending(), 3);
        assert_eq!(*value.committed(), 3);
    }

    #[test]
    fn set_pending_reports_net_transitions() {
        let mut value = LatchedValue::new(0_u8);
        assert_eq!(value.set_pending(0), DirtyDelta::Unchanged);
        assert_eq!(value.set_pending(1), DirtyDelta::BecameDirty);
        assert_eq!(value.set_pending(2), DirtyDelta::Unchanged, "still dirty");
        assert_eq!(value.set_pending(0), DirtyDelta::BecameClean);
    }

    #[test]
    fn back_and_forth_conserves_counter() {
        let mut value = LatchedValue::new(0_u8);
        let mut counter = 7_usize;
        for v in [1, 2, 0, 3, 3, 1, 0] {
            value.set_pending(v).apply_to(&mut counter);
        }
        assert!(!value.is_dirty(), "ended at committed value");
        assert_eq!(counter, 7, "counter unchanged after net-zero sequence");
    }

    #[test]
    fn latch_commits_and_cleans() {
        let mut value = LatchedValue::new('a');
        let mut counter = 0_usize;
        value.set_pending('b').apply_to(&mut counter);
        assert_eq!(counter, 1);

        value.latch().apply_to(&mut counter);
        assert_eq!(counter, 0);
        assert_eq!(*value.committed(), 'b');
        assert_eq!(value.latch(), DirtyDelta::Unchanged, "second latch is a no-op");
    }

    #[test]
    fn counter_saturates_at_zero() {
        let mut counter = 0_usize;
        DirtyDelta::BecameClean.apply_to(&mut counter);
        assert_eq!(counter, 0);
        assert!(!DirtyDelta::Unchanged.is_transition(), "unchanged is not a transition");
    }
}
