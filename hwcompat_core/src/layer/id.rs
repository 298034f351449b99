// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer identity.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique layer identifier.
///
/// Ids are assigned in creation order starting at 1 and are never reused, so
/// comparing two ids also compares their creation order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u64);

impl LayerId {
    /// Allocates the next layer id, or `None` once the id space is exhausted.
    pub(crate) fn allocate() -> Option<Self> {
        next_id(&NEXT_LAYER_ID).map(Self)
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerId({})", self.0)
    }
}

/// Takes the next value from a monotonically increasing id counter.
///
/// Returns `None` when the counter would wrap.
pub(crate) fn next_id(counter: &AtomicU64) -> Option<u64> {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1))
        .ok()
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::AtomicU64;

    use super::{LayerId, next_id};

    #[test]
    fn allocated_ids_increase() {
        let a = LayerId::allocate();
        let b = LayerId::allocate();
        assert!(a.is_some() && b.is_some(), "id space not exhausted");
        assert!(a < b, "later allocation compares greater");
    }

    #[test]
    fn exhausted_counter_yields_none() {
        let counter = AtomicU64::new(u64::MAX);
        assert_eq!(next_id(&counter), None);

        let counter = AtomicU64::new(5);
        assert_eq!(next_id(&counter), Some(5));
        assert_eq!(next_id(&counter), Some(6));
    }
}
