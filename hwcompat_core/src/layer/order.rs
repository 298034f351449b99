// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Z-ordered layer set.

use std::collections::BTreeSet;

use super::LayerId;

/// Layers ordered back to front by Z, ties broken by creation order.
///
/// The set is keyed by `(z, id)`. Two entries only compare equal when they are
/// the same layer at the same Z, so changing a layer's Z is a remove followed
/// by an insert.
#[derive(Clone, Debug, Default)]
pub(crate) struct ZOrder {
    entries: BTreeSet<(u32, LayerId)>,
}

impl ZOrder {
    pub(crate) fn insert(&mut self, z: u32, id: LayerId) {
        self.entries.insert((z, id));
    }

    pub(crate) fn remove(&mut self, z: u32, id: LayerId) -> bool {
        self.entries.remove(&(z, id))
    }

    /// Moves `id` from `old_z` to `new_z`.
    ///
    /// Returns `false` if the layer was not in the set at `old_z`.
    pub(crate) fn reorder(&mut self, id: LayerId, old_z: u32, new_z: u32) -> bool {
        if !self.remove(old_z, id) {
            return false;
        }
        self.insert(new_z, id);
        true
    }

    /// Iterates layer ids back to front.
    pub(crate) fn iter(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.entries.iter().map(|&(_, id)| id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::ZOrder;
    use crate::layer::LayerId;

    #[test]
    fn iterates_by_z_then_creation_order() {
        let mut order = ZOrder::default();
        order.insert(5, LayerId(1));
        order.insert(1, LayerId(2));
        order.insert(5, LayerId(3));
        order.insert(1, LayerId(0));

        let ids: Vec<_> = order.iter().collect();
        assert_eq!(ids, [LayerId(0), LayerId(2), LayerId(1), LayerId(3)]);
    }

    #[test]
    fn reorder_moves_layer() {
        let mut order = ZOrder::default();
        order.insert(1, LayerId(1));
        order.insert(2, LayerId(2));

        assert!(order.reorder(LayerId(1), 1, 3), "layer was present");
        let ids: Vec<_> = order.iter().collect();
        assert_eq!(ids, [LayerId(2), LayerId(1)]);
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn reorder_missing_layer_is_rejected() {
        let mut order = ZOrder::default();
        order.insert(1, LayerId(1));
        assert!(!order.reorder(LayerId(1), 9, 3), "wrong old z");
        assert!(!order.reorder(LayerId(7), 1, 3), "unknown layer");
        assert_eq!(order.len(), 1);
    }
}
