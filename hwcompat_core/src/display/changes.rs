// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Validation results.

use crate::layer::{CompositionType, LayerId, LayerRequest};

/// Outcome of a successful validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidateStatus {
    /// The backend accepted every layer's committed type.
    NoChanges,
    /// The backend overrode at least one layer's type; the caller must
    /// accept the changes (or re-validate) before presenting.
    HasChanges,
}

/// Counts returned by `validate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValidateSummary {
    /// Number of layers whose composition type the backend overrode.
    pub num_type_changes: usize,
    /// Number of per-layer requests.
    pub num_layer_requests: usize,
    /// Whether any type changes are outstanding.
    pub status: ValidateStatus,
}

/// The decisions of one validation, held until the display is modified.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Changes {
    type_changes: Vec<(LayerId, CompositionType)>,
    layer_requests: Vec<(LayerId, LayerRequest)>,
}

impl Changes {
    pub(crate) fn add_type_change(&mut self, layer: LayerId, ty: CompositionType) {
        self.type_changes.push((layer, ty));
    }

    pub(crate) fn add_layer_request(&mut self, layer: LayerId, request: LayerRequest) {
        self.layer_requests.push((layer, request));
    }

    pub(crate) fn type_changes(&self) -> &[(LayerId, CompositionType)] {
        &self.type_changes
    }

    pub(crate) fn layer_requests(&self) -> &[(LayerId, LayerRequest)] {
        &self.layer_requests
    }

    pub(crate) fn take_type_changes(&mut self) -> Vec<(LayerId, CompositionType)> {
        core::mem::take(&mut self.type_changes)
    }

    pub(crate) fn summary(&self) -> ValidateSummary {
        ValidateSummary {
            num_type_changes: self.type_changes.len(),
            num_layer_requests: self.layer_requests.len(),
            status: if self.type_changes.is_empty() {
                ValidateStatus::NoChanges
            } else {
                ValidateStatus::HasChanges
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Changes, ValidateStatus};
    use crate::layer::{CompositionType, LayerId, LayerRequest};

    #[test]
    fn summary_tracks_outstanding_type_changes() {
        let mut changes = Changes::default();
        assert_eq!(changes.summary().status, ValidateStatus::NoChanges);

        changes.add_type_change(LayerId(4), CompositionType::Client);
        changes.add_layer_request(LayerId(4), LayerRequest::ClearClientTarget);
        let summary = changes.summary();
        assert_eq!(summary.status, ValidateStatus::HasChanges);
        assert_eq!(summary.num_type_changes, 1);
        assert_eq!(summary.num_layer_requests, 1);

        let taken = changes.take_type_changes();
        assert_eq!(taken, [(LayerId(4), CompositionType::Client)]);
        assert_eq!(changes.summary().status, ValidateStatus::NoChanges);
        assert_eq!(changes.layer_requests().len(), 1, "requests survive accept");
    }
}
