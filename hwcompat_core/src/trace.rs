// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing hooks for protocol activity.
//!
//! [`TraceSink`] has one method per event; every method defaults to a no-op,
//! so a sink only implements what it cares about. The device emits events
//! after releasing its display and backend locks, so a sink may be slow
//! without stalling other protocol calls on the display.

use crate::display::{DisplayId, ValidateStatus};
use crate::layer::LayerId;
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted after a successful validation.
#[derive(Clone, Copy, Debug)]
pub struct ValidateEvent {
    /// Display that was validated.
    pub display: DisplayId,
    /// Host time when validation finished.
    pub timestamp: HostTime,
    /// Number of type overrides.
    pub num_type_changes: u32,
    /// Number of layer requests.
    pub num_layer_requests: u32,
    /// Resulting status.
    pub status: ValidateStatus,
}

/// Emitted after type changes are accepted.
#[derive(Clone, Copy, Debug)]
pub struct AcceptEvent {
    /// Display whose changes were accepted.
    pub display: DisplayId,
    /// Host time of the call.
    pub timestamp: HostTime,
}

/// Emitted after a successful present.
#[derive(Clone, Copy, Debug)]
pub struct PresentEvent {
    /// Display that was presented.
    pub display: DisplayId,
    /// Host time when the commit returned.
    pub timestamp: HostTime,
    /// Number of frames presented so far, including this one.
    pub frame_index: u64,
    /// Diagnostic id of the returned retire fence, if it has a primitive.
    pub retire_fence: Option<u64>,
}

/// Emitted for each vsync tick handed to the callback.
#[derive(Clone, Copy, Debug)]
pub struct VsyncEvent {
    /// Display the tick belongs to.
    pub display: DisplayId,
    /// Deadline of the tick.
    pub deadline: HostTime,
    /// Whether the tick was held back until a callback registered.
    pub buffered: bool,
}

/// What happened to a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerEventKind {
    /// The layer was created.
    Created,
    /// The layer was destroyed.
    Destroyed,
    /// The layer moved to a new Z key.
    ZChanged(u32),
}

/// Emitted for layer lifecycle and ordering changes.
#[derive(Clone, Copy, Debug)]
pub struct LayerEvent {
    /// Owning display.
    pub display: DisplayId,
    /// Affected layer.
    pub layer: LayerId,
    /// What happened.
    pub kind: LayerEventKind,
    /// Host time of the change.
    pub timestamp: HostTime,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives protocol trace events.
pub trait TraceSink {
    /// Called after a successful validation.
    fn on_validate(&mut self, e: &ValidateEvent) {
        _ = e;
    }

    /// Called after type changes are accepted.
    fn on_accept(&mut self, e: &AcceptEvent) {
        _ = e;
    }

    /// Called after a successful present.
    fn on_present(&mut self, e: &PresentEvent) {
        _ = e;
    }

    /// Called for each delivered vsync tick.
    fn on_vsync(&mut self, e: &VsyncEvent) {
        _ = e;
    }

    /// Called for layer lifecycle and ordering changes.
    fn on_layer(&mut self, e: &LayerEvent) {
        _ = e;
    }
}

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}
