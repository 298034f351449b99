// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A scripted prepare/commit backend for exercising displays without
//! hardware.
//!
//! [`ScriptedBackend`] implements [`BackendCompositor`] and is moved into a
//! [`Device`](hwcompat_core::device::Device) or passed to a
//! [`Display`](hwcompat_core::display::Display). The paired [`ScriptHandle`]
//! stays with the test: it records every frame the backend sees and steers
//! what the backend answers.
//!
//! By default the backend accepts each slot as requested: skipped layers stay
//! in the framebuffer, unskipped framebuffer layers are promoted to overlays,
//! and sideband layers stay on sideband. Overrides apply per slot or per
//! buffer handle, slot overrides winning.
//!
//! Commits hand out pending fences. The handle keeps their signals so a test
//! decides when a frame retires; [`ScriptHandle::set_auto_signal`] makes the
//! backend signal them immediately instead.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use core::time::Duration;

use hwcompat_core::backend::{
    BackendComposition, BackendCompositor, BackendConfig, BackendFrame, CommitResult,
    PrepareDecision,
};
use hwcompat_core::buffer::BufferHandle;
use hwcompat_core::display::PowerMode;
use hwcompat_core::error::BackendError;
use hwcompat_core::fence::{Fence, FenceSignal};
use log::debug;
use parking_lot::Mutex;

/// A 60 Hz config of the given size at 160 DPI.
#[must_use]
pub fn standard_config(width: u32, height: u32) -> BackendConfig {
    BackendConfig {
        width,
        height,
        vsync_period: Duration::from_nanos(16_666_666),
        dpi_x_milli: 160_000,
        dpi_y_milli: 160_000,
    }
}

#[derive(Default)]
struct Script {
    configs: Vec<BackendConfig>,
    forced_slots: HashMap<usize, BackendComposition>,
    forced_buffers: HashMap<BufferHandle, BackendComposition>,
    clear_slots: HashSet<usize>,
    fail_prepare: bool,
    fail_commit: bool,
    short_release: bool,
    auto_signal: bool,
    prepared: Vec<BackendFrame>,
    committed: Vec<BackendFrame>,
    signals: Vec<FenceSignal>,
    active_config: Option<usize>,
    power_mode: Option<PowerMode>,
}

impl Script {
    fn decide(&self, slot: usize, frame: &BackendFrame) -> PrepareDecision {
        let layer = &frame.layers[slot];
        let composition = self
            .forced_slots
            .get(&slot)
            .or_else(|| layer.buffer.and_then(|b| self.forced_buffers.get(&b)))
            .copied()
            .unwrap_or(match layer.composition {
                BackendComposition::Framebuffer if !layer.skip => BackendComposition::Overlay,
                other => other,
            });
        PrepareDecision {
            composition,
            clear_client_target: self.clear_slots.contains(&slot),
        }
    }

    fn issue_fence(&mut self) -> Fence {
        let (fence, signal) = Fence::pending();
        if self.auto_signal {
            signal.signal();
        } else {
            self.signals.push(signal);
        }
        fence
    }
}

/// The backend half of a scripted pair.
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl core::fmt::Debug for ScriptedBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScriptedBackend").finish_non_exhaustive()
    }
}

impl ScriptedBackend {
    /// Creates a backend exposing `configs`, and the handle that steers it.
    #[must_use]
    pub fn new(configs: Vec<BackendConfig>) -> (Self, ScriptHandle) {
        let script = Arc::new(Mutex::new(Script {
            configs,
            ..Script::default()
        }));
        (
            Self {
                script: Arc::clone(&script),
            },
            ScriptHandle { script },
        )
    }

    /// Creates a backend with one [`standard_config`].
    #[must_use]
    pub fn single(width: u32, height: u32) -> (Self, ScriptHandle) {
        Self::new(vec![standard_config(width, height)])
    }
}

impl BackendCompositor for ScriptedBackend {
    fn display_configs(&mut self) -> Result<Vec<BackendConfig>, BackendError> {
        Ok(self.script.lock().configs.clone())
    }

    fn prepare(&mut self, frame: &BackendFrame) -> Result<Vec<PrepareDecision>, BackendError> {
        let mut script = self.script.lock();
        script.prepared.push(frame.clone());
        if script.fail_prepare {
            script.fail_prepare = false;
            return Err(BackendError::Rejected(String::from("scripted prepare failure")));
        }
        let decisions: Vec<_> = (0..frame.layers.len())
            .map(|slot| script.decide(slot, frame))
            .collect();
        debug!("scripted prepare: {} slot(s)", decisions.len());
        Ok(decisions)
    }

    fn commit(&mut self, frame: &BackendFrame) -> Result<CommitResult, BackendError> {
        let mut script = self.script.lock();
        script.committed.push(frame.clone());
        if script.fail_commit {
            script.fail_commit = false;
            return Err(BackendError::DeviceLost);
        }
        let count = if script.short_release {
            frame.layers.len().saturating_sub(1)
        } else {
            frame.layers.len()
        };
        let retire_fence = script.issue_fence();
        let release_fences = (0..count).map(|_| script.issue_fence()).collect();
        debug!("scripted commit: {} slot(s)", frame.layers.len());
        Ok(CommitResult {
            retire_fence,
            release_fences,
        })
    }

    fn set_active_config(&mut self, index: usize) -> Result<(), BackendError> {
        let mut script = self.script.lock();
        if index >= script.configs.len() {
            return Err(BackendError::Rejected(format!("no config {index}")));
        }
        script.active_config = Some(index);
        Ok(())
    }

    fn set_power_mode(&mut self, mode: PowerMode) -> Result<(), BackendError> {
        self.script.lock().power_mode = Some(mode);
        Ok(())
    }
}

/// The test half of a scripted pair.
#[derive(Clone)]
pub struct ScriptHandle {
    script: Arc<Mutex<Script>>,
}

impl core::fmt::Debug for ScriptHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScriptHandle")
            .field("prepare_count", &self.prepare_count())
            .field("commit_count", &self.commit_count())
            .finish_non_exhaustive()
    }
}

impl ScriptHandle {
    // -- Steering -----------------------------------------------------------

    /// Answers `composition` for `slot` on every later prepare.
    pub fn force_slot(&self, slot: usize, composition: BackendComposition) {
        self.script.lock().forced_slots.insert(slot, composition);
    }

    /// Answers `composition` for any slot showing `buffer`.
    pub fn force_buffer(&self, buffer: BufferHandle, composition: BackendComposition) {
        self.script.lock().forced_buffers.insert(buffer, composition);
    }

    /// Asks the client to clear the target under `slot` on later prepares.
    pub fn request_clear(&self, slot: usize) {
        self.script.lock().clear_slots.insert(slot);
    }

    /// Drops every override and clear request.
    pub fn reset_overrides(&self) {
        let mut script = self.script.lock();
        script.forced_slots.clear();
        script.forced_buffers.clear();
        script.clear_slots.clear();
    }

    /// Makes the next prepare fail.
    pub fn fail_next_prepare(&self) {
        self.script.lock().fail_prepare = true;
    }

    /// Makes the next commit fail.
    pub fn fail_next_commit(&self) {
        self.script.lock().fail_commit = true;
    }

    /// Makes commits return one release fence too few.
    pub fn set_short_release(&self, short: bool) {
        self.script.lock().short_release = short;
    }

    /// Signals fences as soon as they are handed out.
    pub fn set_auto_signal(&self, auto: bool) {
        self.script.lock().auto_signal = auto;
    }

    /// Signals every outstanding fence and returns how many there were.
    pub fn signal_all(&self) -> usize {
        let signals = core::mem::take(&mut self.script.lock().signals);
        let count = signals.len();
        for signal in signals {
            signal.signal();
        }
        count
    }

    /// Drops every outstanding signal, abandoning its fence.
    pub fn abandon_all(&self) -> usize {
        let signals = core::mem::take(&mut self.script.lock().signals);
        signals.len()
    }

    // -- Observation --------------------------------------------------------

    /// Returns how many prepares the backend has seen.
    #[must_use]
    pub fn prepare_count(&self) -> usize {
        self.script.lock().prepared.len()
    }

    /// Returns how many commits the backend has seen.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.script.lock().committed.len()
    }

    /// Returns the most recently prepared frame.
    #[must_use]
    pub fn last_prepared(&self) -> Option<BackendFrame> {
        self.script.lock().prepared.last().cloned()
    }

    /// Returns the most recently committed frame.
    #[must_use]
    pub fn last_committed(&self) -> Option<BackendFrame> {
        self.script.lock().committed.last().cloned()
    }

    /// Returns how many handed-out fences are still unsignaled.
    #[must_use]
    pub fn outstanding_fences(&self) -> usize {
        self.script.lock().signals.len()
    }

    /// Returns the backend index of the last config switched to.
    #[must_use]
    pub fn active_config(&self) -> Option<usize> {
        self.script.lock().active_config
    }

    /// Returns the last power mode applied.
    #[must_use]
    pub fn power_mode(&self) -> Option<PowerMode> {
        self.script.lock().power_mode
    }
}

#[cfg(test)]
mod tests {
    use hwcompat_core::backend::{BackendComposition, BackendCompositor, BackendFrame, BackendLayer};
    use hwcompat_core::buffer::BufferHandle;
    use hwcompat_core::error::BackendError;

    use super::ScriptedBackend;

    fn frame() -> BackendFrame {
        let mut client = BackendLayer::framebuffer_target(10, 10);
        client.composition = BackendComposition::Framebuffer;
        client.skip = true;
        let mut device = client.clone();
        device.skip = false;
        device.buffer = Some(BufferHandle(7));
        BackendFrame {
            layers: vec![client, device, BackendLayer::framebuffer_target(10, 10)],
            geometry_changed: true,
            output_buffer: None,
        }
    }

    #[test]
    fn default_policy_keeps_requests() {
        let (mut backend, handle) = ScriptedBackend::single(10, 10);
        let decisions = backend.prepare(&frame()).expect("prepare");
        let kinds: Vec<_> = decisions.iter().map(|d| d.composition).collect();
        assert_eq!(
            kinds,
            [
                BackendComposition::Framebuffer,
                BackendComposition::Overlay,
                BackendComposition::FramebufferTarget,
            ]
        );
        assert_eq!(handle.prepare_count(), 1);
    }

    #[test]
    fn slot_override_beats_buffer_override() {
        let (mut backend, handle) = ScriptedBackend::single(10, 10);
        handle.force_buffer(BufferHandle(7), BackendComposition::Framebuffer);
        let decisions = backend.prepare(&frame()).expect("prepare");
        assert_eq!(decisions[1].composition, BackendComposition::Framebuffer);

        handle.force_slot(1, BackendComposition::CursorOverlay);
        handle.request_clear(1);
        let decisions = backend.prepare(&frame()).expect("prepare");
        assert_eq!(decisions[1].composition, BackendComposition::CursorOverlay);
        assert!(decisions[1].clear_client_target, "clear requested");
    }

    #[test]
    fn commit_hands_out_pending_fences() {
        let (mut backend, handle) = ScriptedBackend::single(10, 10);
        let result = backend.commit(&frame()).expect("commit");
        assert_eq!(result.release_fences.len(), 3);
        assert!(!result.retire_fence.is_signaled(), "held until signaled");
        assert_eq!(handle.outstanding_fences(), 4);
        assert_eq!(handle.signal_all(), 4);
        assert!(result.retire_fence.is_signaled());
    }

    #[test]
    fn failures_are_one_shot() {
        let (mut backend, handle) = ScriptedBackend::single(10, 10);
        handle.fail_next_prepare();
        assert!(matches!(backend.prepare(&frame()), Err(BackendError::Rejected(_))));
        assert!(backend.prepare(&frame()).is_ok(), "second prepare succeeds");
        handle.fail_next_commit();
        assert!(matches!(backend.commit(&frame()), Err(BackendError::DeviceLost)));
        assert!(backend.commit(&frame()).is_ok(), "second commit succeeds");
    }
}
