// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Translation between the display's layer set and the backend's flat list.

use log::{error, trace};

use super::{Changes, DisplayId, DisplayInner, ValidateSummary};
use crate::backend::{BackendComposition, BackendFrame, BackendLayer, CommitResult, PrepareDecision};
use crate::error::{Error, Result};
use crate::fence::Fence;
use crate::layer::{CompositionType, Layer, LayerId, LayerRequest};

/// The list sent to the backend on prepare, with the decided composition
/// written back into each slot. `slots[i]` is the layer at slot `i`; the
/// framebuffer target has no entry.
#[derive(Clone, Debug)]
pub(super) struct PreparedFrame {
    pub(super) frame: BackendFrame,
    pub(super) slots: Vec<LayerId>,
}

/// Maps a layer's pending type to what the backend is asked to do.
///
/// Returns the requested composition and the skip flag. The legacy backend
/// cannot compose client, solid-color or unspecified layers, so those are
/// handed over as skipped framebuffer layers; device and cursor layers are
/// offered as framebuffer layers the backend may promote to a plane.
fn requested_composition(layer: &Layer) -> (BackendComposition, bool) {
    if layer.is_unsupported() {
        return (BackendComposition::Framebuffer, true);
    }
    match layer.pending_composition() {
        CompositionType::Client | CompositionType::SolidColor | CompositionType::Invalid => {
            (BackendComposition::Framebuffer, true)
        }
        CompositionType::Device | CompositionType::Cursor => (BackendComposition::Framebuffer, false),
        CompositionType::Sideband => (BackendComposition::Sideband, false),
    }
}

fn backend_layer(layer: &Layer) -> BackendLayer {
    let (composition, skip) = requested_composition(layer);
    let geometry = layer.geometry();
    BackendLayer {
        composition,
        skip,
        buffer: layer.buffer().buffer(),
        acquire_fence: layer.buffer().fence().dup(),
        display_frame: geometry.display_frame,
        source_crop: geometry.source_crop,
        plane_alpha: geometry.plane_alpha,
        blend: geometry.blend,
        transform: geometry.transform,
        color: geometry.color,
        surface_damage: layer.surface_damage().to_vec(),
    }
}

impl DisplayInner {
    /// Builds the prepare list from pending layer state.
    pub(super) fn build_prepare_frame(&self) -> Result<PreparedFrame> {
        let config = self.active_config().ok_or(Error::BadDisplay)?;

        let mut layers = Vec::with_capacity(self.order.len() + 1);
        let mut slots = Vec::with_capacity(self.order.len());
        for id in self.order.iter() {
            if let Some(layer) = self.layers.get(&id) {
                layers.push(backend_layer(layer));
                slots.push(id);
            }
        }
        layers.push(BackendLayer::framebuffer_target(config.width(), config.height()));

        let geometry_changed = self.needs_full_resend
            || self.dirty_layers > 0
            || self.prepared_layer_count != Some(slots.len());

        Ok(PreparedFrame {
            frame: BackendFrame {
                layers,
                geometry_changed,
                output_buffer: self.output_buffer.buffer(),
            },
            slots,
        })
    }

    /// Latches composition types and turns the backend's decisions into a
    /// [`Changes`] record.
    pub(super) fn apply_decisions(
        &mut self,
        display: DisplayId,
        mut prepared: PreparedFrame,
        decisions: &[PrepareDecision],
    ) -> Result<ValidateSummary> {
        if decisions.len() != prepared.frame.layers.len() {
            error!(
                "{display:?}: backend returned {} decisions for {} slots",
                decisions.len(),
                prepared.frame.layers.len()
            );
            return Err(Error::NoResources);
        }

        for id in &prepared.slots {
            if let Some(layer) = self.layers.get_mut(id)
                && !layer.is_unsupported()
            {
                layer.latch_composition().apply_to(&mut self.dirty_layers);
            }
        }

        let mut changes = Changes::default();
        for (slot, decision) in decisions.iter().enumerate() {
            let Some(&id) = prepared.slots.get(slot) else {
                if decision.composition != BackendComposition::FramebufferTarget {
                    error!("{display:?}: target slot {slot} came back as {:?}", decision.composition);
                }
                continue;
            };
            let Some(layer) = self.layers.get(&id) else {
                continue;
            };
            record_decision(&mut changes, display, layer, decision);
            prepared.frame.layers[slot].composition = decision.composition;
        }

        self.needs_full_resend = false;
        self.prepared_layer_count = Some(prepared.slots.len());
        let summary = changes.summary();
        for (id, ty) in changes.type_changes() {
            trace!("{display:?}: {id:?} --> {ty}");
        }
        self.changes = Some(changes);
        self.prepared = Some(prepared);
        Ok(summary)
    }

    /// Builds the commit list from the retained prepare list.
    pub(super) fn build_commit_frame(&self, display: DisplayId) -> Result<BackendFrame> {
        let prepared = self.prepared.as_ref().ok_or(Error::NotValidated)?;
        let mut frame = prepared.frame.clone();

        let mut needs_client_target = false;
        for (slot, id) in prepared.slots.iter().enumerate() {
            let (Some(entry), Some(layer)) = (frame.layers.get_mut(slot), self.layers.get(id)) else {
                continue;
            };
            entry.display_frame = layer.geometry().display_frame;
            if entry.composition == BackendComposition::Framebuffer {
                // The backend never reads client-composed buffers.
                entry.acquire_fence = Fence::signaled();
                needs_client_target = true;
            }
        }

        if needs_client_target && self.require_client_target && self.client_target.buffer().is_none() {
            error!("{display:?}: present with client-composed layers but no client target");
            return Err(Error::BadDisplay);
        }

        match frame.layers.last_mut() {
            Some(target) if target.composition == BackendComposition::FramebufferTarget => {
                target.buffer = self.client_target.buffer();
                target.acquire_fence = self.client_target.fence().dup();
                target.surface_damage.clone_from(&self.client_target_damage);
            }
            _ => error!("{display:?}: last slot is not the framebuffer target"),
        }
        frame.output_buffer = self.output_buffer.buffer();
        Ok(frame)
    }

    /// Hands release fences to layers and records the retire fence.
    pub(super) fn distribute_fences(&mut self, result: CommitResult) -> Fence {
        if let Some(prepared) = &self.prepared {
            for (slot, fence) in result.release_fences.into_iter().enumerate() {
                // The framebuffer target's release fence has no consumer.
                if let Some(layer) = prepared.slots.get(slot).and_then(|id| self.layers.get_mut(id)) {
                    layer.push_release_fence(fence);
                }
            }
        }
        self.retire_fence = result.retire_fence.dup();
        self.frames_presented += 1;
        result.retire_fence
    }
}

fn record_decision(changes: &mut Changes, display: DisplayId, layer: &Layer, decision: &PrepareDecision) {
    let id = layer.id();
    let committed = layer.committed_composition();
    match decision.composition {
        BackendComposition::Framebuffer => {
            if committed != CompositionType::Client {
                changes.add_type_change(id, CompositionType::Client);
            }
        }
        BackendComposition::Overlay => {
            if committed != CompositionType::Device {
                changes.add_type_change(id, CompositionType::Device);
            }
        }
        BackendComposition::Background => {
            if committed != CompositionType::SolidColor {
                error!("{display:?}: {id:?} put on background but committed as {committed}");
            }
        }
        BackendComposition::Sideband => {
            if committed != CompositionType::Sideband {
                error!("{display:?}: {id:?} put on sideband but committed as {committed}");
            }
        }
        BackendComposition::CursorOverlay => {
            if committed != CompositionType::Cursor {
                error!("{display:?}: {id:?} put on cursor plane but committed as {committed}");
            }
        }
        BackendComposition::FramebufferTarget => {
            error!("{display:?}: {id:?} came back as the framebuffer target");
        }
    }
    if decision.clear_client_target {
        changes.add_layer_request(id, LayerRequest::ClearClientTarget);
    }
}
