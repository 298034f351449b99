// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Composable layers.
//!
//! A [`Layer`] is one surface on a display: a buffer with its acquire fence, a
//! Z key, geometry, and a composition type negotiated with the backend through
//! a [`LatchedValue`]. Layers are owned by their display and only reached
//! through it; callers observe them through [`LayerInfo`] snapshots.
//!
//! A layer whose dataspace the backend cannot honor is *unsupported*: every
//! validation forces it to client composition, whatever its pending type, for
//! as long as the dataspace stays unsupported.

mod composition;
mod id;
mod order;

pub use composition::{BlendMode, Color, CompositionType, Dataspace, LayerRequest, PixelFormat, Transform};
pub use id::LayerId;

pub(crate) use id::next_id;
pub(crate) use order::ZOrder;

use kurbo::Rect;

use crate::buffer::{BufferHandle, FencedResource};
use crate::display::DisplayId;
use crate::fence::{DeferredFenceQueue, Fence};
use crate::latched::{DirtyDelta, LatchedValue};

/// Positional and blending attributes copied into the backend layer list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerGeometry {
    /// Destination rectangle on the display.
    pub display_frame: Rect,
    /// Source rectangle within the buffer.
    pub source_crop: Rect,
    /// Global opacity in `0.0..=1.0`.
    pub plane_alpha: f32,
    /// Blending mode.
    pub blend: BlendMode,
    /// Buffer orientation.
    pub transform: Transform,
    /// Fill color for solid-color layers.
    pub color: Color,
}

impl Default for LayerGeometry {
    fn default() -> Self {
        Self {
            display_frame: Rect::ZERO,
            source_crop: Rect::ZERO,
            plane_alpha: 1.0,
            blend: BlendMode::default(),
            transform: Transform::default(),
            color: Color::default(),
        }
    }
}

/// Read-only snapshot of a layer's state.
#[derive(Clone, Debug)]
pub struct LayerInfo {
    /// Layer identity.
    pub id: LayerId,
    /// Owning display.
    pub display: DisplayId,
    /// Z key.
    pub z: u32,
    /// Composition type last requested by the caller.
    pub pending_composition: CompositionType,
    /// Composition type last latched.
    pub committed_composition: CompositionType,
    /// Whether the layer is forced to client composition.
    pub unsupported: bool,
    /// Current buffer, if any.
    pub buffer: Option<BufferHandle>,
    /// Current dataspace.
    pub dataspace: Dataspace,
    /// Current geometry.
    pub geometry: LayerGeometry,
    /// Number of surface-damage rectangles last supplied.
    pub damage_rects: usize,
}

pub(crate) struct Layer {
    id: LayerId,
    display: DisplayId,
    z: u32,
    composition: LatchedValue<CompositionType>,
    buffer: FencedResource,
    surface_damage: Vec<Rect>,
    dataspace: Dataspace,
    geometry: LayerGeometry,
    release_fences: DeferredFenceQueue,
}

impl Layer {
    pub(crate) fn new(id: LayerId, display: DisplayId, z: u32) -> Self {
        Self {
            id,
            display,
            z,
            composition: LatchedValue::default(),
            buffer: FencedResource::empty(),
            surface_damage: Vec::new(),
            dataspace: Dataspace::UNKNOWN,
            geometry: LayerGeometry::default(),
            release_fences: DeferredFenceQueue::new(),
        }
    }

    pub(crate) fn id(&self) -> LayerId {
        self.id
    }

    pub(crate) fn z(&self) -> u32 {
        self.z
    }

    pub(crate) fn set_z(&mut self, z: u32) {
        self.z = z;
    }

    // -- Composition ------------------------------------------------------

    pub(crate) fn set_composition_type(&mut self, ty: CompositionType) -> DirtyDelta {
        self.composition.set_pending(ty)
    }

    pub(crate) fn latch_composition(&mut self) -> DirtyDelta {
        self.composition.latch()
    }

    pub(crate) fn pending_composition(&self) -> CompositionType {
        *self.composition.pending()
    }

    pub(crate) fn committed_composition(&self) -> CompositionType {
        *self.composition.committed()
    }

    pub(crate) fn is_composition_dirty(&self) -> bool {
        self.composition.is_dirty()
    }

    pub(crate) fn is_unsupported(&self) -> bool {
        !self.dataspace.is_supported()
    }

    // -- Content ----------------------------------------------------------

    /// Installs a new buffer and returns the previous one with its fence.
    pub(crate) fn set_buffer(&mut self, buffer: Option<BufferHandle>, acquire: Fence) -> FencedResource {
        self.buffer.replace(buffer, acquire)
    }

    pub(crate) fn buffer(&self) -> &FencedResource {
        &self.buffer
    }

    pub(crate) fn set_surface_damage(&mut self, rects: Vec<Rect>) {
        self.surface_damage = rects;
    }

    pub(crate) fn surface_damage(&self) -> &[Rect] {
        &self.surface_damage
    }

    /// Returns `true` if the supported/unsupported status changed.
    pub(crate) fn set_dataspace(&mut self, dataspace: Dataspace) -> bool {
        let was_unsupported = self.is_unsupported();
        self.dataspace = dataspace;
        was_unsupported != self.is_unsupported()
    }

    pub(crate) fn geometry(&self) -> &LayerGeometry {
        &self.geometry
    }

    pub(crate) fn geometry_mut(&mut self) -> &mut LayerGeometry {
        &mut self.geometry
    }

    // -- Fences -----------------------------------------------------------

    pub(crate) fn push_release_fence(&mut self, fence: Fence) {
        let _ = self.release_fences.push(fence);
    }

    pub(crate) fn release_fences(&self) -> &DeferredFenceQueue {
        &self.release_fences
    }

    pub(crate) fn info(&self) -> LayerInfo {
        LayerInfo {
            id: self.id,
            display: self.display,
            z: self.z,
            pending_composition: self.pending_composition(),
            committed_composition: self.committed_composition(),
            unsupported: self.is_unsupported(),
            buffer: self.buffer.buffer(),
            dataspace: self.dataspace,
            geometry: self.geometry,
            damage_rects: self.surface_damage.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CompositionType, Dataspace, Layer, LayerId};
    use crate::buffer::BufferHandle;
    use crate::display::DisplayId;
    use crate::fence::Fence;
    use crate::latched::DirtyDelta;

    fn layer() -> Layer {
        Layer::new(LayerId(1), DisplayId(1), 0)
    }

    #[test]
    fn new_layer_is_clean_and_invalid() {
        let layer = layer();
        assert_eq!(layer.committed_composition(), CompositionType::Invalid);
        assert!(!layer.is_composition_dirty(), "new layer is clean");
        assert!(!layer.is_unsupported(), "unknown dataspace is supported");
    }

    #[test]
    fn composition_type_goes_dirty_until_latched() {
        let mut layer = layer();
        assert_eq!(layer.set_composition_type(CompositionType::Device), DirtyDelta::BecameDirty);
        assert_eq!(layer.committed_composition(), CompositionType::Invalid);
        assert_eq!(layer.latch_composition(), DirtyDelta::BecameClean);
        assert_eq!(layer.committed_composition(), CompositionType::Device);
    }

    #[test]
    fn dataspace_toggles_unsupported() {
        let mut layer = layer();
        assert!(layer.set_dataspace(Dataspace(7)), "became unsupported");
        assert!(layer.is_unsupported(), "non-native dataspace");
        assert!(!layer.set_dataspace(Dataspace(8)), "still unsupported");
        assert!(layer.set_dataspace(Dataspace::UNKNOWN), "cleared");
    }

    #[test]
    fn set_buffer_returns_previous() {
        let mut layer = layer();
        let (fence, _signal) = Fence::pending();
        let first = layer.set_buffer(Some(BufferHandle(1)), fence.dup());
        assert_eq!(first.buffer(), None);

        let second = layer.set_buffer(Some(BufferHandle(2)), Fence::signaled());
        assert_eq!(second.buffer(), Some(BufferHandle(1)));
        assert!(second.fence().same_as(&fence), "acquire fence handed back");
    }

    #[test]
    fn release_fences_keep_two_frames() {
        let mut layer = layer();
        let (a, _sa) = Fence::pending();
        let (b, _sb) = Fence::pending();
        layer.push_release_fence(a.dup());
        layer.push_release_fence(b.dup());
        assert!(layer.release_fences().deferred().same_as(&a), "previous frame");
        assert!(layer.release_fences().latest().same_as(&b), "current frame");
    }
}
