// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The display state machine.
//!
//! A [`Display`] owns a Z-ordered set of layers and negotiates each frame
//! with the backend in three phases:
//!
//! ```text
//!   Modified ──validate()──► ValidatedNoChanges ──present()──► ValidatedNoChanges
//!       │                          ▲
//!       └──validate()──► ValidatedWithChanges ──accept_changes()──┘
//!
//!   any validated state ──create/destroy layer, Z change, buffer, type──► Modified
//! ```
//!
//! The state is not stored separately: it is derived from the `Changes`
//! record that exists only between a successful validation and the next
//! mutation. `validate` builds the backend's flat list from *pending* layer
//! state, latches composition types once the backend has answered, and keeps
//! the answered list so that `present` commits exactly what was validated.
//!
//! # Locking
//!
//! All state sits behind one reentrant mutex per display. The backend is
//! called with that mutex held (so concurrent protocol calls on the display
//! linearize around a validate or present) but with no interior borrow
//! outstanding, so a backend calling back into read-only display queries on
//! the same thread does not deadlock. Fences are never waited on under the
//! lock.

mod changes;
mod config;
mod frame;

pub use changes::{ValidateStatus, ValidateSummary};
pub use config::{Attribute, ColorMode, ConfigId, DisplayConfig, DisplayType, PowerMode, coalesce};

use core::cell::RefCell;
use core::fmt::{self, Write as _};
use core::sync::atomic::AtomicU64;
use std::collections::HashMap;

use kurbo::{Point, Rect};
use log::{debug, trace};
use parking_lot::ReentrantMutex;

use self::changes::Changes;
use self::frame::PreparedFrame;
use crate::backend::BackendCompositor;
use crate::buffer::{BufferHandle, FencedResource};
use crate::error::{Error, Result};
use crate::fence::Fence;
use crate::layer::{
    BlendMode, Color, CompositionType, Dataspace, Layer, LayerGeometry, LayerId, LayerInfo, LayerRequest,
    PixelFormat, Transform, ZOrder, next_id,
};

static NEXT_DISPLAY_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique display identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayId(pub u64);

impl DisplayId {
    fn allocate() -> Option<Self> {
        next_id(&NEXT_DISPLAY_ID).map(Self)
    }
}

impl fmt::Debug for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DisplayId({})", self.0)
    }
}

/// Protocol state of a display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisplayState {
    /// Something changed since the last validation.
    Modified,
    /// Validated; the frame may be presented.
    ValidatedNoChanges,
    /// Validated, but the backend overrode layer types that the caller has
    /// not accepted yet.
    ValidatedWithChanges,
}

/// Construction options for a [`Display`].
#[derive(Clone, Debug)]
pub struct DisplayOptions {
    /// Name reported to callers.
    pub name: String,
    /// Present fails with [`Error::BadDisplay`] when client-composed layers
    /// exist and no client target buffer is set.
    pub require_client_target: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            name: String::from("hwcompat-0"),
            require_client_target: true,
        }
    }
}

struct DisplayInner {
    name: String,
    configs: Vec<DisplayConfig>,
    active_config: Option<ConfigId>,
    power_mode: PowerMode,
    color_mode: ColorMode,

    layers: HashMap<LayerId, Layer>,
    order: ZOrder,
    /// Number of layers whose composition type is dirty.
    dirty_layers: usize,
    /// Set by anything that changes the list's shape or geometry.
    needs_full_resend: bool,
    prepared_layer_count: Option<usize>,

    client_target: FencedResource,
    client_target_dataspace: Dataspace,
    client_target_damage: Vec<Rect>,
    output_buffer: FencedResource,
    require_client_target: bool,

    changes: Option<Changes>,
    prepared: Option<PreparedFrame>,
    retire_fence: Fence,
    frames_presented: u64,
}

impl DisplayInner {
    fn active_config(&self) -> Option<&DisplayConfig> {
        let id = self.active_config?;
        self.configs.iter().find(|c| c.id() == id)
    }

    fn state(&self) -> DisplayState {
        match &self.changes {
            None => DisplayState::Modified,
            Some(changes) if changes.type_changes().is_empty() => DisplayState::ValidatedNoChanges,
            Some(_) => DisplayState::ValidatedWithChanges,
        }
    }

    fn mark_modified(&mut self, display: DisplayId, reason: &str) {
        if self.changes.take().is_some() {
            debug!("{display:?}: {reason}, back to Modified");
        }
        self.prepared = None;
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.layers.get_mut(&id).ok_or(Error::BadLayer)
    }
}

/// A physical display driven through the validate/accept/present protocol.
pub struct Display {
    id: DisplayId,
    state: ReentrantMutex<RefCell<DisplayInner>>,
}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Display {
    /// Creates a display with the given logical configs; the first becomes
    /// active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoResources`] once the display id space is exhausted.
    pub fn new(configs: Vec<DisplayConfig>, options: DisplayOptions) -> Result<Self> {
        let id = DisplayId::allocate().ok_or(Error::NoResources)?;
        let active_config = configs.first().map(DisplayConfig::id);
        debug!("{id:?}: created with {} config(s)", configs.len());
        Ok(Self {
            id,
            state: ReentrantMutex::new(RefCell::new(DisplayInner {
                name: options.name,
                configs,
                active_config,
                power_mode: PowerMode::On,
                color_mode: ColorMode::Native,
                layers: HashMap::new(),
                order: ZOrder::default(),
                dirty_layers: 0,
                needs_full_resend: true,
                prepared_layer_count: None,
                client_target: FencedResource::empty(),
                client_target_dataspace: Dataspace::UNKNOWN,
                client_target_damage: Vec::new(),
                output_buffer: FencedResource::empty(),
                require_client_target: options.require_client_target,
                changes: None,
                prepared: None,
                retire_fence: Fence::signaled(),
                frames_presented: 0,
            })),
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut DisplayInner) -> R) -> R {
        let guard = self.state.lock();
        let mut inner = guard.borrow_mut();
        f(&mut inner)
    }

    fn read<R>(&self, f: impl FnOnce(&DisplayInner) -> R) -> R {
        let guard = self.state.lock();
        let inner = guard.borrow();
        f(&inner)
    }

    /// Returns the display id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> DisplayId {
        self.id
    }

    /// Returns the current protocol state.
    #[must_use]
    pub fn state(&self) -> DisplayState {
        self.read(DisplayInner::state)
    }

    // -- Layers -----------------------------------------------------------

    /// Creates a layer at Z 0 and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoResources`] once the layer id space is exhausted.
    pub(crate) fn create_layer(&self) -> Result<LayerId> {
        let id = LayerId::allocate().ok_or(Error::NoResources)?;
        self.with(|inner| {
            inner.layers.insert(id, Layer::new(id, self.id, 0));
            inner.order.insert(0, id);
            inner.needs_full_resend = true;
            inner.mark_modified(self.id, "layer created");
        });
        debug!("{:?}: created {id:?}", self.id);
        Ok(id)
    }

    /// Destroys a layer.
    ///
    /// In-flight release fences of the layer are dropped without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub(crate) fn destroy_layer(&self, id: LayerId) -> Result<()> {
        self.with(|inner| {
            let layer = inner.layers.remove(&id).ok_or(Error::BadLayer)?;
            inner.order.remove(layer.z(), id);
            if layer.is_composition_dirty() {
                inner.dirty_layers = inner.dirty_layers.saturating_sub(1);
            }
            inner.needs_full_resend = true;
            inner.mark_modified(self.id, "layer destroyed");
            Ok::<(), Error>(())
        })?;
        debug!("{:?}: destroyed {id:?}", self.id);
        Ok(())
    }

    /// Returns `true` if `id` is a layer of this display.
    #[must_use]
    pub fn has_layer(&self, id: LayerId) -> bool {
        self.read(|inner| inner.layers.contains_key(&id))
    }

    /// Returns a snapshot of one layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub fn layer_info(&self, id: LayerId) -> Result<LayerInfo> {
        self.read(|inner| inner.layers.get(&id).map(Layer::info).ok_or(Error::BadLayer))
    }

    /// Returns the layer ids back to front.
    #[must_use]
    pub fn layers_in_z_order(&self) -> Vec<LayerId> {
        self.read(|inner| inner.order.iter().collect())
    }

    /// Returns how many layers have an uncommitted composition type.
    #[must_use]
    pub fn dirty_layer_count(&self) -> usize {
        self.read(|inner| inner.dirty_layers)
    }

    /// Moves a layer to a new Z key.
    ///
    /// Setting the current Z is a no-op and leaves the state untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub fn set_layer_z_order(&self, id: LayerId, z: u32) -> Result<()> {
        self.with(|inner| {
            let layer = inner.layer_mut(id)?;
            let old_z = layer.z();
            if old_z == z {
                return Ok(());
            }
            layer.set_z(z);
            if !inner.order.reorder(id, old_z, z) {
                return Err(Error::BadLayer);
            }
            inner.needs_full_resend = true;
            inner.mark_modified(self.id, "Z changed");
            Ok(())
        })
    }

    /// Requests a composition type for a layer.
    ///
    /// The request takes effect at the next validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub fn set_layer_composition_type(&self, id: LayerId, ty: CompositionType) -> Result<()> {
        self.with(|inner| {
            let layer = inner.layers.get_mut(&id).ok_or(Error::BadLayer)?;
            if layer.pending_composition() == ty {
                return Ok(());
            }
            layer.set_composition_type(ty).apply_to(&mut inner.dirty_layers);
            inner.mark_modified(self.id, "composition type changed");
            Ok(())
        })
    }

    /// Installs a new buffer on a layer and returns the previous buffer with
    /// its fence, which the caller now owns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub fn set_layer_buffer(
        &self,
        id: LayerId,
        buffer: Option<BufferHandle>,
        acquire_fence: Fence,
    ) -> Result<FencedResource> {
        self.with(|inner| {
            let previous = inner.layer_mut(id)?.set_buffer(buffer, acquire_fence);
            inner.mark_modified(self.id, "layer buffer changed");
            Ok(previous)
        })
    }

    /// Records the damaged regions of a layer's buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub fn set_layer_surface_damage(&self, id: LayerId, damage: Vec<Rect>) -> Result<()> {
        self.with(|inner| {
            inner.layer_mut(id)?.set_surface_damage(damage);
            Ok(())
        })
    }

    /// Sets a layer's dataspace. Anything but [`Dataspace::UNKNOWN`] forces
    /// the layer to client composition until it is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub fn set_layer_dataspace(&self, id: LayerId, dataspace: Dataspace) -> Result<()> {
        self.with(|inner| {
            if inner.layer_mut(id)?.set_dataspace(dataspace) {
                debug!(
                    "{:?}: {id:?} is now {}",
                    self.id,
                    if dataspace.is_supported() { "supported" } else { "forced to client" }
                );
                inner.needs_full_resend = true;
                inner.mark_modified(self.id, "layer support changed");
            }
            Ok(())
        })
    }

    fn update_geometry(&self, id: LayerId, update: impl FnOnce(&mut LayerGeometry)) -> Result<()> {
        self.with(|inner| {
            let geometry = inner.layer_mut(id)?.geometry_mut();
            let before = *geometry;
            update(geometry);
            if *geometry != before {
                inner.needs_full_resend = true;
                inner.mark_modified(self.id, "layer geometry changed");
            }
            Ok(())
        })
    }

    /// Sets the destination rectangle of a layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub fn set_layer_display_frame(&self, id: LayerId, frame: Rect) -> Result<()> {
        self.update_geometry(id, |g| g.display_frame = frame)
    }

    /// Sets the source rectangle of a layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub fn set_layer_source_crop(&self, id: LayerId, crop: Rect) -> Result<()> {
        self.update_geometry(id, |g| g.source_crop = crop)
    }

    /// Sets the plane alpha of a layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadParameter`] for alpha outside `0.0..=1.0`, or
    /// [`Error::BadLayer`] if the layer is not on this display.
    pub fn set_layer_plane_alpha(&self, id: LayerId, alpha: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::BadParameter);
        }
        self.update_geometry(id, |g| g.plane_alpha = alpha)
    }

    /// Sets the blend mode of a layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub fn set_layer_blend_mode(&self, id: LayerId, blend: BlendMode) -> Result<()> {
        self.update_geometry(id, |g| g.blend = blend)
    }

    /// Sets the buffer transform of a layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub fn set_layer_transform(&self, id: LayerId, transform: Transform) -> Result<()> {
        self.update_geometry(id, |g| g.transform = transform)
    }

    /// Sets the fill color of a solid-color layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub fn set_layer_color(&self, id: LayerId, color: Color) -> Result<()> {
        self.update_geometry(id, |g| g.color = color)
    }

    /// Moves a cursor layer without invalidating the display.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] unless the layer is committed as a cursor,
    /// and [`Error::NotValidated`] while type changes await acceptance.
    pub fn set_cursor_position(&self, id: LayerId, x: f64, y: f64) -> Result<()> {
        self.with(|inner| {
            if inner.state() == DisplayState::ValidatedWithChanges {
                return Err(Error::NotValidated);
            }
            let layer = inner.layer_mut(id)?;
            if layer.committed_composition() != CompositionType::Cursor {
                return Err(Error::BadLayer);
            }
            let geometry = layer.geometry_mut();
            geometry.display_frame = geometry.display_frame.with_origin(Point::new(x, y));
            Ok(())
        })
    }

    // -- Display buffers --------------------------------------------------

    /// Sets the buffer the client composed into.
    ///
    /// Does not invalidate the display.
    pub fn set_client_target(
        &self,
        buffer: Option<BufferHandle>,
        acquire_fence: Fence,
        dataspace: Dataspace,
        damage: Vec<Rect>,
    ) {
        self.with(|inner| {
            let _ = inner.client_target.replace(buffer, acquire_fence);
            inner.client_target_dataspace = dataspace;
            inner.client_target_damage = damage;
        });
    }

    /// Sets the output buffer for write-back composition.
    ///
    /// Does not invalidate the display.
    pub fn set_output_buffer(&self, buffer: Option<BufferHandle>, release_fence: Fence) {
        self.with(|inner| {
            let _ = inner.output_buffer.replace(buffer, release_fence);
        });
    }

    /// Reports whether a client target of the given shape can be used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] unless the size matches the active
    /// config, the format is RGBA8888 and the dataspace is unknown.
    pub fn client_target_support(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        dataspace: Dataspace,
    ) -> Result<()> {
        self.read(|inner| {
            let config = inner.active_config().ok_or(Error::Unsupported)?;
            if config.width() == width
                && config.height() == height
                && format == PixelFormat::Rgba8888
                && dataspace == Dataspace::UNKNOWN
            {
                Ok(())
            } else {
                Err(Error::Unsupported)
            }
        })
    }

    // -- Protocol ---------------------------------------------------------

    /// Validates the current layer set against the backend.
    ///
    /// Calling this again without an intervening mutation returns the same
    /// counts and does not call the backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] when no config is active and
    /// [`Error::NoResources`] when the backend fails; in both cases the
    /// display stays in [`DisplayState::Modified`].
    pub fn validate(&self, backend: &mut dyn BackendCompositor) -> Result<ValidateSummary> {
        let guard = self.state.lock();
        let prepared = {
            let inner = guard.borrow();
            if let Some(changes) = &inner.changes {
                trace!("{:?}: already validated", self.id);
                return Ok(changes.summary());
            }
            inner.build_prepare_frame()?
        };

        trace!("{:?}: prepare with {} slot(s)", self.id, prepared.frame.layers.len());
        let decisions = backend.prepare(&prepared.frame)?;

        let summary = guard.borrow_mut().apply_decisions(self.id, prepared, &decisions)?;
        debug!(
            "{:?}: validated, {} type change(s), {} request(s)",
            self.id, summary.num_type_changes, summary.num_layer_requests
        );
        Ok(summary)
    }

    /// Commits the backend's type overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotValidated`] from [`DisplayState::Modified`].
    pub fn accept_changes(&self) -> Result<()> {
        self.with(|inner| {
            let changes = inner.changes.as_mut().ok_or(Error::NotValidated)?;
            for (id, ty) in changes.take_type_changes() {
                if let Some(layer) = inner.layers.get_mut(&id) {
                    layer.set_composition_type(ty).apply_to(&mut inner.dirty_layers);
                    layer.latch_composition().apply_to(&mut inner.dirty_layers);
                }
            }
            Ok(())
        })
    }

    /// Returns the type overrides of the last validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotValidated`] from [`DisplayState::Modified`].
    pub fn changed_composition_types(&self) -> Result<Vec<(LayerId, CompositionType)>> {
        self.read(|inner| {
            let changes = inner.changes.as_ref().ok_or(Error::NotValidated)?;
            Ok(changes.type_changes().to_vec())
        })
    }

    /// Returns the per-layer requests of the last validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotValidated`] from [`DisplayState::Modified`].
    pub fn requests(&self) -> Result<Vec<(LayerId, LayerRequest)>> {
        self.read(|inner| {
            let changes = inner.changes.as_ref().ok_or(Error::NotValidated)?;
            Ok(changes.layer_requests().to_vec())
        })
    }

    /// Commits the validated frame and returns its retire fence.
    ///
    /// Release fences go to each layer's deferred queue. The display stays
    /// validated, so presenting again without changes re-commits the same
    /// frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotValidated`] unless the state is
    /// [`DisplayState::ValidatedNoChanges`], [`Error::BadDisplay`] when
    /// client-composed layers exist without a client target, and
    /// [`Error::NoResources`] when the backend fails.
    pub fn present(&self, backend: &mut dyn BackendCompositor) -> Result<Fence> {
        let guard = self.state.lock();
        let frame = {
            let inner = guard.borrow();
            if inner.state() != DisplayState::ValidatedNoChanges {
                debug!("{:?}: present rejected in {:?}", self.id, inner.state());
                return Err(Error::NotValidated);
            }
            inner.build_commit_frame(self.id)?
        };

        trace!("{:?}: commit with {} slot(s)", self.id, frame.layers.len());
        let result = backend.commit(&frame)?;
        if result.release_fences.len() != frame.layers.len() {
            log::error!(
                "{:?}: backend returned {} release fences for {} slots",
                self.id,
                result.release_fences.len(),
                frame.layers.len()
            );
            return Err(Error::NoResources);
        }

        let retire = guard.borrow_mut().distribute_fences(result);
        Ok(retire)
    }

    /// Returns the deferred release fence of every layer that has a real
    /// one, back to front.
    #[must_use]
    pub fn release_fences(&self) -> Vec<(LayerId, Fence)> {
        self.read(|inner| {
            inner
                .order
                .iter()
                .filter_map(|id| {
                    let fence = inner.layers.get(&id)?.release_fences().deferred();
                    (!fence.is_noop()).then(|| (id, fence.dup()))
                })
                .collect()
        })
    }

    /// Returns the release fence delivered to a layer by the latest present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadLayer`] if the layer is not on this display.
    pub fn latest_release_fence(&self, id: LayerId) -> Result<Fence> {
        self.read(|inner| {
            let layer = inner.layers.get(&id).ok_or(Error::BadLayer)?;
            Ok(layer.release_fences().latest().dup())
        })
    }

    /// Returns the retire fence of the latest present.
    #[must_use]
    pub fn retire_fence(&self) -> Fence {
        self.read(|inner| inner.retire_fence.dup())
    }

    /// Returns how many frames have been committed.
    #[must_use]
    pub fn frames_presented(&self) -> u64 {
        self.read(|inner| inner.frames_presented)
    }

    // -- Configuration ----------------------------------------------------

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> String {
        self.read(|inner| inner.name.clone())
    }

    /// Returns the display type.
    #[must_use]
    pub fn display_type(&self) -> DisplayType {
        DisplayType::Physical
    }

    /// Returns `false`: the backend has no doze support.
    #[must_use]
    pub fn supports_doze(&self) -> bool {
        false
    }

    /// Returns every logical config.
    #[must_use]
    pub fn configs(&self) -> Vec<DisplayConfig> {
        self.read(|inner| inner.configs.clone())
    }

    /// Returns the active config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadConfig`] when no config is active.
    pub fn active_config(&self) -> Result<DisplayConfig> {
        self.read(|inner| inner.active_config().cloned().ok_or(Error::BadConfig))
    }

    /// Makes `config` the active config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadConfig`] for an unknown config and
    /// [`Error::NoResources`] when the backend refuses.
    pub fn set_active_config(&self, backend: &mut dyn BackendCompositor, config: ConfigId) -> Result<()> {
        let guard = self.state.lock();
        let index = {
            let inner = guard.borrow();
            if inner.active_config == Some(config) {
                return Ok(());
            }
            let found = inner.configs.iter().find(|c| c.id() == config).ok_or(Error::BadConfig)?;
            found.backend_indices().first().copied().ok_or(Error::BadConfig)?
        };
        backend.set_active_config(index)?;

        let mut inner = guard.borrow_mut();
        inner.active_config = Some(config);
        inner.needs_full_resend = true;
        inner.mark_modified(self.id, "active config changed");
        Ok(())
    }

    /// Returns one attribute of a config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadConfig`] for an unknown config.
    pub fn attribute(&self, config: ConfigId, attribute: Attribute) -> Result<u64> {
        self.read(|inner| {
            inner
                .configs
                .iter()
                .find(|c| c.id() == config)
                .map(|c| c.attribute(attribute))
                .ok_or(Error::BadConfig)
        })
    }

    /// Returns the supported color modes.
    #[must_use]
    pub fn color_modes(&self) -> Vec<ColorMode> {
        vec![ColorMode::Native]
    }

    /// Returns the current color mode.
    #[must_use]
    pub fn color_mode(&self) -> ColorMode {
        self.read(|inner| inner.color_mode)
    }

    /// Selects a color mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for anything but [`ColorMode::Native`].
    pub fn set_color_mode(&self, mode: ColorMode) -> Result<()> {
        if mode != ColorMode::Native {
            return Err(Error::Unsupported);
        }
        self.with(|inner| inner.color_mode = mode);
        Ok(())
    }

    /// Returns the current power mode.
    #[must_use]
    pub fn power_mode(&self) -> PowerMode {
        self.read(|inner| inner.power_mode)
    }

    /// Applies a power mode through the backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoResources`] when the backend refuses.
    pub fn set_power_mode(&self, backend: &mut dyn BackendCompositor, mode: PowerMode) -> Result<()> {
        let guard = self.state.lock();
        backend.set_power_mode(mode)?;
        guard.borrow_mut().power_mode = mode;
        debug!("{:?}: power mode {mode:?}", self.id);
        Ok(())
    }

    // -- Diagnostics ------------------------------------------------------

    /// Appends a human-readable description of the display to `out`.
    pub fn dump(&self, out: &mut String) {
        self.read(|inner| {
            let _ = writeln!(out, "  Display {}: {:?} \"{}\"", self.id.0, inner.state(), inner.name);
            let _ = writeln!(
                out,
                "    power {:?}, color {:?}, {} frame(s) presented",
                inner.power_mode, inner.color_mode, inner.frames_presented
            );
            for config in &inner.configs {
                let marker = if Some(config.id()) == inner.active_config { "*" } else { " " };
                let _ = writeln!(out, "   {marker}[{}] {config}", config.id().0);
            }
            let _ = writeln!(
                out,
                "    client target {:?} {:?}, output {:?}",
                inner.client_target.buffer(),
                inner.client_target_dataspace,
                inner.output_buffer.buffer()
            );
            let _ = writeln!(out, "    {} layer(s), {} dirty:", inner.layers.len(), inner.dirty_layers);
            for id in inner.order.iter() {
                let Some(layer) = inner.layers.get(&id) else {
                    continue;
                };
                let info = layer.info();
                let _ = writeln!(
                    out,
                    "      [{}] z={} type={}/{}{} buffer={:?} frame={:?}",
                    id.0,
                    info.z,
                    info.pending_composition,
                    info.committed_composition,
                    if info.unsupported { " (forced client)" } else { "" },
                    info.buffer,
                    info.geometry.display_frame,
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::{Display, DisplayOptions, DisplayState, coalesce};
    use crate::backend::BackendConfig;
    use crate::error::Error;
    use crate::layer::{CompositionType, Dataspace, PixelFormat};

    fn display() -> Display {
        let configs = coalesce(&[BackendConfig {
            width: 800,
            height: 600,
            vsync_period: Duration::from_nanos(16_666_666),
            dpi_x_milli: 96_000,
            dpi_y_milli: 96_000,
        }]);
        Display::new(configs, DisplayOptions::default()).expect("display id available")
    }

    #[test]
    fn new_display_is_modified() {
        let display = display();
        assert_eq!(display.state(), DisplayState::Modified);
        assert!(display.active_config().is_ok(), "first config is active");
    }

    #[test]
    fn z_order_follows_keys_then_creation() {
        let display = display();
        let a = display.create_layer().expect("layer");
        let b = display.create_layer().expect("layer");
        let c = display.create_layer().expect("layer");
        display.set_layer_z_order(a, 5).expect("z");
        display.set_layer_z_order(b, 1).expect("z");
        display.set_layer_z_order(c, 1).expect("z");
        assert_eq!(display.layers_in_z_order(), [b, c, a]);
    }

    #[test]
    fn unknown_layer_is_bad_layer() {
        let display = display();
        let layer = display.create_layer().expect("layer");
        display.destroy_layer(layer).expect("destroy");
        assert_eq!(display.destroy_layer(layer), Err(Error::BadLayer));
        assert_eq!(display.set_layer_z_order(layer, 3), Err(Error::BadLayer));
        assert!(display.layer_info(layer).is_err(), "destroyed layer is gone");
    }

    #[test]
    fn queries_need_validation() {
        let display = display();
        assert_eq!(display.accept_changes(), Err(Error::NotValidated));
        assert_eq!(display.changed_composition_types(), Err(Error::NotValidated));
        assert_eq!(display.requests(), Err(Error::NotValidated));
    }

    #[test]
    fn dirty_count_tracks_net_transitions() {
        let display = display();
        let layer = display.create_layer().expect("layer");
        display.set_layer_composition_type(layer, CompositionType::Device).expect("type");
        display.set_layer_composition_type(layer, CompositionType::Client).expect("type");
        assert_eq!(display.dirty_layer_count(), 1);
        display.set_layer_composition_type(layer, CompositionType::Invalid).expect("type");
        assert_eq!(display.dirty_layer_count(), 0);

        display.set_layer_composition_type(layer, CompositionType::Cursor).expect("type");
        display.destroy_layer(layer).expect("destroy");
        assert_eq!(display.dirty_layer_count(), 0, "destroyed layer releases its count");
    }

    #[test]
    fn client_target_support_matches_active_config() {
        let display = display();
        assert_eq!(
            display.client_target_support(800, 600, PixelFormat::Rgba8888, Dataspace::UNKNOWN),
            Ok(())
        );
        assert_eq!(
            display.client_target_support(800, 601, PixelFormat::Rgba8888, Dataspace::UNKNOWN),
            Err(Error::Unsupported)
        );
        assert_eq!(
            display.client_target_support(800, 600, PixelFormat::Rgb565, Dataspace::UNKNOWN),
            Err(Error::Unsupported)
        );
    }

    #[test]
    fn plane_alpha_is_range_checked() {
        let display = display();
        let layer = display.create_layer().expect("layer");
        assert_eq!(display.set_layer_plane_alpha(layer, 1.5), Err(Error::BadParameter));
        assert_eq!(display.set_layer_plane_alpha(layer, 0.5), Ok(()));
        assert_eq!(display.layer_info(layer).expect("info").geometry.plane_alpha, 0.5);
    }

    #[test]
    fn cursor_position_requires_committed_cursor() {
        let display = display();
        let layer = display.create_layer().expect("layer");
        assert_eq!(display.set_cursor_position(layer, 1.0, 2.0), Err(Error::BadLayer));
    }

    #[test]
    fn dump_lists_layers() {
        let display = display();
        let layer = display.create_layer().expect("layer");
        let mut out = String::new();
        display.dump(&mut out);
        assert!(out.contains("800 x 600"), "config is listed: {out}");
        assert!(out.contains(&format!("[{}] z=0", layer.0)), "layer is listed: {out}");
    }
}
