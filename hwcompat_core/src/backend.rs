// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend contract for legacy compositors.
//!
//! A legacy compositor only knows a synchronous, single-shot protocol over a
//! flat layer list:
//!
//! - **prepare**: given the list, decide per entry which engine composes it.
//! - **commit**: given the same list with buffers and fences filled in, put
//!   it on screen and hand back a retire fence plus one release fence per
//!   entry.
//!
//! The adapter is the only component that builds that list. It always holds
//! the display's layers back to front followed by exactly one
//! [`BackendComposition::FramebufferTarget`] entry carrying the client target:
//!
//! ```text
//!   slot 0 .. n-1   layers in Z order (z ascending, creation order on ties)
//!   slot n          framebuffer target (client-composed output)
//! ```
//!
//! Responses are interpreted by slot index, so a backend must return exactly
//! one decision and one release fence per slot.
//!
//! # Frame loop pseudocode
//!
//! ```rust,ignore
//! let decisions = backend.prepare(&frame)?;   // during validate
//! // ...caller accepts type changes, renders client layers into the target...
//! let result = backend.commit(&frame)?;       // during present
//! retire = result.retire_fence;
//! for (slot, fence) in result.release_fences.into_iter().enumerate() { ... }
//! ```

use core::time::Duration;

use kurbo::Rect;

use crate::buffer::BufferHandle;
use crate::display::PowerMode;
use crate::error::BackendError;
use crate::fence::Fence;
use crate::layer::{BlendMode, Color, Transform};

/// Composition decided (or requested) for one slot of the backend list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendComposition {
    /// Composed by the client into the framebuffer target.
    Framebuffer,
    /// Scanned out directly from an overlay plane.
    Overlay,
    /// Solid background fill.
    Background,
    /// The client-composed output; always the last slot.
    FramebufferTarget,
    /// A sideband stream.
    Sideband,
    /// A hardware cursor plane.
    CursorOverlay,
}

/// One entry of the flat backend layer list.
#[derive(Clone, Debug)]
pub struct BackendLayer {
    /// Requested composition on prepare, decided composition on commit.
    pub composition: BackendComposition,
    /// The backend must not compose this layer itself.
    pub skip: bool,
    /// Content buffer.
    pub buffer: Option<BufferHandle>,
    /// Fence the backend must wait on before reading `buffer`.
    pub acquire_fence: Fence,
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
    /// Fill color for background entries.
    pub color: Color,
    /// Damaged regions since the last frame.
    pub surface_damage: Vec<Rect>,
}

impl BackendLayer {
    /// Builds the framebuffer-target entry covering a `width` by `height`
    /// display.
    #[must_use]
    pub fn framebuffer_target(width: u32, height: u32) -> Self {
        let full = Rect::new(0.0, 0.0, f64::from(width), f64::from(height));
        Self {
            composition: BackendComposition::FramebufferTarget,
            skip: false,
            buffer: None,
            acquire_fence: Fence::signaled(),
            display_frame: full,
            source_crop: full,
            plane_alpha: 1.0,
            blend: BlendMode::Premultiplied,
            transform: Transform::Identity,
            color: Color::default(),
            surface_damage: Vec::new(),
        }
    }
}

/// The flat layer list handed to [`BackendCompositor::prepare`] and
/// [`BackendCompositor::commit`].
#[derive(Clone, Debug, Default)]
pub struct BackendFrame {
    /// Layers back to front, followed by the framebuffer target.
    pub layers: Vec<BackendLayer>,
    /// Set when the list's shape or any layer's composition changed since
    /// the previous prepare.
    pub geometry_changed: bool,
    /// Output buffer for displays that write back their composition.
    pub output_buffer: Option<BufferHandle>,
}

impl BackendFrame {
    /// Returns the framebuffer-target entry, if the frame has one.
    #[must_use]
    pub fn framebuffer_target(&self) -> Option<&BackendLayer> {
        self.layers
            .last()
            .filter(|layer| layer.composition == BackendComposition::FramebufferTarget)
    }

    /// Returns the number of non-target entries.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }
}

/// The backend's verdict for one slot after prepare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PrepareDecision {
    /// Composition the backend will use for this slot.
    pub composition: BackendComposition,
    /// The client must clear this layer's area of the client target.
    pub clear_client_target: bool,
}

impl PrepareDecision {
    /// A decision with no clear hint.
    #[must_use]
    pub const fn new(composition: BackendComposition) -> Self {
        Self {
            composition,
            clear_client_target: false,
        }
    }
}

/// Fences produced by a commit.
#[derive(Clone, Debug, Default)]
pub struct CommitResult {
    /// Signals when the whole frame has been retired from the screen.
    pub retire_fence: Fence,
    /// One fence per slot, in slot order.
    pub release_fences: Vec<Fence>,
}

/// A display configuration as reported by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BackendConfig {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Refresh period.
    pub vsync_period: Duration,
    /// Horizontal density in dots per thousand inches.
    pub dpi_x_milli: u32,
    /// Vertical density in dots per thousand inches.
    pub dpi_y_milli: u32,
}

/// A synchronous prepare/commit compositor.
///
/// Implemented by the legacy hardware path in production and by scripted
/// doubles in tests. Calls are serialized by the adapter.
pub trait BackendCompositor: Send {
    /// Returns every configuration the backend exposes, by backend index.
    fn display_configs(&mut self) -> Result<Vec<BackendConfig>, BackendError>;

    /// Decides a composition for every slot of `frame`.
    fn prepare(&mut self, frame: &BackendFrame) -> Result<Vec<PrepareDecision>, BackendError>;

    /// Presents `frame` and returns its fences.
    fn commit(&mut self, frame: &BackendFrame) -> Result<CommitResult, BackendError>;

    /// Switches to the configuration at `index` of
    /// [`display_configs`](Self::display_configs).
    fn set_active_config(&mut self, index: usize) -> Result<(), BackendError> {
        _ = index;
        Ok(())
    }

    /// Applies a display power mode.
    fn set_power_mode(&mut self, mode: PowerMode) -> Result<(), BackendError> {
        _ = mode;
        Ok(())
    }
}
