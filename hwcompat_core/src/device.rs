// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device registry and callback dispatch.
//!
//! [`Device`] is the entry point for protocol calls. It resolves display and
//! layer ids, owns the backend, runs the vsync signaler, and delivers the
//! hotplug, refresh and vsync callbacks to a single registered listener.
//!
//! # Locking
//!
//! | Lock       | Guards                                        | Order |
//! |------------|-----------------------------------------------|-------|
//! | `registry` | display slot, layer→display map, callbacks   | 1     |
//! | `backend`  | the backend compositor                        | 1     |
//! | display    | per-display state (inside [`Display`])        | 2     |
//!
//! `registry` and `backend` are never held together with each other except
//! while the display is first created, and neither is held while a callback
//! runs. Callbacks are copied out, the locks are released, and only then is
//! foreign code called, so a callback may re-enter the device freely.
//!
//! Vsync ticks that arrive before a vsync callback is registered are queued.
//! Registration flushes them, oldest first, before returning. While a flush
//! is in progress new ticks keep queueing behind the flushed ones, and the
//! registering thread drains them batch by batch with no lock held.

use core::fmt;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use kurbo::Rect;
use log::{debug, info, trace, warn};
use parking_lot::Mutex;

use crate::backend::BackendCompositor;
use crate::buffer::{BufferHandle, FencedResource};
use crate::config::AdapterConfig;
use crate::display::{
    ConfigId, Display, DisplayId, DisplayOptions, PowerMode, ValidateSummary, coalesce,
};
use crate::error::{Error, Result};
use crate::fence::Fence;
use crate::layer::{CompositionType, Dataspace, LayerId};
use crate::time::{self, HostTime};
use crate::trace::{
    AcceptEvent, LayerEvent, LayerEventKind, PresentEvent, TraceSink, ValidateEvent, VsyncEvent,
};
use crate::vsync::VsyncSignaler;

/// Whether a display is attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Connection {
    /// The display is attached.
    Connected,
    /// The display went away.
    Disconnected,
}

/// Hotplug listener.
pub type HotplugFn = Arc<dyn Fn(DisplayId, Connection) + Send + Sync>;
/// Refresh-request listener.
pub type RefreshFn = Arc<dyn Fn(DisplayId) + Send + Sync>;
/// Vsync listener; receives each tick's deadline.
pub type VsyncFn = Arc<dyn Fn(DisplayId, HostTime) + Send + Sync>;

/// The kinds of callback a client can register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// Display connection changes.
    Hotplug,
    /// Requests to redraw the whole display.
    Refresh,
    /// Periodic vsync ticks.
    Vsync,
}

impl TryFrom<i32> for CallbackKind {
    type Error = Error;

    /// Decodes a protocol callback descriptor.
    fn try_from(descriptor: i32) -> Result<Self> {
        match descriptor {
            1 => Ok(Self::Hotplug),
            2 => Ok(Self::Refresh),
            3 => Ok(Self::Vsync),
            _ => Err(Error::BadParameter),
        }
    }
}

/// A callback to register with [`Device::register_callback`].
#[derive(Clone)]
pub enum Callback {
    /// See [`CallbackKind::Hotplug`].
    Hotplug(HotplugFn),
    /// See [`CallbackKind::Refresh`].
    Refresh(RefreshFn),
    /// See [`CallbackKind::Vsync`].
    Vsync(VsyncFn),
}

impl Callback {
    /// Wraps a hotplug closure.
    pub fn hotplug<F: Fn(DisplayId, Connection) + Send + Sync + 'static>(f: F) -> Self {
        Self::Hotplug(Arc::new(f))
    }

    /// Wraps a refresh closure.
    pub fn refresh<F: Fn(DisplayId) + Send + Sync + 'static>(f: F) -> Self {
        Self::Refresh(Arc::new(f))
    }

    /// Wraps a vsync closure.
    pub fn vsync<F: Fn(DisplayId, HostTime) + Send + Sync + 'static>(f: F) -> Self {
        Self::Vsync(Arc::new(f))
    }

    /// Returns the kind of this callback.
    #[must_use]
    pub fn kind(&self) -> CallbackKind {
        match self {
            Self::Hotplug(_) => CallbackKind::Hotplug,
            Self::Refresh(_) => CallbackKind::Refresh,
            Self::Vsync(_) => CallbackKind::Vsync,
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.kind()).finish()
    }
}

#[derive(Default)]
struct Registry {
    display: Option<Arc<Display>>,
    layers: HashMap<LayerId, DisplayId>,
    hotplug: Option<HotplugFn>,
    refresh: Option<RefreshFn>,
    vsync: Option<VsyncFn>,
    pending_vsyncs: Vec<HostTime>,
    /// Registrations currently draining `pending_vsyncs`.
    flushing: usize,
}

/// The adapter's top-level object.
pub struct Device {
    config: AdapterConfig,
    registry: Mutex<Registry>,
    backend: Mutex<Box<dyn BackendCompositor>>,
    signaler: VsyncSignaler,
    trace: Mutex<Option<Box<dyn TraceSink + Send>>>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("config", &self.config)
            .field("signaler", &self.signaler)
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Opens a device on `backend`: creates the display, activates its first
    /// config and starts the vsync signaler at that config's period.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoResources`] if the backend cannot list its configs
    /// or the signaler cannot start, and [`Error::BadConfig`] if the backend
    /// lists none.
    pub fn open(backend: Box<dyn BackendCompositor>, config: AdapterConfig) -> Result<Arc<Self>> {
        let device = Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            Self {
                config,
                registry: Mutex::new(Registry::default()),
                backend: Mutex::new(backend),
                signaler: VsyncSignaler::new(move |deadline| {
                    if let Some(device) = weak.upgrade() {
                        device.on_backend_vsync(deadline);
                    }
                }),
                trace: Mutex::new(None),
            }
        });

        let display = device.create_display_if_absent()?;
        let period = display
            .active_config()
            .map(|c| c.vsync_period())
            .ok()
            .filter(|p| !p.is_zero())
            .unwrap_or_else(|| device.config.default_vsync_period());
        device.signaler.start(time::now() + period, period).map_err(|err| {
            warn!("{err}");
            Error::NoResources
        })?;
        device.signaler.set_enabled(device.config.vsync.start_enabled);
        info!("device open: {:?}, vsync period {period:?}", display.id());
        Ok(device)
    }

    /// Returns the configuration the device was opened with.
    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Installs a trace sink, replacing any previous one.
    pub fn set_trace_sink(&self, sink: Option<Box<dyn TraceSink + Send>>) {
        *self.trace.lock() = sink;
    }

    fn emit(&self, f: impl FnOnce(&mut dyn TraceSink)) {
        if let Some(sink) = self.trace.lock().as_deref_mut() {
            f(sink);
        }
    }

    // -- Resolution -------------------------------------------------------

    /// Returns the singleton display, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoResources`] if the backend cannot list its configs
    /// and [`Error::BadConfig`] if it lists none.
    pub fn create_display_if_absent(&self) -> Result<Arc<Display>> {
        let mut registry = self.registry.lock();
        if let Some(display) = &registry.display {
            return Ok(Arc::clone(display));
        }

        let backend_configs = self.backend.lock().display_configs()?;
        let configs = coalesce(&backend_configs);
        if configs.is_empty() {
            log::error!("backend reported no display configs");
            return Err(Error::BadConfig);
        }
        let display = Arc::new(Display::new(
            configs,
            DisplayOptions {
                name: self.config.display_name.clone(),
                require_client_target: self.config.client_target.require_for_client_layers,
            },
        )?);
        registry.display = Some(Arc::clone(&display));
        Ok(display)
    }

    /// Resolves a display id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] for an unknown id.
    pub fn display(&self, id: DisplayId) -> Result<Arc<Display>> {
        let registry = self.registry.lock();
        match &registry.display {
            Some(display) if display.id() == id => Ok(Arc::clone(display)),
            _ => Err(Error::BadDisplay),
        }
    }

    /// Resolves a layer id on a display and returns the owning display.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] for an unknown display and
    /// [`Error::BadLayer`] for an unknown layer or one that belongs to a
    /// different display.
    pub fn resolve_layer(&self, display: DisplayId, layer: LayerId) -> Result<Arc<Display>> {
        let registry = self.registry.lock();
        let found = match &registry.display {
            Some(found) if found.id() == display => Arc::clone(found),
            _ => return Err(Error::BadDisplay),
        };
        match registry.layers.get(&layer) {
            Some(&owner) if owner == display => Ok(found),
            Some(&owner) => {
                debug!("{layer:?} belongs to {owner:?}, not {display:?}");
                Err(Error::BadLayer)
            }
            None => Err(Error::BadLayer),
        }
    }

    // -- Layers -----------------------------------------------------------

    /// Creates a layer on a display.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] for an unknown display and
    /// [`Error::NoResources`] if the layer id space is exhausted.
    pub fn create_layer(&self, display: DisplayId) -> Result<LayerId> {
        let layer = {
            let mut registry = self.registry.lock();
            let found = match &registry.display {
                Some(found) if found.id() == display => Arc::clone(found),
                _ => return Err(Error::BadDisplay),
            };
            let layer = found.create_layer()?;
            registry.layers.insert(layer, display);
            layer
        };
        self.emit_layer(display, layer, LayerEventKind::Created);
        Ok(layer)
    }

    /// Destroys a layer. Its in-flight release fences are dropped without
    /// waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] or [`Error::BadLayer`] as for
    /// [`resolve_layer`](Self::resolve_layer).
    pub fn destroy_layer(&self, display: DisplayId, layer: LayerId) -> Result<()> {
        {
            let mut registry = self.registry.lock();
            let found = match &registry.display {
                Some(found) if found.id() == display => Arc::clone(found),
                _ => return Err(Error::BadDisplay),
            };
            if registry.layers.get(&layer) != Some(&display) {
                return Err(Error::BadLayer);
            }
            found.destroy_layer(layer)?;
            registry.layers.remove(&layer);
        }
        self.emit_layer(display, layer, LayerEventKind::Destroyed);
        Ok(())
    }

    /// Moves a layer to a new Z key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] or [`Error::BadLayer`].
    pub fn set_layer_z_order(&self, display: DisplayId, layer: LayerId, z: u32) -> Result<()> {
        self.resolve_layer(display, layer)?.set_layer_z_order(layer, z)?;
        self.emit_layer(display, layer, LayerEventKind::ZChanged(z));
        Ok(())
    }

    /// Requests a composition type for a layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] or [`Error::BadLayer`].
    pub fn set_layer_composition_type(
        &self,
        display: DisplayId,
        layer: LayerId,
        ty: CompositionType,
    ) -> Result<()> {
        self.resolve_layer(display, layer)?
            .set_layer_composition_type(layer, ty)
    }

    /// Installs a layer buffer and returns the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] or [`Error::BadLayer`].
    pub fn set_layer_buffer(
        &self,
        display: DisplayId,
        layer: LayerId,
        buffer: Option<BufferHandle>,
        acquire_fence: Fence,
    ) -> Result<FencedResource> {
        self.resolve_layer(display, layer)?
            .set_layer_buffer(layer, buffer, acquire_fence)
    }

    /// Sets a layer's dataspace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] or [`Error::BadLayer`].
    pub fn set_layer_dataspace(&self, display: DisplayId, layer: LayerId, dataspace: Dataspace) -> Result<()> {
        self.resolve_layer(display, layer)?
            .set_layer_dataspace(layer, dataspace)
    }

    /// Moves a cursor layer.
    ///
    /// # Errors
    ///
    /// As [`Display::set_cursor_position`], plus id resolution errors.
    pub fn set_cursor_position(&self, display: DisplayId, layer: LayerId, x: f64, y: f64) -> Result<()> {
        self.resolve_layer(display, layer)?
            .set_cursor_position(layer, x, y)
    }

    // -- Display ----------------------------------------------------------

    /// Sets the client target of a display.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] for an unknown display.
    pub fn set_client_target(
        &self,
        display: DisplayId,
        buffer: Option<BufferHandle>,
        acquire_fence: Fence,
        dataspace: Dataspace,
        damage: Vec<Rect>,
    ) -> Result<()> {
        self.display(display)?
            .set_client_target(buffer, acquire_fence, dataspace, damage);
        Ok(())
    }

    /// Validates a display.
    ///
    /// # Errors
    ///
    /// As [`Display::validate`], plus [`Error::BadDisplay`] for an unknown id.
    pub fn validate(&self, display: DisplayId) -> Result<ValidateSummary> {
        let found = self.display(display)?;
        let summary = {
            let mut backend = self.backend.lock();
            found.validate(&mut **backend)?
        };
        self.emit(|sink| {
            sink.on_validate(&ValidateEvent {
                display,
                timestamp: time::now(),
                num_type_changes: u32::try_from(summary.num_type_changes).unwrap_or(u32::MAX),
                num_layer_requests: u32::try_from(summary.num_layer_requests).unwrap_or(u32::MAX),
                status: summary.status,
            });
        });
        Ok(summary)
    }

    /// Accepts the type overrides of the last validation.
    ///
    /// # Errors
    ///
    /// As [`Display::accept_changes`], plus [`Error::BadDisplay`].
    pub fn accept_changes(&self, display: DisplayId) -> Result<()> {
        self.display(display)?.accept_changes()?;
        self.emit(|sink| {
            sink.on_accept(&AcceptEvent {
                display,
                timestamp: time::now(),
            });
        });
        Ok(())
    }

    /// Presents a display and returns the retire fence.
    ///
    /// # Errors
    ///
    /// As [`Display::present`], plus [`Error::BadDisplay`] for an unknown id.
    pub fn present(&self, display: DisplayId) -> Result<Fence> {
        let found = self.display(display)?;
        let retire = {
            let mut backend = self.backend.lock();
            found.present(&mut **backend)?
        };
        let frame_index = found.frames_presented();
        trace!("{display:?}: presented frame {frame_index}");
        self.emit(|sink| {
            sink.on_present(&PresentEvent {
                display,
                timestamp: time::now(),
                frame_index,
                retire_fence: retire.id(),
            });
        });
        Ok(retire)
    }

    /// Makes `config` the active config of a display.
    ///
    /// # Errors
    ///
    /// As [`Display::set_active_config`], plus [`Error::BadDisplay`].
    pub fn set_active_config(&self, display: DisplayId, config: ConfigId) -> Result<()> {
        let found = self.display(display)?;
        {
            let mut backend = self.backend.lock();
            found.set_active_config(&mut **backend, config)?;
        }
        if let Ok(active) = found.active_config()
            && !active.vsync_period().is_zero()
        {
            self.signaler.set_period(active.vsync_period());
        }
        Ok(())
    }

    /// Applies a power mode to a display.
    ///
    /// # Errors
    ///
    /// As [`Display::set_power_mode`], plus [`Error::BadDisplay`].
    pub fn set_power_mode(&self, display: DisplayId, mode: PowerMode) -> Result<()> {
        let found = self.display(display)?;
        let mut backend = self.backend.lock();
        found.set_power_mode(&mut **backend, mode)
    }

    /// Gates vsync callback delivery for a display.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] for an unknown display.
    pub fn set_vsync_enabled(&self, display: DisplayId, enabled: bool) -> Result<()> {
        let _ = self.display(display)?;
        self.signaler.set_enabled(enabled);
        debug!("{display:?}: vsync {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Returns the deferred release fences of a display.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] for an unknown display.
    pub fn release_fences(&self, display: DisplayId) -> Result<Vec<(LayerId, Fence)>> {
        Ok(self.display(display)?.release_fences())
    }

    // -- Callbacks --------------------------------------------------------

    /// Registers a callback for a protocol descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadParameter`] for an unrecognized descriptor or one
    /// that does not match the callback's kind.
    pub fn register_callback_for(&self, descriptor: i32, callback: Callback) -> Result<()> {
        if CallbackKind::try_from(descriptor)? != callback.kind() {
            return Err(Error::BadParameter);
        }
        self.register_callback(callback);
        Ok(())
    }

    /// Registers a callback, replacing any previous one of the same kind.
    ///
    /// Registering a hotplug callback immediately reports the display as
    /// connected. Registering a vsync callback first delivers every tick that
    /// fired while none was registered, oldest first.
    pub fn register_callback(&self, callback: Callback) {
        info!("registering {:?} callback", callback.kind());
        match callback {
            Callback::Hotplug(f) => {
                let display = {
                    let mut registry = self.registry.lock();
                    registry.hotplug = Some(Arc::clone(&f));
                    registry.display.as_ref().map(|d| d.id())
                };
                if let Some(display) = display {
                    f(display, Connection::Connected);
                }
            }
            Callback::Refresh(f) => {
                self.registry.lock().refresh = Some(f);
            }
            Callback::Vsync(f) => self.flush_and_install_vsync(f),
        }
    }

    fn flush_and_install_vsync(&self, f: VsyncFn) {
        let display = {
            let mut registry = self.registry.lock();
            registry.vsync = Some(Arc::clone(&f));
            let Some(display) = registry.display.as_ref().map(|d| d.id()) else {
                return;
            };
            registry.flushing += 1;
            display
        };
        loop {
            let batch = {
                let mut registry = self.registry.lock();
                // A replacement registration takes over the queue.
                let still_installed = registry
                    .vsync
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, &f));
                if !still_installed || registry.pending_vsyncs.is_empty() {
                    registry.flushing -= 1;
                    return;
                }
                core::mem::take(&mut registry.pending_vsyncs)
            };
            debug!("flushing {} buffered vsync tick(s)", batch.len());
            for deadline in batch {
                f(display, deadline);
                self.emit_vsync(display, deadline, true);
            }
        }
    }

    /// Removes the callback of the given kind.
    pub fn unregister_callback(&self, kind: CallbackKind) {
        let mut registry = self.registry.lock();
        match kind {
            CallbackKind::Hotplug => registry.hotplug = None,
            CallbackKind::Refresh => registry.refresh = None,
            CallbackKind::Vsync => registry.vsync = None,
        }
    }

    /// Delivers a vsync tick, or queues it if no vsync callback is
    /// registered yet or a registration is still flushing older ticks.
    ///
    /// No lock is held while the callback runs.
    pub fn on_backend_vsync(&self, deadline: HostTime) {
        let (display, callback) = {
            let mut registry = self.registry.lock();
            let Some(display) = registry.display.as_ref().map(|d| d.id()) else {
                return;
            };
            let flushing = registry.flushing > 0;
            match registry.vsync.clone() {
                Some(callback) if !flushing => (display, callback),
                _ => {
                    registry.pending_vsyncs.push(deadline);
                    return;
                }
            }
        };
        callback(display, deadline);
        self.emit_vsync(display, deadline, false);
    }

    /// Returns the number of vsync ticks waiting for a callback.
    #[must_use]
    pub fn pending_vsync_count(&self) -> usize {
        self.registry.lock().pending_vsyncs.len()
    }

    /// Asks the client to redraw a display.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadDisplay`] for an unknown display.
    pub fn request_refresh(&self, display: DisplayId) -> Result<()> {
        let _ = self.display(display)?;
        let callback = self.registry.lock().refresh.clone();
        if let Some(callback) = callback {
            callback(display);
        }
        Ok(())
    }

    // -- Lifecycle --------------------------------------------------------

    /// Stops vsync and waits for the last presented frame to retire.
    ///
    /// A retire fence that times out or is abandoned is logged and ignored.
    pub fn shutdown(&self) {
        self.signaler.stop();
        let retire = self.registry.lock().display.as_ref().map(|d| d.retire_fence());
        let Some(retire) = retire else {
            return;
        };
        match retire.wait_timeout(self.config.retire_timeout()) {
            Ok(()) => info!("shutdown: last frame retired"),
            Err(err) => warn!("shutdown: {err}; proceeding"),
        }
    }

    /// Returns a human-readable description of the device.
    #[must_use]
    pub fn dump(&self) -> String {
        let (display, layers, callbacks, pending) = {
            let registry = self.registry.lock();
            (
                registry.display.clone(),
                registry.layers.len(),
                [
                    registry.hotplug.is_some(),
                    registry.refresh.is_some(),
                    registry.vsync.is_some(),
                ],
                registry.pending_vsyncs.len(),
            )
        };
        let mut out = String::from("hwcompat device state:\n");
        out.push_str(&format!(
            "  vsync {:?} @ {:?}, {} tick(s) delivered, {pending} buffered\n",
            self.signaler.state(),
            self.signaler.period(),
            self.signaler.ticks_delivered(),
        ));
        out.push_str(&format!(
            "  callbacks: hotplug={} refresh={} vsync={}, {layers} layer(s) registered\n",
            callbacks[0], callbacks[1], callbacks[2]
        ));
        if let Some(display) = display {
            display.dump(&mut out);
        }
        out
    }

    // -- Tracing helpers --------------------------------------------------

    fn emit_layer(&self, display: DisplayId, layer: LayerId, kind: LayerEventKind) {
        self.emit(|sink| {
            sink.on_layer(&LayerEvent {
                display,
                layer,
                kind,
                timestamp: time::now(),
            });
        });
    }

    fn emit_vsync(&self, display: DisplayId, deadline: HostTime, buffered: bool) {
        self.emit(|sink| {
            sink.on_vsync(&VsyncEvent {
                display,
                deadline,
                buffered,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{Callback, CallbackKind};
    use crate::error::Error;

    #[test]
    fn descriptors_decode() {
        assert_eq!(CallbackKind::try_from(1), Ok(CallbackKind::Hotplug));
        assert_eq!(CallbackKind::try_from(2), Ok(CallbackKind::Refresh));
        assert_eq!(CallbackKind::try_from(3), Ok(CallbackKind::Vsync));
        assert_eq!(CallbackKind::try_from(0), Err(Error::BadParameter));
        assert_eq!(CallbackKind::try_from(42), Err(Error::BadParameter));
    }

    #[test]
    fn callback_reports_kind() {
        assert_eq!(Callback::vsync(|_, _| {}).kind(), CallbackKind::Vsync);
        assert_eq!(Callback::hotplug(|_, _| {}).kind(), CallbackKind::Hotplug);
        assert_eq!(Callback::refresh(|_| {}).kind(), CallbackKind::Refresh);
    }
}
