// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display configurations and display-level enumerations.
//!
//! The backend may list several configurations that differ only in details
//! the protocol does not expose. [`coalesce`] merges every backend entry with
//! identical width, height, vsync period and density into one logical
//! [`DisplayConfig`] that remembers all backend indices it stands for.

use core::fmt;
use core::time::Duration;

use crate::backend::BackendConfig;

/// Identifies a logical display configuration.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigId(pub u32);

impl fmt::Debug for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigId({})", self.0)
    }
}

/// A queryable attribute of a [`DisplayConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Width in pixels.
    Width,
    /// Height in pixels.
    Height,
    /// Refresh period in nanoseconds.
    VsyncPeriod,
    /// Horizontal density in dots per thousand inches.
    DpiX,
    /// Vertical density in dots per thousand inches.
    DpiY,
}

/// A logical display configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayConfig {
    id: ConfigId,
    width: u32,
    height: u32,
    vsync_period: Duration,
    dpi_x_milli: u32,
    dpi_y_milli: u32,
    backend_indices: Vec<usize>,
}

impl DisplayConfig {
    fn from_backend(id: ConfigId, index: usize, config: &BackendConfig) -> Self {
        Self {
            id,
            width: config.width,
            height: config.height,
            vsync_period: config.vsync_period,
            dpi_x_milli: config.dpi_x_milli,
            dpi_y_milli: config.dpi_y_milli,
            backend_indices: vec![index],
        }
    }

    /// Returns the config id.
    #[must_use]
    pub fn id(&self) -> ConfigId {
        self.id
    }

    /// Returns the width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the refresh period.
    #[must_use]
    pub fn vsync_period(&self) -> Duration {
        self.vsync_period
    }

    /// Returns the backend indices merged into this config, ascending.
    #[must_use]
    pub fn backend_indices(&self) -> &[usize] {
        &self.backend_indices
    }

    /// Returns the value of `attribute`.
    #[must_use]
    pub fn attribute(&self, attribute: Attribute) -> u64 {
        match attribute {
            Attribute::Width => u64::from(self.width),
            Attribute::Height => u64::from(self.height),
            Attribute::VsyncPeriod => u64::try_from(self.vsync_period.as_nanos()).unwrap_or(u64::MAX),
            Attribute::DpiX => u64::from(self.dpi_x_milli),
            Attribute::DpiY => u64::from(self.dpi_y_milli),
        }
    }

    fn matches(&self, config: &BackendConfig) -> bool {
        self.width == config.width
            && self.height == config.height
            && self.vsync_period == config.vsync_period
            && self.dpi_x_milli == config.dpi_x_milli
            && self.dpi_y_milli == config.dpi_y_milli
    }
}

impl fmt::Display for DisplayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.width, self.height)?;
        if !self.vsync_period.is_zero() {
            write!(f, " @ {:.1} Hz", 1.0 / self.vsync_period.as_secs_f64())?;
        }
        write!(
            f,
            ", {:.1} x {:.1} DPI",
            f64::from(self.dpi_x_milli) / 1000.0,
            f64::from(self.dpi_y_milli) / 1000.0
        )
    }
}

/// Merges backend configurations into logical configs.
///
/// Ids are assigned in order of first appearance, starting at 1.
#[must_use]
pub fn coalesce(backend: &[BackendConfig]) -> Vec<DisplayConfig> {
    let mut merged: Vec<DisplayConfig> = Vec::new();
    for (index, config) in backend.iter().enumerate() {
        if let Some(existing) = merged.iter_mut().find(|c| c.matches(config)) {
            log::debug!("config {index} merged into {}", existing);
            existing.backend_indices.push(index);
            continue;
        }
        let id = ConfigId(u32::try_from(merged.len() + 1).unwrap_or(u32::MAX));
        let config = DisplayConfig::from_backend(id, index, config);
        log::debug!("config {index} added as {:?}: {config}", config.id);
        merged.push(config);
    }
    merged
}

/// Display power state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PowerMode {
    /// Screen off.
    Off,
    /// Low-power mode with updates suspended.
    DozeSuspend,
    /// Low-power mode.
    Doze,
    /// Fully on.
    #[default]
    On,
}

/// Color rendering mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ColorMode {
    /// The panel's native gamut.
    #[default]
    Native,
    /// sRGB gamut.
    Srgb,
    /// Display P3 gamut.
    DisplayP3,
}

/// Kind of display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisplayType {
    /// A physical panel.
    Physical,
    /// A virtual, write-back display.
    Virtual,
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::{Attribute, ConfigId, coalesce};
    use crate::backend::BackendConfig;

    fn backend(width: u32, hz: u64) -> BackendConfig {
        BackendConfig {
            width,
            height: 1080,
            vsync_period: Duration::from_nanos(1_000_000_000 / hz),
            dpi_x_milli: 160_000,
            dpi_y_milli: 160_000,
        }
    }

    #[test]
    fn identical_configs_merge() {
        let configs = coalesce(&[backend(1920, 60), backend(1920, 60), backend(1280, 60)]);
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].id(), ConfigId(1));
        assert_eq!(configs[0].backend_indices(), &[0, 1]);
        assert_eq!(configs[1].backend_indices(), &[2]);
    }

    #[test]
    fn differing_period_stays_separate() {
        let configs = coalesce(&[backend(1920, 60), backend(1920, 50)]);
        assert_eq!(configs.len(), 2);
    }

    #[test]
    fn attributes_report_scaled_values() {
        let configs = coalesce(&[backend(1920, 60)]);
        let config = &configs[0];
        assert_eq!(config.attribute(Attribute::Width), 1920);
        assert_eq!(config.attribute(Attribute::Height), 1080);
        assert_eq!(config.attribute(Attribute::VsyncPeriod), 16_666_666);
        assert_eq!(config.attribute(Attribute::DpiX), 160_000);
    }

    #[test]
    fn display_string() {
        let configs = coalesce(&[backend(1920, 60)]);
        assert_eq!(configs[0].to_string(), "1920 x 1080 @ 60.0 Hz, 160.0 x 160.0 DPI");
    }

    #[test]
    fn empty_backend_list_yields_no_configs() {
        assert!(coalesce(&[]).is_empty(), "nothing to merge");
    }
}
