// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-layer composition attributes.

use core::fmt;

/// Which engine composes a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CompositionType {
    /// Not yet specified by the caller.
    #[default]
    Invalid,
    /// Composed by the client into the client target.
    Client,
    /// Composed by dedicated overlay hardware.
    Device,
    /// A solid color fill.
    SolidColor,
    /// A hardware cursor plane.
    Cursor,
    /// A sideband stream handled outside the buffer path.
    Sideband,
}

impl CompositionType {
    /// Returns a short lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Client => "client",
            Self::Device => "device",
            Self::SolidColor => "solid-color",
            Self::Cursor => "cursor",
            Self::Sideband => "sideband",
        }
    }
}

impl fmt::Display for CompositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a layer's pixels blend with what lies beneath.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Opaque; no blending.
    #[default]
    None,
    /// Source color is premultiplied by alpha.
    Premultiplied,
    /// Source color is not premultiplied.
    Coverage,
}

/// Orientation applied to a layer's buffer before composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Transform {
    /// No transform.
    #[default]
    Identity,
    /// Horizontal flip.
    FlipH,
    /// Vertical flip.
    FlipV,
    /// Rotate 90 degrees clockwise.
    Rot90,
    /// Rotate 180 degrees.
    Rot180,
    /// Rotate 270 degrees clockwise.
    Rot270,
    /// Horizontal flip, then rotate 90 degrees.
    FlipHRot90,
    /// Vertical flip, then rotate 90 degrees.
    FlipVRot90,
}

/// A color space identifier as passed through the protocol.
///
/// Only [`Dataspace::UNKNOWN`] is supported by the backend; any other value
/// forces the layer to client composition.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dataspace(pub u32);

impl Dataspace {
    /// The backend-native, unspecified color space.
    pub const UNKNOWN: Self = Self(0);

    /// Returns `true` if the backend can honor this dataspace.
    #[inline]
    #[must_use]
    pub const fn is_supported(self) -> bool {
        self.0 == Self::UNKNOWN.0
    }
}

impl fmt::Debug for Dataspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dataspace({:#x})", self.0)
    }
}

/// An 8-bit RGBA color for solid-color layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Color {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

/// Pixel formats the protocol may name for a client target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit RGBA, 8 bits per channel.
    Rgba8888,
    /// 32-bit RGB with an unused alpha byte.
    Rgbx8888,
    /// 24-bit RGB.
    Rgb888,
    /// 16-bit RGB.
    Rgb565,
    /// 32-bit BGRA, 8 bits per channel.
    Bgra8888,
    /// Any other format code.
    Other(u32),
}

/// A per-layer request produced by validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerRequest {
    /// The client should clear the layer's area of the client target.
    ClearClientTarget,
}

#[cfg(test)]
mod tests {
    use super::{CompositionType, Dataspace};

    #[test]
    fn only_unknown_dataspace_is_supported() {
        assert!(Dataspace::UNKNOWN.is_supported(), "unknown is native");
        assert!(!Dataspace(0x10c1_0000).is_supported(), "bt709 is not");
    }

    #[test]
    fn composition_labels() {
        assert_eq!(CompositionType::default(), CompositionType::Invalid);
        assert_eq!(CompositionType::SolidColor.to_string(), "solid-color");
    }
}
