// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records, each led by a one-byte tag.
//! [`decode`] reads them back as an iterator of [`RecordedEvent`]; decoding
//! stops at the first unknown tag or truncated record.

use hwcompat_core::display::{DisplayId, ValidateStatus};
use hwcompat_core::layer::LayerId;
use hwcompat_core::time::HostTime;
use hwcompat_core::trace::{
    AcceptEvent, LayerEvent, LayerEventKind, PresentEvent, TraceSink, ValidateEvent, VsyncEvent,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_VALIDATE: u8 = 1;
const TAG_ACCEPT: u8 = 2;
const TAG_PRESENT: u8 = 3;
const TAG_VSYNC: u8 = 4;
const TAG_LAYER: u8 = 5;

const LAYER_CREATED: u8 = 0;
const LAYER_DESTROYED: u8 = 1;
const LAYER_Z_CHANGED: u8 = 2;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_option_u64(&mut self, v: Option<u64>) {
        self.write_u8(u8::from(v.is_some()));
        self.write_u64(v.unwrap_or(0));
    }
}

impl TraceSink for RecorderSink {
    fn on_validate(&mut self, e: &ValidateEvent) {
        self.write_u8(TAG_VALIDATE);
        self.write_u64(e.display.0);
        self.write_u64(e.timestamp.nanos());
        self.write_u32(e.num_type_changes);
        self.write_u32(e.num_layer_requests);
        self.write_u8(match e.status {
            ValidateStatus::NoChanges => 0,
            ValidateStatus::HasChanges => 1,
        });
    }

    fn on_accept(&mut self, e: &AcceptEvent) {
        self.write_u8(TAG_ACCEPT);
        self.write_u64(e.display.0);
        self.write_u64(e.timestamp.nanos());
    }

    fn on_present(&mut self, e: &PresentEvent) {
        self.write_u8(TAG_PRESENT);
        self.write_u64(e.display.0);
        self.write_u64(e.timestamp.nanos());
        self.write_u64(e.frame_index);
        self.write_option_u64(e.retire_fence);
    }

    fn on_vsync(&mut self, e: &VsyncEvent) {
        self.write_u8(TAG_VSYNC);
        self.write_u64(e.display.0);
        self.write_u64(e.deadline.nanos());
        self.write_u8(u8::from(e.buffered));
    }

    fn on_layer(&mut self, e: &LayerEvent) {
        self.write_u8(TAG_LAYER);
        self.write_u64(e.display.0);
        self.write_u64(e.layer.get());
        self.write_u64(e.timestamp.nanos());
        match e.kind {
            LayerEventKind::Created => {
                self.write_u8(LAYER_CREATED);
                self.write_u32(0);
            }
            LayerEventKind::Destroyed => {
                self.write_u8(LAYER_DESTROYED);
                self.write_u32(0);
            }
            LayerEventKind::ZChanged(z) => {
                self.write_u8(LAYER_Z_CHANGED);
                self.write_u32(z);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`ValidateEvent`].
    Validate(ValidateEvent),
    /// An [`AcceptEvent`].
    Accept(AcceptEvent),
    /// A [`PresentEvent`].
    Present(PresentEvent),
    /// A [`VsyncEvent`].
    Vsync(VsyncEvent),
    /// A [`LayerEvent`].
    Layer(LayerEvent),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter { data: bytes, pos: 0 }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_option_u64(&mut self) -> Option<Option<u64>> {
        let present = self.read_u8()?;
        let val = self.read_u64()?;
        Some((present != 0).then_some(val))
    }

    fn decode_validate(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Validate(ValidateEvent {
            display: DisplayId(self.read_u64()?),
            timestamp: HostTime(self.read_u64()?),
            num_type_changes: self.read_u32()?,
            num_layer_requests: self.read_u32()?,
            status: match self.read_u8()? {
                0 => ValidateStatus::NoChanges,
                _ => ValidateStatus::HasChanges,
            },
        }))
    }

    fn decode_accept(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Accept(AcceptEvent {
            display: DisplayId(self.read_u64()?),
            timestamp: HostTime(self.read_u64()?),
        }))
    }

    fn decode_present(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Present(PresentEvent {
            display: DisplayId(self.read_u64()?),
            timestamp: HostTime(self.read_u64()?),
            frame_index: self.read_u64()?,
            retire_fence: self.read_option_u64()?,
        }))
    }

    fn decode_vsync(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Vsync(VsyncEvent {
            display: DisplayId(self.read_u64()?),
            deadline: HostTime(self.read_u64()?),
            buffered: self.read_u8()? != 0,
        }))
    }

    fn decode_layer(&mut self) -> Option<RecordedEvent> {
        let display = DisplayId(self.read_u64()?);
        let layer = LayerId(self.read_u64()?);
        let timestamp = HostTime(self.read_u64()?);
        let kind = self.read_u8()?;
        let z = self.read_u32()?;
        let kind = match kind {
            LAYER_CREATED => LayerEventKind::Created,
            LAYER_DESTROYED => LayerEventKind::Destroyed,
            LAYER_Z_CHANGED => LayerEventKind::ZChanged(z),
            _ => return None,
        };
        Some(RecordedEvent::Layer(LayerEvent {
            display,
            layer,
            kind,
            timestamp,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_u8()? {
            TAG_VALIDATE => self.decode_validate(),
            TAG_ACCEPT => self.decode_accept(),
            TAG_PRESENT => self.decode_present(),
            TAG_VSYNC => self.decode_vsync(),
            TAG_LAYER => self.decode_layer(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame(rec: &mut RecorderSink) {
        let display = DisplayId(1);
        rec.on_layer(&LayerEvent {
            display,
            layer: LayerId(10),
            kind: LayerEventKind::ZChanged(3),
            timestamp: HostTime(100),
        });
        rec.on_validate(&ValidateEvent {
            display,
            timestamp: HostTime(200),
            num_type_changes: 2,
            num_layer_requests: 1,
            status: ValidateStatus::HasChanges,
        });
        rec.on_accept(&AcceptEvent {
            display,
            timestamp: HostTime(300),
        });
        rec.on_present(&PresentEvent {
            display,
            timestamp: HostTime(400),
            frame_index: 1,
            retire_fence: Some(77),
        });
        rec.on_vsync(&VsyncEvent {
            display,
            deadline: HostTime(16_666_666),
            buffered: true,
        });
    }

    #[test]
    fn decodes_a_frame_in_order() {
        let mut rec = RecorderSink::new();
        sample_frame(&mut rec);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 5, "got {events:?}");
        match &events[0] {
            RecordedEvent::Layer(e) => {
                assert_eq!(e.layer, LayerId(10));
                assert_eq!(e.kind, LayerEventKind::ZChanged(3));
            }
            other => panic!("expected Layer, got {other:?}"),
        }
        match &events[1] {
            RecordedEvent::Validate(e) => {
                assert_eq!(e.num_type_changes, 2);
                assert_eq!(e.num_layer_requests, 1);
                assert_eq!(e.status, ValidateStatus::HasChanges);
            }
            other => panic!("expected Validate, got {other:?}"),
        }
        assert!(matches!(events[2], RecordedEvent::Accept(_)), "got {:?}", events[2]);
        match &events[3] {
            RecordedEvent::Present(e) => {
                assert_eq!(e.frame_index, 1);
                assert_eq!(e.retire_fence, Some(77));
            }
            other => panic!("expected Present, got {other:?}"),
        }
        match &events[4] {
            RecordedEvent::Vsync(e) => {
                assert_eq!(e.deadline, HostTime(16_666_666));
                assert!(e.buffered, "buffered flag survives");
            }
            other => panic!("expected Vsync, got {other:?}"),
        }
    }

    #[test]
    fn truncated_recording_stops_cleanly() {
        let mut rec = RecorderSink::new();
        sample_frame(&mut rec);
        let bytes = rec.into_bytes();
        // Cut into the final vsync record.
        let events: Vec<_> = decode(&bytes[..bytes.len() - 3]).collect();
        assert_eq!(events.len(), 4, "partial record dropped");
    }

    #[test]
    fn unknown_tag_stops_iteration() {
        let mut rec = RecorderSink::new();
        rec.on_accept(&AcceptEvent {
            display: DisplayId(1),
            timestamp: HostTime(0),
        });
        let mut bytes = rec.into_bytes();
        bytes.push(0xff);
        bytes.extend_from_slice(&[0; 16]);
        assert_eq!(decode(&bytes).count(), 1);
    }
}
