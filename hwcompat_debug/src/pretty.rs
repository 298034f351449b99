// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Host times
//! are printed in microseconds.

use std::io::Write;

use hwcompat_core::display::ValidateStatus;
use hwcompat_core::time::HostTime;
use hwcompat_core::trace::{
    AcceptEvent, LayerEvent, LayerEventKind, PresentEvent, TraceSink, ValidateEvent, VsyncEvent,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }
}

fn us(t: HostTime) -> f64 {
    t.nanos() as f64 / 1000.0
}

fn status_name(status: ValidateStatus) -> &'static str {
    match status {
        ValidateStatus::NoChanges => "no-changes",
        ValidateStatus::HasChanges => "has-changes",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_validate(&mut self, e: &ValidateEvent) {
        let _ = writeln!(
            self.writer,
            "[validate] display={} {} types={} requests={} at {:.1}µs",
            e.display.0,
            status_name(e.status),
            e.num_type_changes,
            e.num_layer_requests,
            us(e.timestamp),
        );
    }

    fn on_accept(&mut self, e: &AcceptEvent) {
        let _ = writeln!(
            self.writer,
            "[accept] display={} at {:.1}µs",
            e.display.0,
            us(e.timestamp),
        );
    }

    fn on_present(&mut self, e: &PresentEvent) {
        let retire = match e.retire_fence {
            Some(id) => format!("fence#{id}"),
            None => String::from("none"),
        };
        let _ = writeln!(
            self.writer,
            "[present] display={} frame={} retire={retire} at {:.1}µs",
            e.display.0,
            e.frame_index,
            us(e.timestamp),
        );
    }

    fn on_vsync(&mut self, e: &VsyncEvent) {
        let _ = writeln!(
            self.writer,
            "[vsync] display={} deadline={:.1}µs{}",
            e.display.0,
            us(e.deadline),
            if e.buffered { " (buffered)" } else { "" },
        );
    }

    fn on_layer(&mut self, e: &LayerEvent) {
        let what = match e.kind {
            LayerEventKind::Created => String::from("created"),
            LayerEventKind::Destroyed => String::from("destroyed"),
            LayerEventKind::ZChanged(z) => format!("z={z}"),
        };
        let _ = writeln!(
            self.writer,
            "[layer] display={} layer={} {what} at {:.1}µs",
            e.display.0,
            e.layer.get(),
            us(e.timestamp),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwcompat_core::display::DisplayId;
    use hwcompat_core::layer::LayerId;

    #[test]
    fn pretty_print_validate() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_validate(&ValidateEvent {
            display: DisplayId(1),
            timestamp: HostTime(2_000),
            num_type_changes: 3,
            num_layer_requests: 1,
            status: ValidateStatus::HasChanges,
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.starts_with("[validate]"), "got: {output}");
        assert!(output.contains("has-changes types=3 requests=1"), "got: {output}");
        assert!(output.contains("at 2.0µs"), "got: {output}");
    }

    #[test]
    fn pretty_print_layer_and_vsync() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_layer(&LayerEvent {
            display: DisplayId(1),
            layer: LayerId(4),
            kind: LayerEventKind::ZChanged(7),
            timestamp: HostTime(0),
        });
        sink.on_vsync(&VsyncEvent {
            display: DisplayId(1),
            deadline: HostTime(16_000),
            buffered: true,
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2, "got: {output}");
        assert!(lines[0].contains("layer=4 z=7"), "got: {}", lines[0]);
        assert!(lines[1].ends_with("(buffered)"), "got: {}", lines[1]);
    }

    #[test]
    fn present_without_retire_primitive() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_present(&PresentEvent {
            display: DisplayId(2),
            timestamp: HostTime(0),
            frame_index: 9,
            retire_fence: None,
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.contains("frame=9 retire=none"), "got: {output}");
    }
}
