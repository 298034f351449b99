// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vsync-paced frame loop against a scripted backend.
//!
//! Opens a device, builds a three-layer stack (a client-composed
//! background, a device-composed video plane and a cursor) and runs one
//! validate/accept/present cycle per vsync tick. The backend's fences are
//! signaled right after each commit, as a display would on scanout.
//!
//! Set `HWCOMPAT_LOG=debug` for protocol logging, or pass `--trace` for one
//! line per protocol event.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use hwcompat_core::backend::BackendComposition;
use hwcompat_core::buffer::BufferHandle;
use hwcompat_core::config::AdapterConfig;
use hwcompat_core::device::{Callback, Connection, Device};
use hwcompat_core::display::{DisplayId, ValidateStatus};
use hwcompat_core::fence::Fence;
use hwcompat_core::layer::{CompositionType, Dataspace, LayerId};
use hwcompat_debug::pretty::PrettyPrintSink;
use hwcompat_harness::{ScriptHandle, ScriptedBackend};
use kurbo::Rect;
use log::{info, warn};

const CURSOR_BUFFER: BufferHandle = BufferHandle(0xc0);

#[derive(Parser, Debug)]
#[command(name = "frame_loop")]
#[command(about = "Drive a scripted display through validate/accept/present", long_about = None)]
struct Args {
    /// Adapter configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = "hwcompat.toml")]
    config: PathBuf,

    /// Number of frames to present
    #[arg(short, long, default_value = "120")]
    frames: u64,

    /// Display width
    #[arg(long, default_value = "1920")]
    width: u32,

    /// Display height
    #[arg(long, default_value = "1080")]
    height: u32,

    /// Print one line per protocol event to stderr
    #[arg(long, action)]
    trace: bool,

    /// Verbose logging
    #[arg(short, long, action)]
    verbose: bool,
}

struct Stack {
    background: LayerId,
    video: LayerId,
    cursor: LayerId,
}

fn build_stack(device: &Device, display: DisplayId, width: u32, height: u32) -> hwcompat_core::Result<Stack> {
    let full = Rect::new(0.0, 0.0, f64::from(width), f64::from(height));

    let background = device.create_layer(display)?;
    device.set_layer_composition_type(display, background, CompositionType::Client)?;

    let video = device.create_layer(display)?;
    device.set_layer_composition_type(display, video, CompositionType::Device)?;
    device.set_layer_z_order(display, video, 1)?;

    let cursor = device.create_layer(display)?;
    device.set_layer_composition_type(display, cursor, CompositionType::Cursor)?;
    device.set_layer_z_order(display, cursor, 2)?;
    device.set_layer_buffer(display, cursor, Some(CURSOR_BUFFER), Fence::signaled())?;

    let found = device.display(display)?;
    found.set_layer_display_frame(background, full)?;
    found.set_layer_display_frame(video, full.inset(-64.0))?;
    found.set_layer_display_frame(cursor, Rect::new(0.0, 0.0, 32.0, 32.0))?;

    Ok(Stack {
        background,
        video,
        cursor,
    })
}

fn present_frame(
    device: &Device,
    display: DisplayId,
    stack: &Stack,
    handle: &ScriptHandle,
    frame: u64,
) -> hwcompat_core::Result<()> {
    // A new video buffer every frame; the background only every 30.
    device.set_layer_buffer(display, stack.video, Some(BufferHandle(0x1000 + frame % 3)), Fence::signaled())?;
    if frame % 30 == 0 {
        device.set_layer_buffer(
            display,
            stack.background,
            Some(BufferHandle(0x2000 + frame / 30 % 2)),
            Fence::signaled(),
        )?;
    }

    let summary = device.validate(display)?;
    if summary.status == ValidateStatus::HasChanges {
        info!("frame {frame}: accepting {} type change(s)", summary.num_type_changes);
        device.accept_changes(display)?;
    }

    device.set_client_target(
        display,
        Some(BufferHandle(0x3000 + frame % 2)),
        Fence::signaled(),
        Dataspace::UNKNOWN,
        Vec::new(),
    )?;
    let _retire = device.present(display)?;
    handle.signal_all();

    // The cursor only moves once it is committed to the cursor plane.
    let x = (frame * 8) as f64;
    if let Err(err) = device.set_cursor_position(display, stack.cursor, x, x / 2.0) {
        warn!("frame {frame}: cursor not moved: {err}");
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::new()
        .parse_filters(&std::env::var("HWCOMPAT_LOG").unwrap_or_else(|_| log_level.to_string()))
        .init();

    let mut config = AdapterConfig::load(&args.config)?;
    config.vsync.start_enabled = true;

    let (backend, handle) = ScriptedBackend::single(args.width, args.height);
    handle.force_buffer(CURSOR_BUFFER, BackendComposition::CursorOverlay);
    let device = Device::open(Box::new(backend), config)?;
    if args.trace {
        device.set_trace_sink(Some(Box::new(PrettyPrintSink::stderr())));
    }

    device.register_callback(Callback::hotplug(|display, connection| {
        if connection == Connection::Connected {
            info!("{display:?} connected");
        }
    }));
    let (tx, rx) = mpsc::channel();
    device.register_callback(Callback::vsync(move |_, deadline| {
        let _ = tx.send(deadline);
    }));

    let display = device.create_display_if_absent()?.id();
    let stack = build_stack(&device, display, args.width, args.height)?;

    for frame in 0..args.frames {
        let deadline = rx.recv_timeout(Duration::from_secs(1))?;
        log::trace!("frame {frame} for deadline {deadline:?}");
        present_frame(&device, display, &stack, &handle, frame)?;
    }

    println!("{}", device.dump());
    device.shutdown();
    Ok(())
}
