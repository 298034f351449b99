// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Validate/accept/present display composition on a prepare/commit backend.
//!
//! `hwcompat_core` exposes the three-phase composition protocol (a client
//! validates its layer stack, accepts the compositor's type overrides, then
//! presents) on top of a backend that only understands a flat, synchronous
//! prepare-then-commit cycle.
//!
//! # Architecture
//!
//! ```text
//!   client ──► Device ──► Display (layers, Z order, latched state)
//!                │            │
//!                │            ├── validate ──► BackendFrame ──► prepare()
//!                │            │                    ◄── PrepareDecision[]
//!                │            └── present  ──► BackendFrame ──► commit()
//!                │                                 ◄── retire + release fences
//!                │
//!                └── VsyncSignaler ──► vsync callback (buffered until registered)
//! ```
//!
//! **[`device`]**: Registry of the display and its layers, callback
//! registration and dispatch, vsync ownership, shutdown.
//!
//! **[`display`]**: The per-display state machine (`Modified`,
//! `ValidatedWithChanges`, `ValidatedNoChanges`), frame building, decision
//! translation and fence distribution.
//!
//! **[`layer`]**: Layer identity, Z ordering and per-layer state with
//! pending/committed composition types.
//!
//! **[`backend`]**: The [`BackendCompositor`](backend::BackendCompositor)
//! trait a legacy compositor implements, and the flat frame it consumes.
//!
//! **[`fence`]**: Synchronization fences and the two-deep deferred release
//! queue.
//!
//! **[`latched`]**: Pending/committed value pairs with dirty transitions.
//!
//! **[`vsync`]**: A periodic deadline thread that catches up after stalls.
//!
//! **[`config`]**: TOML adapter configuration.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) hooks for protocol events.
//!
//! **[`buffer`]**, **[`time`]** and **[`error`]** hold the shared vocabulary.

pub mod backend;
pub mod buffer;
pub mod config;
pub mod device;
pub mod display;
pub mod error;
pub mod fence;
pub mod latched;
pub mod layer;
pub mod time;
pub mod trace;
pub mod vsync;

pub use error::{Error, Result};
