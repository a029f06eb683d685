// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fence-synchronized buffer ring and presentation loop.
//!
//! `scanout_core` drives a small ring of presentable buffers through a
//! display compositor. Rendering, scan-out and buffer release are three
//! independent asynchronous actors; the loop coordinates them through
//! explicit fences instead of CPU-side stalls.
//!
//! # Architecture
//!
//! Each iteration of the [`PresentLoop`](pipeline::PresentLoop) flows
//! strictly forward:
//!
//! ```text
//!   BufferRing::acquire_back_buffer() ──► RenderStage::draw_frame()
//!                                              │ acquire fence
//!                 ┌────────────────────────────┘
//!                 ▼
//!   PresentStage::submit() ──► release fence ──► BufferRing::mark_in_flight()
//!                                                    │
//!                 ┌──────────────────────────────────┘
//!                 ▼
//!   wait-or-defer ──► BufferRing::reclaim(previous front) ──► next frame
//! ```
//!
//! **[`fence`]**: [`NativeFence`](fence::NativeFence) descriptors with a
//! ledger that proves every fence is disposed exactly once,
//! [`SyncFile`](fence::SyncFile) for kernel `sync_file` descriptors, the
//! [`ExplicitSync`](fence::ExplicitSync) capability probe, and the
//! cancellation-aware [`FenceWaiter`](fence::FenceWaiter).
//!
//! **[`ring`]**: [`BufferRing`](ring::BufferRing): free / rendering /
//! in-flight bookkeeping, front-buffer tracking and release-gated reclaim.
//!
//! **[`render`]** and **[`present`]**: the two stages that hand a buffer
//! from the GPU to the compositor.
//!
//! **[`pipeline`]**: the loop itself, its [`LoopConfig`](pipeline::LoopConfig)
//! and teardown.
//!
//! **[`backend`]**: the collaborator traits platform crates implement.
//!
//! **[`vsync`]**: vblank notifications delivered over a bounded channel and
//! frame-rate accounting.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! per-phase loop instrumentation.
//!
//! # Crate features
//!
//! - `serde` (disabled by default): `Serialize`/`Deserialize` for
//!   configuration types.

pub mod backend;
pub mod buffer;
pub mod cancel;
pub mod display;
pub mod error;
pub mod fence;
pub mod pipeline;
pub mod present;
pub mod render;
pub mod ring;
pub mod time;
pub mod trace;
pub mod vsync;

#[cfg(test)]
mod testing;

pub use error::{PresentError, PresentResult};
