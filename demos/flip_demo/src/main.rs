// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runs a presentation loop against the simulated display.
//!
//! Frames flow through the fence-synchronized buffer ring in either release
//! mode. Every trace event is recorded with a
//! [`RecorderSink`](scanout_debug::recorder::RecorderSink) and can be exported
//! as Chrome trace JSON; `--pretty` also prints the events as they happen.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use scanout_backend_sim::{FlipMode, SimCompositor, SimConfig, SimSurface};
use scanout_core::backend::Compositor;
use scanout_core::buffer::BufferDesc;
use scanout_core::cancel::CancelToken;
use scanout_core::display::DisplayConfig;
use scanout_core::pipeline::{LoopConfig, PresentLoop, ReleaseMode};
use scanout_core::time::Timebase;
use scanout_core::trace::{
    FrameBeginEvent, FrameSummary, PhaseBeginEvent, PhaseEndEvent, ReclaimEvent, RingEvent,
    SubmitEvent, TraceSink, Tracer,
};
use scanout_core::vsync::VsyncEvent;
use scanout_debug::chrome;
use scanout_debug::pretty::PrettyPrintSink;
use scanout_debug::recorder::RecorderSink;
use tracing_subscriber::EnvFilter;

const DEFAULT_FRAMES: u64 = 120;

#[derive(Parser, Debug)]
#[command(name = "flip_demo", version)]
struct Cli {
    /// Stop after this many frames (default 120 unless --duration-ms is set).
    #[arg(long)]
    frames: Option<u64>,

    /// Cancel the loop from another thread after this many milliseconds.
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Release mode; picks the double- or triple-buffered preset.
    #[arg(long, value_enum, default_value_t = ModeChoice::Sync)]
    mode: ModeChoice,

    /// Loop configuration JSON, used instead of the preset.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of ring buffers.
    #[arg(long)]
    buffers: Option<u8>,

    /// Override the pipeline depth.
    #[arg(long)]
    depth: Option<u8>,

    /// Display refresh rate in millihertz.
    #[arg(long, default_value_t = 60_000)]
    refresh_mhz: u32,

    /// Replace flips that have not latched yet instead of queueing them.
    #[arg(long)]
    mailbox: bool,

    /// Simulated GPU time per frame, in milliseconds.
    #[arg(long, default_value_t = 4)]
    render_latency_ms: u64,

    /// Write a Chrome trace JSON file.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Print trace events to stderr as they happen.
    #[arg(long)]
    pretty: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    /// Two buffers, block on release every frame.
    Sync,
    /// Three buffers, keep release fences outstanding.
    Deferred,
}

/// Forwards every event to the recorder and, optionally, the printer.
struct Sinks {
    recorder: RecorderSink,
    pretty: Option<PrettyPrintSink>,
}

impl Sinks {
    fn each(&mut self, mut f: impl FnMut(&mut dyn TraceSink)) {
        f(&mut self.recorder);
        if let Some(pretty) = &mut self.pretty {
            f(pretty);
        }
    }
}

impl TraceSink for Sinks {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        self.each(|s| s.on_frame_begin(e));
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.each(|s| s.on_phase_begin(e));
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.each(|s| s.on_phase_end(e));
    }

    fn on_submit(&mut self, e: &SubmitEvent) {
        self.each(|s| s.on_submit(e));
    }

    fn on_reclaim(&mut self, e: &ReclaimEvent) {
        self.each(|s| s.on_reclaim(e));
    }

    fn on_ring(&mut self, e: &RingEvent) {
        self.each(|s| s.on_ring(e));
    }

    fn on_vsync(&mut self, e: &VsyncEvent) {
        self.each(|s| s.on_vsync(e));
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.each(|sink| sink.on_frame_summary(s));
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let sim = SimConfig {
        modes: vec![DisplayConfig {
            refresh_mhz: cli.refresh_mhz,
            ..SimConfig::default().modes[0]
        }],
        render_latency: Duration::from_millis(cli.render_latency_ms),
        flip_mode: if cli.mailbox {
            FlipMode::Mailbox
        } else {
            FlipMode::Fifo
        },
        ..SimConfig::default()
    };
    let ctx = scanout_backend_sim::context(&sim).context("start simulated display")?;
    let monitor = ctx.compositor.monitor();

    let modes =
        <SimCompositor as Compositor<SimSurface>>::display_configs(&ctx.compositor, ctx.display);
    let active =
        <SimCompositor as Compositor<SimSurface>>::active_config(&ctx.compositor, ctx.display);
    for mode in &modes {
        tracing::info!(
            id = mode.id,
            width = mode.width,
            height = mode.height,
            refresh_mhz = mode.refresh_mhz,
            dpi_x = mode.dpi_x,
            dpi_y = mode.dpi_y,
            active = active == Some(mode.id),
            "display mode"
        );
    }
    let target = modes
        .iter()
        .find(|mode| Some(mode.id) == active)
        .or(modes.first())
        .context("display reports no modes")?;

    let config = loop_config(&cli, target)?;
    let cancel = CancelToken::new();
    if let Some(ms) = cli.duration_ms {
        let cancel = cancel.clone();
        thread::Builder::new()
            .name("flip-demo-timer".into())
            .spawn(move || {
                thread::sleep(Duration::from_millis(ms));
                tracing::info!(after_ms = ms, "cancelling");
                cancel.cancel();
            })
            .context("spawn timer")?;
    }

    let mut sinks = Sinks {
        recorder: RecorderSink::new(),
        pretty: cli
            .pretty
            .then(|| PrettyPrintSink::stderr(Timebase::NANOS).without_vsync()),
    };
    let mut present = PresentLoop::new(ctx, config, cancel).context("start presentation loop")?;
    let outcome = present.run_traced(&mut Tracer::new(&mut sinks));

    let stats = *present.stats();
    let ledger = present.ledger().clone();
    drop(present);
    tracing::info!(
        frames = stats.frames_presented,
        release_waits = stats.release_waits,
        reclaimed = stats.buffers_reclaimed,
        vsync_events = stats.vsync_events,
        fences_created = ledger.created(),
        fences_outstanding = ledger.outstanding(),
        "done"
    );
    let screen = monitor.stats();
    tracing::info!(
        vblanks = screen.vblanks,
        flips = screen.flips,
        skipped = screen.skipped,
        "display"
    );

    if let Some(path) = &cli.trace_out {
        write_trace(path, sinks.recorder.as_bytes())?;
    }
    let exit = outcome.context("presentation loop failed")?;
    tracing::info!(?exit, "loop exited");
    Ok(())
}

fn loop_config(cli: &Cli, mode: &DisplayConfig) -> anyhow::Result<LoopConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
            serde_json::from_reader(file)
                .with_context(|| format!("parse config '{}'", path.display()))?
        }
        None => {
            let desc = BufferDesc {
                width: mode.width,
                height: mode.height,
                ..BufferDesc::default()
            };
            match cli.mode {
                ModeChoice::Sync => LoopConfig::double_buffered(desc),
                ModeChoice::Deferred => LoopConfig::triple_buffered(desc),
            }
        }
    };
    if let Some(buffers) = cli.buffers {
        config.buffer_count = buffers;
    }
    if let Some(depth) = cli.depth {
        config.pipeline_depth = depth;
    }
    config.max_frames = match (cli.frames, cli.duration_ms) {
        (Some(frames), _) => Some(frames),
        (None, Some(_)) => None,
        (None, None) => config.max_frames.or(Some(DEFAULT_FRAMES)),
    };
    config.validate().context("invalid loop configuration")?;
    tracing::info!(
        buffers = config.buffer_count,
        depth = config.pipeline_depth,
        synchronous = config.release_mode == ReleaseMode::Synchronous,
        max_frames = ?config.max_frames,
        "loop configuration"
    );
    Ok(config)
}

fn write_trace(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("create '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    chrome::export(bytes, Timebase::NANOS, &mut writer)
        .with_context(|| format!("write trace '{}'", path.display()))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "chrome trace written");
    Ok(())
}
