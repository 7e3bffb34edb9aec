// SPDX-License-Identifier: MPL-2.0

//! Headless player: decodes a GIF on the worker thread and presents every
//! frame into an in-memory surface, optionally dumping each one as PNG.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use calloop::signals::{Signal, Signals};
use calloop::{EventLoop, channel};
use cosmic_anim::{
    AnimatedPlayer, CalloopScheduler, MemorySurface, PlayerConfig, PlayerEvent,
    PresentationBridge, RenderOutcome, WorkerState,
};
use eyre::{WrapErr, bail};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: cosmic-anim <file.gif> [--frames N] [--dump DIR]";

#[derive(Debug)]
struct Args {
    path: PathBuf,
    frames: Option<u64>,
    dump: Option<PathBuf>,
}

impl Args {
    fn parse() -> eyre::Result<Self> {
        let mut path = None;
        let mut frames = None;
        let mut dump = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--frames" => {
                    let value = args.next().ok_or_else(|| eyre::eyre!(USAGE))?;
                    frames = Some(value.parse::<u64>().wrap_err("--frames expects a number")?);
                }
                "--dump" => {
                    dump = Some(args.next().ok_or_else(|| eyre::eyre!(USAGE))?.into());
                }
                "-h" | "--help" => {
                    println!("{USAGE}");
                    std::process::exit(0);
                }
                _ if path.is_none() => path = Some(arg.into()),
                _ => bail!("unexpected argument {arg:?}\n{USAGE}"),
            }
        }

        Ok(Self {
            path: path.ok_or_else(|| eyre::eyre!(USAGE))?,
            frames,
            dump,
        })
    }
}

struct Demo {
    bridge: PresentationBridge<MemorySurface>,
    presented: u64,
    limit: Option<u64>,
    dump: Option<PathBuf>,
    running: bool,
}

impl Demo {
    fn on_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::FrameChanged { .. } => self.render(),
            PlayerEvent::StateChanged { from, to } => {
                debug!(%from, %to, "player state changed");
                if to == WorkerState::Disposed || (from == WorkerState::Running && to == WorkerState::Idle) {
                    // Present whatever was published last, then stop.
                    self.render();
                    self.running = false;
                }
            }
            PlayerEvent::Error(err) => {
                error!(%err, "playback failed");
                self.running = false;
            }
        }
    }

    fn render(&mut self) {
        match self.bridge.render_tick() {
            RenderOutcome::Presented { sequence, index } => {
                self.presented += 1;
                if let Some(dir) = &self.dump {
                    let path = dir.join(format!("frame-{sequence:05}-{index:03}.png"));
                    if let Err(why) = self.bridge.surface().snapshot().save(&path) {
                        warn!(?why, path = %path.display(), "failed to dump frame");
                    }
                }
                if self.limit.is_some_and(|limit| self.presented >= limit) {
                    info!(frames = self.presented, "frame limit reached");
                    self.running = false;
                }
            }
            RenderOutcome::Unchanged => {}
            RenderOutcome::Skipped(err) => debug!(%err, "render tick skipped"),
        }
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,cosmic_anim=info")),
        )
        .init();

    let args = Args::parse()?;
    let config = match PlayerConfig::load() {
        Ok(config) => config,
        Err(err) => {
            warn!(?err, "Config file error, falling back to defaults");
            PlayerConfig::fallback()
        }
    };

    if let Some(dir) = &args.dump {
        std::fs::create_dir_all(dir)
            .wrap_err_with(|| format!("failed to create {}", dir.display()))?;
    }

    let mut event_loop: EventLoop<'static, Demo> = EventLoop::try_new()?;
    let handle = event_loop.handle();

    let (events_tx, events_rx) = channel::channel::<PlayerEvent>();
    let player = AnimatedPlayer::open(&args.path, events_tx, &config)
        .wrap_err_with(|| format!("failed to open {}", args.path.display()))?;
    let header = player.header();
    info!(
        width = header.width,
        height = header.height,
        frames = header.frame_count,
        "playing animation"
    );

    let redraws = Arc::new(AtomicU64::new(0));
    let bridge = {
        let redraws = Arc::clone(&redraws);
        PresentationBridge::new(
            player.frame_store(),
            header,
            MemorySurface::new(header.width, header.height),
            Arc::new(CalloopScheduler::new(&handle)?),
            move || {
                redraws.fetch_add(1, Ordering::Relaxed);
            },
        )?
    };

    handle
        .insert_source(events_rx, |event, _, demo: &mut Demo| {
            if let channel::Event::Msg(event) = event {
                demo.on_event(event);
            }
        })
        .map_err(|err| eyre::eyre!("{}", err))?;

    let signals = Signals::new(&[Signal::SIGINT, Signal::SIGTERM])?;
    handle
        .insert_source(signals, |event, _, demo: &mut Demo| {
            info!(signal = ?event.signal(), "shutting down");
            demo.running = false;
        })
        .map_err(|err| eyre::eyre!("{}", err))?;

    if !config.autoplay {
        player.play();
    }

    let mut demo = Demo {
        bridge,
        presented: 0,
        limit: args.frames,
        dump: args.dump,
        running: true,
    };
    while demo.running {
        event_loop.dispatch(None, &mut demo)?;
    }

    let stats = player.frame_store().stats();
    player.shutdown();
    info!(
        presented = demo.presented,
        redraws = redraws.load(Ordering::Relaxed),
        published = stats.published,
        overwritten = stats.overwritten,
        "done"
    );
    Ok(())
}
