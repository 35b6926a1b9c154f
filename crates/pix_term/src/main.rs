#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use flexi_logger::Logger;
use pix_engine::{CanvasConfig, CanvasEvent, ColorValue, ConnectionManager, ConnectionState, MemorySurface, PaletteRegistry, PixelUpdate, Protocol, Relay};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log every frame
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Paint one cell and wait until the relay echoes it back
    Paint {
        #[arg(short, long)]
        x: i32,
        #[arg(short, long)]
        y: i32,
        /// Palette index, or #rrggbb for the text protocol
        #[arg(short, long)]
        color: String,
    },
    /// Stay connected and log every committed change
    Watch,
    /// Host the relay
    Relay,
    /// List the registered palettes
    Palettes,
    /// Write the effective configuration to the given file
    InitConfig {
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CanvasConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => CanvasConfig::load_default()?,
    };
    config.debug_logging |= args.debug;

    let log_spec = if config.debug_logging { "debug" } else { "info" };
    let _logger = Logger::try_with_str(log_spec)?.log_to_stderr().start()?;

    let registry = config.registry()?;
    config.validate(&registry)?;

    match args.command {
        Command::Paint { x, y, color } => paint(&config, registry, x, y, &color).await,
        Command::Watch => watch(&config, registry).await,
        Command::Relay => relay(&config, &registry).await,
        Command::Palettes => {
            for name in registry.list_palettes() {
                let palette = registry.palette(name)?;
                let colors: Vec<String> = palette.colors().iter().map(pix_engine::Color::to_hex).collect();
                println!("{name:10} {}", colors.join(" "));
            }
            Ok(())
        }
        Command::InitConfig { path } => {
            let Some(path) = path.or_else(CanvasConfig::default_path) else {
                bail!("no configuration directory available, pass a path");
            };
            config.store(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn parse_color(config: &CanvasConfig, color: &str) -> anyhow::Result<ColorValue> {
    Ok(match config.protocol {
        Protocol::Binary => ColorValue::Index(color.parse().with_context(|| format!("'{color}' is not a palette index"))?),
        Protocol::Text => ColorValue::Rgb(pix_engine::Color::from_hex(color)?),
    })
}

fn new_session(
    config: &CanvasConfig,
    registry: PaletteRegistry,
) -> anyhow::Result<(ConnectionManager<MemorySurface>, tokio::sync::mpsc::UnboundedReceiver<CanvasEvent>)> {
    let surface = MemorySurface::new(config.width, config.height, pix_engine::Color::default());
    let (mut manager, events) = ConnectionManager::new(config, Arc::new(registry), surface)?;
    manager.connect()?;
    Ok((manager, events))
}

/// What `paint` does next in reaction to one canvas event.
#[derive(Debug, PartialEq, Eq)]
enum PaintStep {
    Wait,
    Send(PixelUpdate),
    Done,
    Failed(String),
}

/// Tracks one paint request from connect to echo.
///
/// Commits seen before the send are catch-up replay and never count. A replayed
/// cell that already holds the color may still arrive after the send and end the
/// request early; the frame is queued ahead of the close and reaches the relay anyway.
struct PaintRequest {
    update: PixelUpdate,
    sent: bool,
}

impl PaintRequest {
    fn new(update: PixelUpdate) -> Self {
        Self { update, sent: false }
    }

    fn on_event(&mut self, event: CanvasEvent) -> PaintStep {
        match event {
            CanvasEvent::StateChanged(ConnectionState::Open) if !self.sent => {
                self.sent = true;
                PaintStep::Send(self.update)
            }
            CanvasEvent::Committed(committed) if self.sent && committed == self.update => PaintStep::Done,
            CanvasEvent::TransportFailed(message) => PaintStep::Failed(message),
            _ => PaintStep::Wait,
        }
    }
}

async fn paint(config: &CanvasConfig, registry: PaletteRegistry, x: i32, y: i32, color: &str) -> anyhow::Result<()> {
    let update = PixelUpdate::new(x, y, parse_color(config, color)?);
    let (mut manager, mut events) = new_session(config, registry)?;

    let mut request = PaintRequest::new(update);
    while manager.process_next().await {
        while let Ok(event) = events.try_recv() {
            match request.on_event(event) {
                PaintStep::Send(update) => manager.send(update)?,
                PaintStep::Done => {
                    log::info!("Painted ({}, {})", update.x, update.y);
                    manager.close();
                }
                PaintStep::Failed(message) => bail!("transport failed: {message}"),
                PaintStep::Wait => {}
            }
        }
    }
    if !request.sent {
        bail!("relay at {} never accepted the connection", manager.url());
    }
    Ok(())
}

async fn watch(config: &CanvasConfig, registry: PaletteRegistry) -> anyhow::Result<()> {
    let (mut manager, mut events) = new_session(config, registry)?;
    loop {
        tokio::select! {
            more = manager.process_next() => {
                if !more {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                manager.close();
            }
        }
        while let Ok(event) = events.try_recv() {
            match event {
                CanvasEvent::Committed(update) => log::info!("({}, {}) = {:?}", update.x, update.y, update.color),
                CanvasEvent::StateChanged(state) => log::info!("Connection {state:?}"),
                _ => {}
            }
        }
    }
    Ok(())
}

async fn relay(config: &CanvasConfig, registry: &PaletteRegistry) -> anyhow::Result<()> {
    let relay = Relay::bind(config, registry).await?;
    let addr = relay.local_addr()?;
    println!("Relay listening on ws://{addr}/ws ({:?} protocol, {}x{})", config.protocol, config.width, config.height);
    println!("Press Ctrl+C to stop the relay");

    tokio::select! {
        result = relay.run() => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Relay shutdown complete"),
    }
    Ok(())
}
