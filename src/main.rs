//! Camera sender: captures USB endoscope cameras and streams frames over TCP

// Use jemalloc for better memory management (optional feature)
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use supercam_stream::capture::PacketSource;
use supercam_stream::config::Config;
use supercam_stream::SenderApp;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "supercam-sender")]
#[command(about = "Capture USB endoscope cameras and stream JPEG frames to one TCP client")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stream transport (only "tcp" is implemented)
    #[arg(short, long)]
    transport: String,

    /// Listen address
    #[arg(long)]
    bind: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of cameras to open
    #[arg(long)]
    camera_count: Option<u16>,

    /// Send rate cap in frames per second (0 = unlimited)
    #[arg(long)]
    max_fps: Option<u32>,

    /// Log stream stats every N sent frames (0 = never)
    #[arg(long)]
    log_every: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        let sender = &mut config.sender;
        sender.transport = self.transport.clone();
        if let Some(bind) = &self.bind {
            sender.bind = bind.clone();
        }
        if let Some(port) = self.port {
            sender.port = port;
        }
        if let Some(count) = self.camera_count {
            sender.camera_count = count;
        }
        if let Some(max_fps) = self.max_fps {
            sender.max_fps = max_fps;
        }
        if let Some(log_every) = self.log_every {
            sender.log_every = log_every;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let mut config = match &cli.config {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            Config::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => Config::default(),
    };
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    info!(
        transport = %config.sender.transport,
        bind = %config.sender.bind,
        port = %config.sender.port,
        cameras = %config.sender.camera_count,
        max_fps = %config.sender.max_fps,
        "Configuration loaded"
    );

    let transports = open_cameras(&config)?;
    let app = SenderApp::start(&config, transports).context("failed to start sender")?;

    let handle = app.shutdown_handle();
    ctrlc::set_handler(move || handle.shutdown()).context("failed to install Ctrl-C handler")?;

    info!(addr = %app.local_addr(), "Streaming started, press Ctrl+C to stop");
    let stats = app.wait();

    info!(
        sent = %stats.frames_sent,
        clients = %stats.clients_served,
        overwrite_rate = %format!("{:.3}", stats.overwrite_rate()),
        "Shutdown complete"
    );

    Ok(())
}

#[cfg(feature = "usb")]
fn open_cameras(config: &Config) -> Result<Vec<Box<dyn PacketSource>>> {
    use supercam_stream::capture::usb::{self, UsbCamera};
    use tracing::warn;

    let available = usb::available_devices();
    if available == 0 {
        anyhow::bail!("no supported camera connected");
    }

    let requested = config.sender.camera_count as usize;
    let count = if requested > available {
        warn!(
            requested = %requested,
            available = %available,
            "Fewer cameras connected than requested, using all available"
        );
        available
    } else {
        requested
    };

    (0..count as u16)
        .map(|index| {
            UsbCamera::open(index, config.usb_settings())
                .map(|camera| Box::new(camera) as Box<dyn PacketSource>)
                .with_context(|| format!("failed to open camera {}", index))
        })
        .collect()
}

#[cfg(not(feature = "usb"))]
fn open_cameras(_config: &Config) -> Result<Vec<Box<dyn PacketSource>>> {
    anyhow::bail!("camera capture requires the `usb` feature (rebuild with --features usb)")
}
