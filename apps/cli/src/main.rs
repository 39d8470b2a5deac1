use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use turing_core::{
    Asset, AssetData, Brightness, DeviceSession, DisplayConfig, DisplayMode, DisplaySettings,
    DisplaySetup, Enumerator, FleetConfig, NusbBackend, NusbTransport, Orchestrator, PixelBuffer,
    PixelFormat, PngBandEncoder, Rotation, Selector, SessionConfig, TracingObserver, TransferPlan,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Turing smart screen USB tool (Pure Rust)", long_about = None)]
struct Args {
    /// Device index or serial (prefix). Defaults to the first device.
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List attached panels
    ListDevices,
    /// Ping the panel
    Sync,
    /// Reboot the panel
    Restart,
    /// Set backlight brightness
    Brightness {
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=102))]
        value: u8,
    },
    /// Persist display settings
    Save {
        #[arg(long, default_value_t = 102, value_parser = clap::value_parser!(u8).range(0..=102))]
        brightness: u8,
        #[arg(long, value_enum, default_value_t = ModeArg::Stats)]
        mode: ModeArg,
        /// 0 for 0°, 2 for 180° (applied after restart)
        #[arg(long, default_value_t = 0, value_parser = parse_rotation)]
        rotation: u8,
        #[arg(long, default_value_t = 0)]
        sleep: u8,
        #[arg(long)]
        offline: bool,
    },
    /// Upload an image into panel storage. PNG files over 512 KiB are
    /// split into bands.
    SendImage {
        #[arg(long)]
        path: PathBuf,
        /// Treat the file as raw pixels of this size, e.g. 480x1920
        #[arg(long, value_name = "WIDTHxHEIGHT")]
        raw: Option<String>,
        /// Raw pixels are RGBA instead of RGB
        #[arg(long, requires = "raw")]
        alpha: bool,
        /// Storage file name (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Upload an H.264 Annex-B stream into panel storage
    SendVideo {
        #[arg(long)]
        path: PathBuf,
        /// Storage file name (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Configure several panels from a TOML file
    Fleet {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Stats,
    Image,
    Video,
}

impl From<ModeArg> for DisplayMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Stats => DisplayMode::Stats,
            ModeArg::Image => DisplayMode::Image,
            ModeArg::Video => DisplayMode::Video,
        }
    }
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let backend = NusbBackend::new();
    let selector = match &args.device {
        Some(s) => s.parse()?,
        None => Selector::First,
    };

    match args.command {
        Commands::ListDevices => list_devices(&backend),
        Commands::Sync => with_session(&backend, &selector, |s| Ok(s.sync()?)),
        Commands::Restart => with_session(&backend, &selector, |s| Ok(s.restart()?)),
        Commands::Brightness { value } => with_session(&backend, &selector, |s| {
            Ok(s.set_brightness(Brightness::new(value)?)?)
        }),
        Commands::Save {
            brightness,
            mode,
            rotation,
            sleep,
            offline,
        } => {
            let settings = DisplaySettings {
                mode: mode.into(),
                brightness: Brightness::new(brightness)?,
                rotation: Rotation::try_from(rotation)?,
                sleep_timeout: sleep,
                offline,
            };
            with_session(&backend, &selector, |s| Ok(s.save_settings(&settings)?))
        }
        Commands::SendImage {
            path,
            raw,
            alpha,
            name,
        } => {
            let name = storage_name(&path, name)?;
            let bytes = read_file(&path)?;
            let plan = match raw {
                Some(size) => {
                    let (width, height) = parse_size(&size)?;
                    let format = if alpha {
                        PixelFormat::Rgba8
                    } else {
                        PixelFormat::Rgb8
                    };
                    let pixels = PixelBuffer::new(width, height, format, bytes)?;
                    TransferPlan::image(&pixels, &PngBandEncoder::default(), &name)?
                }
                None => TransferPlan::png_file(bytes, &name)?,
            };
            upload(&backend, &selector, &plan)
        }
        Commands::SendVideo { path, name } => {
            let name = storage_name(&path, name)?;
            let plan = TransferPlan::video(read_file(&path)?, &name)?;
            upload(&backend, &selector, &plan)
        }
        Commands::Fleet { config } => fleet(&backend, &config),
    }
}

fn list_devices(backend: &NusbBackend) -> Result<()> {
    let devices = Enumerator::new(backend).list()?;
    if devices.is_empty() {
        println!("No Turing Smart Screen devices found");
        return Ok(());
    }
    println!(
        "{:<6} {:<24} {:<12} {:<20} {}",
        "INDEX", "SERIAL", "BUS", "PRODUCT", "FIRMWARE"
    );
    for (index, device) in devices.iter().enumerate() {
        println!(
            "{:<6} {:<24} {:<12} {:<20} {}",
            index,
            device.serial,
            device.bus_path,
            device.product.as_deref().unwrap_or("-"),
            device.firmware_display()
        );
    }
    Ok(())
}

/// Resolve, open, handshake, run `op`, close.
fn with_session<F>(backend: &NusbBackend, selector: &Selector, op: F) -> Result<()>
where
    F: FnOnce(&mut DeviceSession<NusbTransport>) -> Result<()>,
{
    let identity = Enumerator::new(backend).resolve(selector)?;
    info!(device = %identity, "Using device");

    let mut session = DeviceSession::open_with_observer(
        backend,
        &identity,
        SessionConfig::default(),
        Arc::new(TracingObserver),
    )?;
    session.handshake()?;
    op(&mut session)?;
    session.close();
    Ok(())
}

fn upload(backend: &NusbBackend, selector: &Selector, plan: &TransferPlan) -> Result<()> {
    with_session(backend, selector, |s| {
        let report = s.upload(plan)?;
        println!(
            "Uploaded {} bytes to {} in {} chunk(s)",
            report.bytes, report.destination, report.chunks
        );
        Ok(())
    })
}

fn fleet(backend: &NusbBackend, path: &Path) -> Result<()> {
    let config = FleetConfig::load_from_file(path)?;
    if config.displays.is_empty() {
        bail!("{} lists no displays", path.display());
    }
    let setups = config
        .displays
        .iter()
        .map(display_setup)
        .collect::<Result<Vec<_>>>()?;

    let results = Orchestrator::from_config(backend, &config).apply(&setups);

    let mut failed = 0;
    for result in &results {
        let serial = result.serial.as_deref().unwrap_or("-");
        match &result.outcome {
            Ok(_) => println!("[{}] {} ({}): ok", result.position, serial, result.mode),
            Err(e) => {
                failed += 1;
                println!("[{}] {} ({}): {}", result.position, serial, result.mode, e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} displays failed", failed, results.len());
    }
    Ok(())
}

fn display_setup(display: &DisplayConfig) -> Result<DisplaySetup> {
    let asset = match (&display.image, &display.video) {
        (Some(_), Some(_)) => bail!("a display takes either an image or a video, not both"),
        (Some(path), None) => Some(Asset {
            name: storage_name(path, display.name.clone())?,
            data: AssetData::EncodedImage(read_file(path)?),
        }),
        (None, Some(path)) => Some(Asset {
            name: storage_name(path, display.name.clone())?,
            data: AssetData::Video(read_file(path)?),
        }),
        (None, None) => None,
    };
    Ok(DisplaySetup {
        selector: display.selector()?,
        settings: display.settings(),
        asset,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn storage_name(path: &Path, name: Option<String>) -> Result<String> {
    match name {
        Some(name) => Ok(name),
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("cannot derive a storage name from {}", path.display())),
    }
}

fn parse_rotation(s: &str) -> Result<u8, String> {
    match s {
        "0" => Ok(0),
        "2" => Ok(2),
        _ => Err("rotation must be 0 or 2".to_string()),
    }
}

fn parse_size(size: &str) -> Result<(u32, u32)> {
    let (w, h) = size
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT, got '{}'", size))?;
    Ok((
        w.trim().parse().context("invalid width")?,
        h.trim().parse().context("invalid height")?,
    ))
}
