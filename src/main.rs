//! # IPB Bus
//!
//! Bench monitor and command tool for an appliance's inter-processor bus.
//!
//! ```bash
//! ipb-bus [config.toml] [command...]
//! ipb-bus config/default.toml dryer-start-pause machine-status
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use ipb_bus::appliance::ApplianceCommand;
use ipb_bus::bus::{ConnectionState, IpbBus, ReceivedFrame};
use ipb_bus::config::Config;
use ipb_bus::erd::library::{ErdLibrary, ErdLookup};
use ipb_bus::ipb::decoder::FrameReader;
use ipb_bus::logging::init_logging;
use ipb_bus::serial::IpbSerial;

/// Configuration file used when none is given and it exists
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Command line: optional config file followed by appliance commands
#[derive(Debug, PartialEq)]
struct Args {
    config_path: Option<PathBuf>,
    commands: Vec<ApplianceCommand>,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut args = args.into_iter().peekable();

    let config_path = match args.peek() {
        Some(first) if first.ends_with(".toml") => args.next().map(PathBuf::from),
        _ => None,
    };

    let commands = args
        .map(|arg| arg.parse::<ApplianceCommand>())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Args {
        config_path,
        commands,
    })
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::load(DEFAULT_CONFIG_PATH).with_context(|| format!("loading {}", DEFAULT_CONFIG_PATH))
        }
        None => Ok(Config::default()),
    }
}

/// Open the configured port, retrying at the reconnect interval
async fn open_serial(config: &Config) -> IpbSerial {
    loop {
        match IpbSerial::open_with_paths(&[config.serial.port.as_str()], config.serial.baud_rate) {
            Ok(serial) => return serial,
            Err(e) => {
                warn!("{}; retrying in {} ms", e, config.serial.reconnect_interval_ms);
                tokio::time::sleep(config.reconnect_interval()).await;
            }
        }
    }
}

fn print_frame(received: ReceivedFrame) {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");

    match received.decoded {
        Ok(Some(message)) => println!("{} {}", timestamp, message),
        Ok(None) => println!(
            "{} [0x{:02X}] {:02x?}",
            timestamp, received.frame.message_type, received.frame.payload
        ),
        Err(e) => warn!("Could not decode frame: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let config = load_config(args.config_path.as_deref())?;
    let _log_guard = init_logging(&config.logging);

    info!("IPB Bus v{} starting...", env!("CARGO_PKG_VERSION"));

    let erds: Arc<dyn ErdLookup> = Arc::new(
        ErdLibrary::load(&config.erd.dictionary_path)
            .with_context(|| format!("loading ERD dictionary {}", config.erd.dictionary_path))?,
    );

    let serial = tokio::select! {
        serial = open_serial(&config) => serial,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C before the port opened");
            return Ok(());
        }
    };
    info!("IPB serial port opened at: {}", serial.device_path());

    let bus = IpbBus::new(
        serial,
        erds,
        config.frame_encoder(),
        ConnectionState::new(config.bus.initial_key_count),
    );

    let mut reception = bus.reception_loop(FrameReader::new(config.frame_format()), Some(config.read_timeout()));
    let mut loop_task = tokio::spawn(async move { reception.run(print_frame).await });

    for command in args.commands {
        bus.send_appliance_command(command).await?;
    }

    info!("Press Ctrl+C to exit");

    tokio::select! {
        result = &mut loop_task => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            bus.stop().await;
            loop_task.await??;
        }
    }

    let state = bus.state().await;
    info!(
        "Total frames received: {}, checksum errors: {}",
        state.frames_received(),
        state.error_count()
    );

    Ok(())
}
