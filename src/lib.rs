use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use clap::Parser;
use futures::StreamExt;
use futures::channel::mpsc::channel;
use log::{info, error, warn};
use tokio::time::{timeout, Duration};

use crate::config::io::ConfigIO;
use crate::device::constants::SHUTDOWN_DEADLINE;
use crate::device::types::{ScaleEvent, Status};
use crate::device::usb::RusbBackend;
use crate::driver::ScaleDriver;
use crate::error::AppRunError;

pub mod config;
pub mod device;
pub mod driver;
pub mod error;

/// Reads a DYMO USB shipping scale and prints every reading as a JSON line.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Path to the JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seconds between two reads (overrides the config file)
    #[arg(long)]
    pub read_interval: Option<f64>,

    /// Seconds between two connection attempts (overrides the config file)
    #[arg(long)]
    pub reconnect_interval: Option<f64>,

    /// Log debug messages
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn init_logging(level: log::LevelFilter) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        match fern::log_file(&log_file) {
            Ok(file) => dispatch = dispatch.chain(file),
            Err(err) => eprintln!("Failed to open LOG_FILE {}: {}", log_file, err),
        }
    }

    if let Err(err) = dispatch.apply() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}

pub async fn run(cli: Cli) -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync(cli.config)?;
    let mut locker = config_io.locker()?;
    let _guard = locker.lock()?;

    let mut config = config_io.read().await?;
    if let Some(read_interval) = cli.read_interval {
        config.read_interval = read_interval;
    }
    if let Some(reconnect_interval) = cli.reconnect_interval {
        config.reconnect_interval = reconnect_interval;
    }
    info!("Read interval {}s, reconnect interval {}s", config.read_interval, config.reconnect_interval);

    let backend = Arc::new(RusbBackend::new()?);
    let (sender, mut receiver) = channel::<ScaleEvent>(64);
    let mut driver = ScaleDriver::new(backend, config, vec![sender])?;
    driver.start();

    'mainloop: loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    error!("Failed to listen for ctrl-c: {}", err);
                }
                break 'mainloop;
            },
            event = receiver.next() => match event {
                None => break 'mainloop,
                Some(ScaleEvent::Reading(reading)) => {
                    match serde_json::to_string(&reading) {
                        Ok(line) => println!("{}", line),
                        Err(err) => error!("Failed to serialize reading: {}", err),
                    }
                },
                Some(ScaleEvent::Status(Status::Ok)) => info!("Scale status: ok"),
                Some(ScaleEvent::Status(Status::Warning)) => info!("Scale status: warning"),
            },
        }
    }

    info!("Stopping");
    driver.stop();
    drop(receiver);

    // the task may be blocked in a read that only ends when the scale sends a report
    if timeout(Duration::from_millis(SHUTDOWN_DEADLINE), driver.join()).await.is_err() {
        warn!("Scale driver did not stop in time");
    }
    Ok(())
}
