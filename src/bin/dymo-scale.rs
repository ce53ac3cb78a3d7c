use clap::Parser;
use log::{info, error};
use tokio::runtime::Runtime;
use tokio::time::Duration;
use dymo_scale::{init_logging, run, Cli};
use dymo_scale::device::constants::SHUTDOWN_DEADLINE;
use dymo_scale::error::{AppRunError, ConfigError};

fn main() -> Result<(), AppRunError> {
    let cli = Cli::parse();
    init_logging(if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info });
    info!(concat!("dymo-scale ", env!("CARGO_PKG_VERSION")));

    let runtime = Runtime::new()?;
    let result = runtime.block_on(run(cli));
    // a read blocked on the scale would otherwise keep the process alive
    runtime.shutdown_timeout(Duration::from_millis(SHUTDOWN_DEADLINE));

    match result {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("Another dymo-scale process is already using this config file");
            Ok(())
        },
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
