use std::env;
use std::path::PathBuf;
use clap::Parser;
use crate::app::run_link;
use crate::config::io::ConfigIO;
use crate::error::AppRunError;

pub mod app;
pub mod config;
pub mod device;
pub mod effects;
pub mod error;
pub mod state;

/// Keeps the Sahay fall sensor connected and relays its alerts.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Path to the JSON config file; created with defaults when empty
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    pub log_level: log::LevelFilter,
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
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

pub fn run(args: Args) -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::new_sync(args.config)?;

    // held until exit; a second instance fails to lock
    let mut locker = config_io.locker()?;
    let _guard = locker.lock()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_link(config_io))
}
