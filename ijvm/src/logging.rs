//! `tracing` setup shared by the command line tools

use tracing::level_filters::LevelFilter;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Level selected by the number of `-v` flags, off by default
pub fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::OFF,
        1 => LevelFilter::from_level(Level::INFO),
        2 => LevelFilter::from_level(Level::DEBUG),
        _ => LevelFilter::from_level(Level::TRACE),
    }
}

/// Install the global subscriber writing to stderr. `RUST_LOG` wins over `-v`.
pub fn init(verbose: u8) -> Result<(), SetGlobalDefaultError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbose).to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}
