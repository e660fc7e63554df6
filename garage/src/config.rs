//! Runtime configuration and fixed UI constants.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const GARAGE_PAGE_SIZE: usize = 7;
pub const WINNERS_PAGE_SIZE: usize = 10;
pub const GENERATE_BATCH: usize = 100;

/// Redraw interval for moving cars.
pub const RENDER_TICK: Duration = Duration::from_millis(100);
/// Frame interval for the spinning wheel.
pub const WHEEL_TICK: Duration = Duration::from_millis(16);

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";

/// Every flag can also come from the environment or a `.env` file.
#[derive(Parser, Debug, Clone)]
#[command(name = "garage", about = "Race cars against a garage REST backend and spin a decision wheel")]
pub struct Config {
    /// Base URL of the garage/engine/winners API
    #[arg(long, env = "GARAGE_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// File holding the decision wheel options and preferences
    #[arg(long, env = "WHEEL_STORE", default_value = "wheel-store.json")]
    pub wheel_store: PathBuf,

    /// Width of a race lane in terminal columns
    #[arg(long, env = "TRACK_WIDTH", default_value_t = 60)]
    pub track_width: u16,
}

impl Config {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Config::parse()
    }
}

/// Shared subscriber setup for the binaries. Logs go to stderr so they do not
/// tear through the track display.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,garage=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["garage"]).unwrap();
        assert_eq!(config.track_width, 60);
        assert_eq!(config.wheel_store, PathBuf::from("wheel-store.json"));
    }

    #[test]
    fn test_flags_override() {
        let config = Config::try_parse_from([
            "garage",
            "--api-url",
            "http://example.test:9000",
            "--track-width",
            "80",
        ])
        .unwrap();
        assert_eq!(config.api_url, "http://example.test:9000");
        assert_eq!(config.track_width, 80);
    }
}
