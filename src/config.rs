//! Startup configuration: command line flags and environment.
//!
//! `Args` is what clap parses; `ServerConfig` is the validated result that
//! gets handed to the router and the render thread. Nothing reads the
//! environment after this point.

use crate::auth::ApiKeyAuth;
use crate::{Error, MatrixConfig, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// LED matrix drawing server
#[derive(Parser, Debug)]
#[command(name = "led-controller")]
#[command(about = "API-key protected HTTP server that draws on an RGB LED matrix")]
#[command(version)]
pub struct Args {
    /// Shared secret clients must send in the API key header
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Header that carries the API key
    #[arg(long, default_value = crate::auth::DEFAULT_HEADER)]
    pub api_key_header: String,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Root directory containing images/ and fonts/
    #[arg(long, default_value = ".")]
    pub assets_dir: PathBuf,

    /// Rows per panel
    #[arg(long, default_value_t = 32)]
    pub rows: u32,

    /// Columns per panel
    #[arg(long, default_value_t = 64)]
    pub cols: u32,

    /// Panels daisy-chained per row
    #[arg(long, default_value_t = 1)]
    pub chain_length: u32,

    /// Parallel chains
    #[arg(long, default_value_t = 1)]
    pub parallel: u32,

    /// Panel brightness, 0-100
    #[arg(long, default_value_t = 75, allow_hyphen_values = true)]
    pub brightness: i32,

    /// rpi-rgb-led-matrix GPIO mapping name
    #[arg(long, default_value = "adafruit-hat")]
    pub hardware_mapping: String,

    /// GPIO slowdown; the Pi Zero 2 W needs 2
    #[arg(long, default_value_t = 2)]
    pub gpio_slowdown: u32,

    /// Milliseconds between animation frames
    #[arg(long, default_value_t = 50)]
    pub tick_ms: u64,

    /// Render into memory instead of driving a panel
    #[arg(long)]
    pub headless: bool,
}

/// Validated process-wide configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub auth: ApiKeyAuth,
    pub host: String,
    pub port: u16,
    pub assets_dir: PathBuf,
    pub matrix: MatrixConfig,
    pub tick: Duration,
    pub headless: bool,
}

impl ServerConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        let auth = ApiKeyAuth::new(&args.api_key_header, &args.api_key)?;

        let matrix = MatrixConfig::new(args.rows, args.cols, args.brightness)?
            .with_chain(args.chain_length, args.parallel)?
            .with_hardware_mapping(args.hardware_mapping)
            .with_gpio_slowdown(args.gpio_slowdown);

        if args.tick_ms == 0 {
            return Err(Error::Config("tick must be at least 1ms".to_string()));
        }

        Ok(Self {
            auth,
            host: args.host,
            port: args.port,
            assets_dir: args.assets_dir,
            matrix,
            tick: Duration::from_millis(args.tick_ms),
            headless: args.headless,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["led-controller", "--api-key", "k"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_single_adafruit_panel() {
        let config = ServerConfig::from_args(parse(&[])).unwrap();
        assert_eq!(config.matrix, MatrixConfig::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.tick, Duration::from_millis(50));
        assert_eq!(config.auth.header().as_str(), "x-api-key");
        assert!(!config.headless);
    }

    #[test]
    fn flags_override_defaults() {
        let config = ServerConfig::from_args(parse(&[
            "--rows",
            "16",
            "--cols",
            "32",
            "--chain-length",
            "2",
            "--brightness",
            "40",
            "--port",
            "9000",
            "--tick-ms",
            "20",
            "--headless",
        ]))
        .unwrap();
        assert_eq!(config.matrix.width(), 64);
        assert_eq!(config.matrix.height(), 16);
        assert_eq!(config.matrix.brightness(), 40);
        assert_eq!(config.port, 9000);
        assert_eq!(config.tick, Duration::from_millis(20));
        assert!(config.headless);
    }

    #[rstest]
    #[case("-1")]
    #[case("101")]
    fn out_of_range_brightness_fails_startup(#[case] brightness: &str) {
        let err = ServerConfig::from_args(parse(&["--brightness", brightness])).unwrap_err();
        assert!(matches!(err, Error::InvalidBrightness(_)));
    }

    #[test]
    fn empty_api_key_fails_startup() {
        let args = Args::try_parse_from(["led-controller", "--api-key", ""]).unwrap();
        assert!(matches!(
            ServerConfig::from_args(args),
            Err(Error::MissingApiKey)
        ));
    }

    #[test]
    fn zero_tick_fails_startup() {
        assert!(matches!(
            ServerConfig::from_args(parse(&["--tick-ms", "0"])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn non_numeric_brightness_is_a_parse_error() {
        assert!(
            Args::try_parse_from(["led-controller", "--api-key", "k", "--brightness", "max"])
                .is_err()
        );
    }
}
