use crate::cli::Args;
use antenna_controller::RotorSettings;
use sdr::CaptureSettings;
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),
    #[error("rotator.address `{0}` is not an IP address")]
    InvalidAddress(String),
    #[error("{0} must not be 0")]
    ZeroPort(&'static str),
    #[error("server.port {0} is outside 1024..=65535")]
    ListenPort(u16),
    #[error("log.verbosity {0} is outside 0..=3")]
    Verbosity(u8),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub rotator: RotatorConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub sdr: SdrConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatorConfig {
    pub address: String,
    pub azimuth_port: u16,
    pub elevation_port: u16,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    #[serde(default = "default_flush_window")]
    pub flush_window_millis: u64,
    #[serde(default = "default_calibration")]
    pub calibration_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_command_timeout() -> u64 {
    120
}

fn default_flush_window() -> u64 {
    10
}

fn default_calibration() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub program: String,
    pub modulation: String,
    pub sample_rate: u32,
    pub squelch: i32,
    pub oversample: u32,
    pub device: String,
    pub output_dir: PathBuf,
    pub stop_grace_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdrConfig {
    pub address: SocketAddr,
    pub retry_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub verbosity: u8,
    pub file: Option<PathBuf>,
}

impl Config {
    /// Loads the configuration file (optional), then `GSC_*` environment
    /// variables, then command line overrides, and validates the result.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&args.config).required(false))
            // e.g. GSC_ROTATOR__AZIMUTH_PORT=4533
            .add_source(
                config::Environment::with_prefix("GSC")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("rotator.address", args.remote_addr.clone())?
            .set_override_option("rotator.azimuth_port", args.azimuth_port.map(i64::from))?
            .set_override_option("rotator.elevation_port", args.elevation_port.map(i64::from))?
            .set_override_option("server.port", args.request_port.map(i64::from))?
            .set_override_option("log.verbosity", args.verbosity.map(i64::from))?
            .set_override_option(
                "log.file",
                args.log_file.as_ref().map(|path| path.display().to_string()),
            )?
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Checks everything the rotator and listener need before anything moves.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rotator.address.trim().parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidAddress(self.rotator.address.clone()));
        }
        if self.rotator.azimuth_port == 0 {
            return Err(ConfigError::ZeroPort("rotator.azimuth_port"));
        }
        if self.rotator.elevation_port == 0 {
            return Err(ConfigError::ZeroPort("rotator.elevation_port"));
        }
        if self.server.port < 1024 {
            return Err(ConfigError::ListenPort(self.server.port));
        }
        if self.log.verbosity > 3 {
            return Err(ConfigError::Verbosity(self.log.verbosity));
        }

        Ok(())
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl RotatorConfig {
    #[cfg(test)]
    pub fn new(address: impl Into<String>, azimuth_port: u16, elevation_port: u16) -> Self {
        Self {
            address: address.into(),
            azimuth_port,
            elevation_port,
            command_timeout_seconds: default_command_timeout(),
            flush_window_millis: default_flush_window(),
            calibration_seconds: default_calibration(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }

    pub fn settings(&self) -> RotorSettings {
        RotorSettings {
            command_timeout: Duration::from_secs(self.command_timeout_seconds),
            flush_window: Duration::from_millis(self.flush_window_millis),
            calibration_time: Duration::from_secs(self.calibration_seconds),
            connect_timeout: (self.connect_timeout_seconds > 0)
                .then(|| Duration::from_secs(self.connect_timeout_seconds)),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let defaults = CaptureSettings::default();

        Self {
            program: defaults.program,
            modulation: defaults.modulation,
            sample_rate: defaults.sample_rate,
            squelch: defaults.squelch,
            oversample: defaults.oversample,
            device: defaults.device,
            output_dir: defaults.output_dir,
            stop_grace_seconds: defaults.stop_grace.as_secs(),
        }
    }
}

impl CaptureConfig {
    pub fn settings(&self) -> CaptureSettings {
        CaptureSettings {
            program: self.program.clone(),
            modulation: self.modulation.clone(),
            sample_rate: self.sample_rate,
            squelch: self.squelch,
            oversample: self.oversample,
            device: self.device.clone(),
            output_dir: self.output_dir.clone(),
            stop_grace: Duration::from_secs(self.stop_grace_seconds),
        }
    }
}

impl Default for SdrConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([127, 0, 0, 1], 2256)),
            retry_seconds: 2,
        }
    }
}

impl SdrConfig {
    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
