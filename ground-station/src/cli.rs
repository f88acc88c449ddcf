use clap::Parser;
use std::path::PathBuf;

/// Ground station observation controller
#[derive(Parser, Debug)]
#[command(version, about = "Ground station observation controller", long_about = None)]
pub struct Args {
    /// Configuration file, without extension
    #[arg(short, long, default_value = "ground-station/config")]
    pub config: String,

    /// Log verbosity, 0 (errors only) to 3 (debug)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub verbosity: Option<u8>,

    /// Append logs to this file instead of stderr
    #[arg(short = 'f', long)]
    pub log_file: Option<PathBuf>,

    /// IP address of the rotator daemons
    #[arg(short, long)]
    pub remote_addr: Option<String>,

    /// Port of the azimuth rotator daemon
    #[arg(short, long)]
    pub azimuth_port: Option<u16>,

    /// Port of the elevation rotator daemon
    #[arg(short, long)]
    pub elevation_port: Option<u16>,

    /// Port to listen on for JSON requests
    #[arg(short = 'p', long)]
    pub request_port: Option<u16>,
}
