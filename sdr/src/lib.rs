//! Lifecycle of the external signal-capture tool and tuning of the SDR server.

pub mod capture;
pub mod error;
pub mod mock;
pub mod process;
pub mod tuner;

pub use capture::{CaptureSettings, CaptureSupervisor};
pub use error::{CaptureError, TunerError};
pub use process::{ProcessControl, Signal, TokioProcess};

/// The satellite being observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub frequency_hz: u64,
}
