use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("could not start capture program `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("a capture of {target} is already running")]
    AlreadyRunning { target: String },
    #[error("could not signal capture process: {0}")]
    Signal(#[source] io::Error),
    #[error("could not wait for capture process: {0}")]
    Wait(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum TunerError {
    #[error("cancelled while waiting for the SDR server")]
    Cancelled,
    #[error("could not send frequency to the SDR server: {0}")]
    Io(#[from] io::Error),
}
