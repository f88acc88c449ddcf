use crate::AxisType;
use std::{io, time::Duration};
use thiserror::Error;

/// Failure to establish an [`AxisChannel`](crate::channel::AxisChannel).
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("axis {0} has no channel")]
    InvalidAxis(AxisType),
    #[error("invalid remote address `{0}`")]
    InvalidAddress(String),
    #[error("could not connect {axis} channel to {address}: {source}")]
    Connect {
        axis: AxisType,
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out connecting {axis} channel to {address}")]
    ConnectTimeout { axis: AxisType, address: String },
}

/// Failure while shutting a channel down. The channel is gone regardless.
#[derive(Debug, Error)]
#[error("could not close {axis} channel: {source}")]
pub struct CloseError {
    pub axis: AxisType,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum RotctlError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Close(#[from] CloseError),
    #[error("no reply on {axis} channel within {after:?}")]
    Timeout { axis: AxisType, after: Duration },
    #[error("i/o error on {axis} channel: {source}")]
    Io {
        axis: AxisType,
        #[source]
        source: io::Error,
    },
    #[error("malformed position reply {reply:?}")]
    Parse { reply: String },
    #[error("axis {0} has no channel")]
    InvalidAxis(AxisType),
    #[error("{0} is not a valid position")]
    InvalidPosition(f64),
    #[error("rotator channels are not open")]
    NotConnected,
    #[error("cancelled by shutdown")]
    Cancelled,
    #[error("axis task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RotctlError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RotctlError::Timeout { .. })
    }
}
