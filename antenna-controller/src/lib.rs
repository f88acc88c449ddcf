//! Client for the rotator-control daemon that points the ground station antenna.
//!
//! Each axis is driven by its own daemon over its own TCP connection. The
//! [`RotorController`] owns both connections and keeps a [`SharedPosition`]
//! up to date with the last commanded position.
//!
//! ```no_run
//! use antenna_controller::{RotorController, RotorSettings, SharedPosition};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), antenna_controller::RotctlError> {
//! let position = SharedPosition::new();
//! let rotor = RotorController::open(
//!     RotorSettings::default(),
//!     position.clone(),
//!     CancellationToken::new(),
//!     "127.0.0.1",
//!     4533,
//!     4534,
//! )
//! .await?;
//!
//! rotor.move_both_and_wait(180.0, 45.0).await?;
//! assert_eq!(position.snapshot().azimuth, 180.0);
//!
//! rotor.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod concurrent;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod rotor;
pub mod state;

use std::fmt;

pub use channel::AxisChannel;
pub use error::{CloseError, ConnectError, RotctlError};
pub use rotor::{RotorController, RotorSettings};
pub use state::{Position, SharedPosition};

/// Which of the two rotator axes a command applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisType {
    None,
    Azimuth,
    Elevation,
}

impl AxisType {
    /// Letter the daemon uses for this axis.
    pub fn prefix(self) -> Option<char> {
        match self {
            AxisType::None => None,
            AxisType::Azimuth => Some('A'),
            AxisType::Elevation => Some('E'),
        }
    }
}

impl fmt::Display for AxisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisType::None => write!(f, "none"),
            AxisType::Azimuth => write!(f, "azimuth"),
            AxisType::Elevation => write!(f, "elevation"),
        }
    }
}
