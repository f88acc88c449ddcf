use crate::{
    AxisType,
    channel::{AxisChannel, DEFAULT_COMMAND_TIMEOUT, DEFAULT_FLUSH_WINDOW},
    concurrent::run_concurrently,
    error::RotctlError,
    protocol::{Command, parse_position_reply},
    state::{Position, SharedPosition},
};
use log::{debug, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, time};
use tokio_util::sync::CancellationToken;

/// Physical homing time after `w CAL`.
pub const DEFAULT_CALIBRATION_TIME: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct RotorSettings {
    pub command_timeout: Duration,
    pub flush_window: Duration,
    pub calibration_time: Duration,
    pub connect_timeout: Option<Duration>,
}

impl Default for RotorSettings {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            flush_window: DEFAULT_FLUSH_WINDOW,
            calibration_time: DEFAULT_CALIBRATION_TIME,
            connect_timeout: Some(Duration::from_secs(10)),
        }
    }
}

type Slot = Arc<Mutex<Option<AxisChannel>>>;

/// Drives the azimuth and elevation daemons of one rotator.
///
/// Each axis has its own channel behind its own lock, so commands on one axis
/// are strictly ordered while the two axes run independently.
pub struct RotorController {
    settings: RotorSettings,
    position: SharedPosition,
    cancel: CancellationToken,
    azimuth: Slot,
    elevation: Slot,
}

impl RotorController {
    /// Opens both axis channels.
    ///
    /// If the elevation channel can't be opened the azimuth one is closed
    /// again before returning the error.
    pub async fn open(
        settings: RotorSettings,
        position: SharedPosition,
        cancel: CancellationToken,
        address: &str,
        azimuth_port: u16,
        elevation_port: u16,
    ) -> Result<Self, RotctlError> {
        let azimuth = open_channel(&settings, AxisType::Azimuth, address, azimuth_port).await?;

        let elevation =
            match open_channel(&settings, AxisType::Elevation, address, elevation_port).await {
                Ok(channel) => channel,
                Err(e) => {
                    if let Err(close) = azimuth.close() {
                        warn!("{close}");
                    }
                    return Err(e);
                }
            };

        info!("rotator channels open: azimuth {address}:{azimuth_port}, elevation {address}:{elevation_port}");

        Ok(Self {
            settings,
            position,
            cancel,
            azimuth: Arc::new(Mutex::new(Some(azimuth))),
            elevation: Arc::new(Mutex::new(Some(elevation))),
        })
    }

    /// Closes both channels. Later commands fail with
    /// [`RotctlError::NotConnected`].
    pub async fn close(&self) -> Result<(), RotctlError> {
        let mut first_error = None;

        for slot in [&self.azimuth, &self.elevation] {
            let Some(channel) = slot.lock().await.take() else {
                continue;
            };
            debug!("closing {} channel", channel.axis());

            if let Err(e) = channel.close() {
                warn!("{e}");
                first_error.get_or_insert(RotctlError::Close(e));
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    pub fn position(&self) -> Position {
        self.position.snapshot()
    }

    pub async fn set_azimuth(&self, value: f64) -> Result<(), RotctlError> {
        self.set_position(AxisType::Azimuth, value).await
    }

    pub async fn set_elevation(&self, value: f64) -> Result<(), RotctlError> {
        self.set_position(AxisType::Elevation, value).await
    }

    /// Commands one axis, recording the value once the daemon has answered.
    pub async fn set_position(&self, axis: AxisType, value: f64) -> Result<(), RotctlError> {
        self.command(axis, Command::SetPosition(value)).await?;

        match axis {
            AxisType::Azimuth => self.position.set_azimuth(value),
            AxisType::Elevation => self.position.set_elevation(value),
            AxisType::None => {}
        }

        Ok(())
    }

    /// Points both axes at once and waits until each has answered, timed out
    /// or failed.
    ///
    /// The position is recorded before anything is sent. After both axes are
    /// done the first failure, azimuth first, is returned. Non-finite values
    /// are refused up front and nothing is recorded.
    pub async fn move_both_and_wait(&self, azimuth: f64, elevation: f64) -> Result<(), RotctlError> {
        if let Some(value) = [azimuth, elevation].into_iter().find(|v| !v.is_finite()) {
            return Err(RotctlError::InvalidPosition(value));
        }

        self.position.set_both(azimuth, elevation);

        let axes = [(AxisType::Azimuth, azimuth), (AxisType::Elevation, elevation)];
        let timeout = self.settings.command_timeout;

        let moves = axes.map(|(axis, value)| {
            let slot = self.slot(axis).map(Arc::clone);
            let cancel = self.cancel.clone();

            async move {
                let slot = slot?;
                send_on(&slot, axis, Command::SetPosition(value), timeout, &cancel)
                    .await
                    .map(|_| ())
            }
        });

        let results = run_concurrently(moves).await;

        let mut first_error = None;
        for ((axis, value), result) in axes.into_iter().zip(results) {
            match result.unwrap_or_else(|e| Err(e.into())) {
                Ok(()) => debug!("{axis} acknowledged {value:.2}"),
                Err(e) => {
                    warn!("moving {axis} to {value:.2} failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Stops both axes, one after the other. Replies are discarded.
    pub async fn stop(&self) -> Result<(), RotctlError> {
        let mut first_error = None;

        for axis in [AxisType::Azimuth, AxisType::Elevation] {
            if let Err(e) = self.command(axis, Command::Stop).await {
                warn!("stopping {axis} failed: {e}");
                first_error.get_or_insert(e);
            }
        }

        debug!("stop command done");
        first_error.map_or(Ok(()), Err)
    }

    /// Homes the requested axes.
    ///
    /// The recorded position goes back to zero right away, then `w CAL` is
    /// sent to each axis in turn and the homing time is waited out. Shutdown
    /// cuts the wait short with [`RotctlError::Cancelled`].
    pub async fn calibrate(&self, azimuth: bool, elevation: bool) -> Result<(), RotctlError> {
        self.position.reset();

        for (axis, wanted) in [(AxisType::Azimuth, azimuth), (AxisType::Elevation, elevation)] {
            if wanted {
                self.command(axis, Command::Calibrate).await?;
            }
        }

        info!(
            "calibrating, waiting {:?} for the rotator to home",
            self.settings.calibration_time
        );

        tokio::select! {
            _ = self.cancel.cancelled() => Err(RotctlError::Cancelled),
            _ = time::sleep(self.settings.calibration_time) => {
                debug!("calibration done");
                Ok(())
            }
        }
    }

    pub async fn get_azimuth(&self) -> Result<f64, RotctlError> {
        self.get_position(AxisType::Azimuth).await
    }

    pub async fn get_elevation(&self) -> Result<f64, RotctlError> {
        self.get_position(AxisType::Elevation).await
    }

    /// Asks the daemon where the axis is.
    pub async fn get_position(&self, axis: AxisType) -> Result<f64, RotctlError> {
        let reply = self.command(axis, Command::QueryPosition).await?;

        parse_position_reply(&String::from_utf8_lossy(&reply))
    }

    fn slot(&self, axis: AxisType) -> Result<&Slot, RotctlError> {
        match axis {
            AxisType::Azimuth => Ok(&self.azimuth),
            AxisType::Elevation => Ok(&self.elevation),
            AxisType::None => Err(RotctlError::InvalidAxis(axis)),
        }
    }

    async fn command(&self, axis: AxisType, command: Command) -> Result<Vec<u8>, RotctlError> {
        send_on(
            self.slot(axis)?,
            axis,
            command,
            self.settings.command_timeout,
            &self.cancel,
        )
        .await
    }
}

async fn open_channel(
    settings: &RotorSettings,
    axis: AxisType,
    address: &str,
    port: u16,
) -> Result<AxisChannel, RotctlError> {
    let channel = match settings.connect_timeout {
        Some(limit) => AxisChannel::open_with_timeout(axis, address, port, limit).await?,
        None => AxisChannel::open(axis, address, port).await?,
    };

    Ok(channel.with_flush_window(settings.flush_window))
}

async fn send_on(
    slot: &Slot,
    axis: AxisType,
    command: Command,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, RotctlError> {
    let line = command.line(axis)?;

    let mut guard = slot.lock().await;
    let channel = guard.as_mut().ok_or(RotctlError::NotConnected)?;

    channel.send_command(&line, timeout, cancel).await
}
