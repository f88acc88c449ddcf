use crate::{
    config::Config,
    requests::{Request, Response},
};
use antenna_controller::{RotctlError, RotorController, SharedPosition};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use sdr::{CaptureError, CaptureSupervisor, ProcessControl, Target, TokioProcess, TunerError, tuner};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum StationError {
    #[error(transparent)]
    Rotor(#[from] RotctlError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Tuner(#[from] TunerError),
    #[error("no observation is open")]
    NoObservation,
    #[error("an observation is already open")]
    AlreadyOpen,
}

impl From<StationError> for Response {
    fn from(e: StationError) -> Self {
        match &e {
            StationError::Rotor(rotor) if rotor.is_timeout() => Response::timeout(e.to_string()),
            _ => Response::error(e.to_string()),
        }
    }
}

/// The rotator channels of one pass, from `open` to `close`.
struct Observation {
    rotor: Arc<RotorController>,
    opened_at: DateTime<Utc>,
}

/// Everything a request can act on: the open observation, the capture
/// supervisor and the shared position record.
pub struct Station<P: ProcessControl = TokioProcess> {
    config: Config,
    position: SharedPosition,
    capture: CaptureSupervisor<P>,
    observation: Mutex<Option<Observation>>,
    cancel: CancellationToken,
}

impl<P: ProcessControl> Station<P> {
    pub fn new(
        config: Config,
        position: SharedPosition,
        capture: CaptureSupervisor<P>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            position,
            capture,
            observation: Mutex::new(None),
            cancel,
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        debug!("handling {request:?}");

        self.dispatch(request).await.unwrap_or_else(|e| {
            warn!("request failed: {e}");
            e.into()
        })
    }

    async fn dispatch(&self, request: Request) -> Result<Response, StationError> {
        match request {
            Request::Open => self.open().await?,
            Request::Close => self.close().await?,
            Request::Move { azimuth, elevation } => {
                self.rotor()
                    .await?
                    .move_both_and_wait(azimuth, elevation)
                    .await?;
                return Ok(Response::ok().with_position(azimuth, elevation));
            }
            Request::SetAzimuth { value } => self.rotor().await?.set_azimuth(value).await?,
            Request::SetElevation { value } => self.rotor().await?.set_elevation(value).await?,
            Request::GetPosition => {
                let rotor = self.rotor().await?;
                let azimuth = rotor.get_azimuth().await?;
                let elevation = rotor.get_elevation().await?;
                return Ok(Response::ok().with_position(azimuth, elevation));
            }
            Request::Status => return Ok(self.status().await),
            Request::Stop => self.rotor().await?.stop().await?,
            Request::Calibrate { azimuth, elevation } => {
                self.rotor().await?.calibrate(azimuth, elevation).await?
            }
            Request::StartCapture { name, frequency } => {
                let target = Target {
                    name,
                    frequency_hz: frequency,
                };
                let output = self.capture.start(&target)?;

                let mut response = Response::ok();
                response.capture_pid = self.capture.running_pid();
                response.output = Some(output.display().to_string());
                return Ok(response);
            }
            Request::StopCapture => self.capture.stop().await?,
            Request::SetFrequency { frequency } => {
                let sdr = &self.config.sdr;
                tuner::set_frequency(sdr.address, frequency, sdr.retry(), &self.cancel).await?
            }
        }

        Ok(Response::ok())
    }

    /// Connects to both rotator daemons and starts an observation.
    ///
    /// The observation lock is not held while connecting. If another `open`
    /// won the race in the meantime, the new channels are closed again.
    pub async fn open(&self) -> Result<(), StationError> {
        if self.observation.lock().await.is_some() {
            return Err(StationError::AlreadyOpen);
        }

        let rotator = &self.config.rotator;
        let rotor = RotorController::open(
            rotator.settings(),
            self.position.clone(),
            self.cancel.clone(),
            &rotator.address,
            rotator.azimuth_port,
            rotator.elevation_port,
        )
        .await?;

        let mut observation = self.observation.lock().await;
        if observation.is_some() {
            drop(observation);
            if let Err(e) = rotor.close().await {
                warn!("{e}");
            }
            return Err(StationError::AlreadyOpen);
        }

        *observation = Some(Observation {
            rotor: Arc::new(rotor),
            opened_at: Utc::now(),
        });

        info!("observation opened");
        Ok(())
    }

    /// Ends the observation: stops the capture and closes both channels.
    pub async fn close(&self) -> Result<(), StationError> {
        let taken = self.observation.lock().await.take();
        let Some(observation) = taken else {
            return Err(StationError::NoObservation);
        };

        if let Err(e) = self.capture.stop().await {
            warn!("{e}");
        }

        observation.rotor.close().await?;

        info!(
            "observation closed after {}",
            Utc::now().signed_duration_since(observation.opened_at)
        );
        Ok(())
    }

    pub async fn status(&self) -> Response {
        let (position, opened_at) = match self.observation.lock().await.as_ref() {
            Some(observation) => (observation.rotor.position(), Some(observation.opened_at)),
            None => (self.position.snapshot(), None),
        };

        let mut response = Response::ok().with_position(position.azimuth, position.elevation);
        response.observation_open = Some(opened_at.is_some());
        response.capture_pid = self.capture.running_pid();
        response.message = opened_at.map(|at| format!("observation open since {}", at.to_rfc3339()));
        response
    }

    /// Releases everything on the way out of the process.
    pub async fn shutdown(&self) {
        match self.close().await {
            Ok(()) | Err(StationError::NoObservation) => {}
            Err(e) => error!("closing observation on shutdown: {e}"),
        }

        if let Err(e) = self.capture.stop().await {
            error!("stopping capture on shutdown: {e}");
        }
    }

    async fn rotor(&self) -> Result<Arc<RotorController>, StationError> {
        self.observation
            .lock()
            .await
            .as_ref()
            .map(|observation| observation.rotor.clone())
            .ok_or(StationError::NoObservation)
    }
}
