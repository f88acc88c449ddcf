use crate::{
    Target,
    error::CaptureError,
    process::{ProcessControl, Signal, TokioProcess},
};
use chrono::{DateTime, Local, TimeZone};
use log::{debug, info, warn};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::time;

/// How the capture tool is invoked.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub program: String,
    pub modulation: String,
    pub sample_rate: u32,
    pub squelch: i32,
    pub oversample: u32,
    pub device: String,
    pub output_dir: PathBuf,
    /// How long to wait after SIGINT before killing the process.
    pub stop_grace: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            program: "rx_fm".to_string(),
            modulation: "wbfm".to_string(),
            sample_rate: 44_100,
            squelch: 0,
            oversample: 4,
            device: "driver=hackrf".to_string(),
            output_dir: PathBuf::from("."),
            stop_grace: Duration::from_secs(5),
        }
    }
}

impl CaptureSettings {
    /// Command line for recording `frequency_hz` into `output`.
    pub fn args(&self, frequency_hz: u64, output: &Path) -> Vec<String> {
        vec![
            "-M".to_string(),
            self.modulation.clone(),
            "-r".to_string(),
            self.sample_rate.to_string(),
            "-f".to_string(),
            frequency_hz.to_string(),
            "-l".to_string(),
            self.squelch.to_string(),
            "-o".to_string(),
            self.oversample.to_string(),
            "-E".to_string(),
            "deemp".to_string(),
            "-E".to_string(),
            "wav".to_string(),
            "-E".to_string(),
            "dc".to_string(),
            "-d".to_string(),
            self.device.clone(),
            output.display().to_string(),
        ]
    }
}

/// `<name>_<day>_<month>_<year>-<hour>_<minute>.wav`, with path separators
/// in the name replaced.
pub fn capture_filename<Tz>(name: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let name: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();

    format!("{name}_{}.wav", at.format("%d_%m_%Y-%H_%M"))
}

struct Running<H> {
    handle: H,
    target: Target,
    output: PathBuf,
}

/// Keeps at most one capture process alive for the current observation.
pub struct CaptureSupervisor<P: ProcessControl = TokioProcess> {
    process: P,
    settings: CaptureSettings,
    running: Mutex<Option<Running<P::Handle>>>,
}

impl CaptureSupervisor<TokioProcess> {
    pub fn new(settings: CaptureSettings) -> Self {
        Self::with_process(TokioProcess, settings)
    }
}

impl<P: ProcessControl> CaptureSupervisor<P> {
    pub fn with_process(process: P, settings: CaptureSettings) -> Self {
        Self {
            process,
            settings,
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running<P::Handle>>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Launches the capture tool for `target` and returns the output path.
    ///
    /// A previous capture that has already exited on its own is forgotten; one
    /// that is still alive is an error.
    pub fn start(&self, target: &Target) -> Result<PathBuf, CaptureError> {
        let mut running = self.running();

        if let Some(current) = running.as_mut() {
            if !self.process.has_exited(&mut current.handle) {
                return Err(CaptureError::AlreadyRunning {
                    target: current.target.name.clone(),
                });
            }
            debug!("previous capture of {} already exited", current.target.name);
            *running = None;
        }

        let output = self
            .settings
            .output_dir
            .join(capture_filename(&target.name, &Local::now()));
        let args = self.settings.args(target.frequency_hz, &output);

        let handle = self
            .process
            .start(&self.settings.program, &args)
            .map_err(|source| CaptureError::Spawn {
                program: self.settings.program.clone(),
                source,
            })?;

        info!(
            "capturing {} at {} Hz into {} (pid {:?})",
            target.name,
            target.frequency_hz,
            output.display(),
            self.process.id(&handle)
        );

        *running = Some(Running {
            handle,
            target: target.clone(),
            output: output.clone(),
        });

        Ok(output)
    }

    /// Interrupts the running capture, if any, and waits for it to exit.
    ///
    /// Calling this without a running capture does nothing.
    pub async fn stop(&self) -> Result<(), CaptureError> {
        let taken = self.running().take();
        let Some(Running {
            mut handle,
            target,
            output,
        }) = taken
        else {
            debug!("no capture to stop");
            return Ok(());
        };

        info!("stopping capture of {}", target.name);

        if self.process.has_exited(&mut handle) {
            debug!("capture of {} had already exited", target.name);
            return Ok(());
        }

        if let Err(e) = self.process.signal(&mut handle, Signal::Interrupt) {
            warn!("could not interrupt capture of {}: {e}", target.name);
        }

        match time::timeout(self.settings.stop_grace, self.process.wait(&mut handle)).await {
            Ok(Ok(code)) => {
                info!("capture exited ({code:?}), recording in {}", output.display());
                Ok(())
            }
            Ok(Err(e)) => Err(CaptureError::Wait(e)),
            Err(_) => {
                warn!(
                    "capture of {} ignored interrupt for {:?}, killing it",
                    target.name, self.settings.stop_grace
                );
                self.process
                    .signal(&mut handle, Signal::Kill)
                    .map_err(CaptureError::Signal)?;
                self.process
                    .wait(&mut handle)
                    .await
                    .map_err(CaptureError::Wait)?;
                Ok(())
            }
        }
    }

    /// Pid of the capture in progress.
    pub fn running_pid(&self) -> Option<u32> {
        let mut running = self.running();
        let current = running.as_mut()?;

        if self.process.has_exited(&mut current.handle) {
            return None;
        }

        self.process.id(&current.handle)
    }

    pub fn current_target(&self) -> Option<Target> {
        self.running().as_ref().map(|current| current.target.clone())
    }
}
