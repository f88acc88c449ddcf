use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Last commanded antenna position, in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub azimuth: f64,
    pub elevation: f64,
}

/// Process-wide record of the last position sent to the rotator.
///
/// The rotator daemon never confirms arrival, so this always reflects the most
/// recently *issued* command. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct SharedPosition {
    inner: Arc<Mutex<Position>>,
}

impl SharedPosition {
    pub fn new() -> Self {
        Self::default()
    }

    // Two plain floats can't be left half-written, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Position> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_azimuth(&self, azimuth: f64) {
        self.lock().azimuth = azimuth;
    }

    pub fn set_elevation(&self, elevation: f64) {
        self.lock().elevation = elevation;
    }

    pub fn set_both(&self, azimuth: f64, elevation: f64) {
        *self.lock() = Position { azimuth, elevation };
    }

    pub fn reset(&self) {
        *self.lock() = Position::default();
    }

    pub fn snapshot(&self) -> Position {
        *self.lock()
    }
}
