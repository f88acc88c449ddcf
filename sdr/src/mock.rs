//! In-memory [`ProcessControl`] that records what it was asked to do.

use crate::process::{ProcessControl, Signal};
use async_trait::async_trait;
use std::{
    collections::HashSet,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug)]
pub struct MockHandle {
    id: u32,
}

#[derive(Debug, Default)]
struct Inner {
    launches: Vec<Launch>,
    signals: Vec<(u32, Signal)>,
    exited: HashSet<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct MockProcess {
    inner: Arc<Mutex<Inner>>,
    exits: Arc<Notify>,
    fail_start: bool,
    ignore_interrupt: bool,
}

impl MockProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every start fails as if the program did not exist.
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    /// Processes only exit on [`Signal::Kill`].
    pub fn stubborn() -> Self {
        Self {
            ignore_interrupt: true,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn launches(&self) -> Vec<Launch> {
        self.lock().launches.clone()
    }

    pub fn signals(&self) -> Vec<(u32, Signal)> {
        self.lock().signals.clone()
    }

    /// Makes process `id` exit on its own.
    pub fn exit(&self, id: u32) {
        self.lock().exited.insert(id);
        self.exits.notify_waiters();
    }
}

#[async_trait]
impl ProcessControl for MockProcess {
    type Handle = MockHandle;

    fn start(&self, program: &str, args: &[String]) -> io::Result<MockHandle> {
        if self.fail_start {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such program"));
        }

        let mut inner = self.lock();
        inner.launches.push(Launch {
            program: program.to_string(),
            args: args.to_vec(),
        });

        let id = 1000 + u32::try_from(inner.launches.len()).unwrap_or(u32::MAX - 1000);
        Ok(MockHandle { id })
    }

    fn id(&self, handle: &MockHandle) -> Option<u32> {
        Some(handle.id)
    }

    fn signal(&self, handle: &mut MockHandle, signal: Signal) -> io::Result<()> {
        let mut inner = self.lock();
        inner.signals.push((handle.id, signal));

        if signal == Signal::Kill || !self.ignore_interrupt {
            inner.exited.insert(handle.id);
            drop(inner);
            self.exits.notify_waiters();
        }

        Ok(())
    }

    fn has_exited(&self, handle: &mut MockHandle) -> bool {
        self.lock().exited.contains(&handle.id)
    }

    async fn wait(&self, handle: &mut MockHandle) -> io::Result<Option<i32>> {
        loop {
            let exited = self.exits.notified();

            if self.lock().exited.contains(&handle.id) {
                return Ok(Some(0));
            }

            exited.await;
        }
    }
}
