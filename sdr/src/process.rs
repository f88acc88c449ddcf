use async_trait::async_trait;
use std::{io, process::Stdio};
use tokio::process::{Child, Command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGINT, lets the capture tool finalize its output file.
    Interrupt,
    Terminate,
    Kill,
}

/// Starting, signalling and reaping external processes.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    type Handle: Send;

    fn start(&self, program: &str, args: &[String]) -> io::Result<Self::Handle>;

    fn id(&self, handle: &Self::Handle) -> Option<u32>;

    fn signal(&self, handle: &mut Self::Handle, signal: Signal) -> io::Result<()>;

    /// Whether the process has exited on its own, without blocking.
    fn has_exited(&self, handle: &mut Self::Handle) -> bool;

    /// Waits for exit and returns the exit code, if there is one.
    async fn wait(&self, handle: &mut Self::Handle) -> io::Result<Option<i32>>;
}

/// Real processes, spawned through tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcess;

#[async_trait]
impl ProcessControl for TokioProcess {
    type Handle = Child;

    fn start(&self, program: &str, args: &[String]) -> io::Result<Child> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
    }

    fn id(&self, handle: &Child) -> Option<u32> {
        handle.id()
    }

    fn signal(&self, handle: &mut Child, signal: Signal) -> io::Result<()> {
        let signum = match signal {
            Signal::Kill => return handle.start_kill(),
            Signal::Interrupt => libc::SIGINT,
            Signal::Terminate => libc::SIGTERM,
        };

        // Already reaped, nothing left to signal.
        let Some(pid) = handle.id() else {
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

        // SAFETY: kill(2) only takes integers. The pid belongs to a child we
        // spawned and haven't reaped, so it can't have been recycled.
        if unsafe { libc::kill(pid, signum) } == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    fn has_exited(&self, handle: &mut Child) -> bool {
        matches!(handle.try_wait(), Ok(Some(_)))
    }

    async fn wait(&self, handle: &mut Child) -> io::Result<Option<i32>> {
        handle.wait().await.map(|status| status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time;

    #[tokio::test]
    async fn interrupt_ends_a_running_process() {
        let process = TokioProcess;
        let mut child = process.start("sleep", &["30".to_string()]).unwrap();

        assert!(process.id(&child).is_some());
        assert!(!process.has_exited(&mut child));

        process.signal(&mut child, Signal::Interrupt).unwrap();
        let code = time::timeout(Duration::from_secs(5), process.wait(&mut child))
            .await
            .unwrap()
            .unwrap();

        // Killed by a signal, so there is no exit code.
        assert_eq!(code, None);
    }

    #[tokio::test]
    async fn terminate_and_kill_end_a_running_process() {
        let process = TokioProcess;

        for signal in [Signal::Terminate, Signal::Kill] {
            let mut child = process.start("sleep", &["30".to_string()]).unwrap();

            process.signal(&mut child, signal).unwrap();
            let code = time::timeout(Duration::from_secs(5), process.wait(&mut child))
                .await
                .unwrap()
                .unwrap();

            assert_eq!(code, None, "{signal:?}");
            assert!(process.has_exited(&mut child));
        }
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let result = TokioProcess.start("/nonexistent/capture-tool", &[]);

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
