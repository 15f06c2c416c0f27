//! Adapter for a spawned `tokio::process::Child`

use std::io;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::debug;

use super::{IoController, ProcessIo};

/// Controls a child process whose pipes were handed to a [`ProcessIo`].
///
/// Abort kills the process without taking the child lock, so it is safe to
/// call while another task is blocked in [`wait`](IoController::wait).
pub struct ChildController {
    child: Mutex<Child>,
    pid: Option<u32>,
    status: StdMutex<Option<ExitStatus>>,
}

impl ChildController {
    fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child: Mutex::new(child),
            pid,
            status: StdMutex::new(None),
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status, once the child has been reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(unix)]
    fn kill(&self) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return Ok(());
        };
        match signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) -> io::Result<()> {
        match self.child.try_lock() {
            Ok(mut child) => child.start_kill(),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl IoController for ChildController {
    async fn abort(&self) -> io::Result<()> {
        if self.exit_status().is_some() {
            return Ok(());
        }
        debug!(pid = ?self.pid, "Killing child process");
        self.kill()
    }

    async fn wait(&self) -> io::Result<()> {
        let mut child = self.child.lock().await;
        let status = child.wait().await?;
        debug!(pid = ?self.pid, %status, "Child process exited");
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
        Ok(())
    }

    async fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

impl ProcessIo {
    /// Take the piped stdio of `child` and wrap the process as the controller.
    ///
    /// Only streams configured with `Stdio::piped()` are attached.
    pub fn from_child(mut child: Child) -> (ProcessIo, Arc<ChildController>) {
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let controller = Arc::new(ChildController::new(child));
        let mut io = ProcessIo::new(controller.clone());
        if let Some(stdin) = stdin {
            io = io.with_stdin(stdin);
        }
        if let Some(stdout) = stdout {
            io = io.with_stdout(stdout);
        }
        if let Some(stderr) = stderr {
            io = io.with_stderr(stderr);
        }
        (io, controller)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_from_child_takes_piped_streams() {
        let child = Command::new("true")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let (io, controller) = ProcessIo::from_child(child);

        assert!(io.stdout.is_some());
        assert!(io.stderr.is_none());
        assert!(!io.has_stdin());

        controller.wait().await.unwrap();
        assert!(controller.exit_status().unwrap().success());
    }

    #[tokio::test]
    async fn test_abort_kills_running_child() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let (_io, controller) = ProcessIo::from_child(child);

        controller.abort().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), controller.wait())
            .await
            .expect("killed child should be reaped promptly")
            .unwrap();
        assert!(!controller.exit_status().unwrap().success());

        // already reaped
        controller.abort().await.unwrap();
    }
}
