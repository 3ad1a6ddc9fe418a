use std::process::{Command, ExitStatus};
use std::sync::Arc;

use shared_child::SharedChild;

/// Child is a spawned task process.
///
/// Clones share the underlying handle, so the supervisor can await the exit
/// from one clone while `stop()` signals the process through another. The
/// tokio `process` feature is deliberately not used; waiting happens on a
/// blocking thread.
#[derive(Clone)]
pub struct Child {
    inner: Arc<SharedChild>,
}

impl Child {
    pub fn spawn(cmd: &mut Command) -> std::io::Result<Self> {
        tracing::debug!(
            program = ?cmd.get_program(),
            args = ?cmd.get_args().collect::<Vec<_>>(),
            "invoking"
        );
        Ok(Self {
            inner: Arc::new(SharedChild::spawn(cmd)?),
        })
    }

    pub fn pid(&self) -> u32 {
        self.inner.id()
    }

    /// Best-effort SIGTERM. The process may ignore it, or may already be
    /// gone, in which case an error is returned.
    pub fn terminate(&self) -> std::io::Result<()> {
        let pid = self.inner.id() as libc::pid_t;
        if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    /// Waits for the process to exit without blocking the async runtime.
    pub async fn wait(&self) -> std::io::Result<ExitStatus> {
        let inner = self.inner.clone();
        let handle = tokio::runtime::Handle::current().spawn_blocking(move || inner.wait());
        handle.await.expect("wait does not panic")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn spawn_wait_reports_the_exit_status() {
        let child = Child::spawn(Command::new("true").arg("ignored")).unwrap();
        assert!(child.pid() > 0);
        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(0));
    }

    #[tokio::test]
    async fn terminate_stops_a_sleeping_process() {
        let child = Child::spawn(Command::new("sleep").arg("30")).unwrap();
        child.terminate().unwrap();
        let status = child.wait().await.unwrap();
        assert!(!status.success());

        // The process is gone now; a second signal reports an error.
        assert!(child.terminate().is_err());
    }
}
