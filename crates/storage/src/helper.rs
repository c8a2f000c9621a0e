//! External helper process with an explicit termination protocol.
//!
//! The helper is reached through two byte streams: its stdin for headers and
//! body going out, its stdout for acknowledgements, headers and body coming
//! back. Whatever happens, the child is reaped before the [`Helper`] is gone.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::StorageError;
use crate::lines::HeaderLines;

/// Grace period between the polite and the forceful signal.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub(crate) struct Helper {
    verb: &'static str,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
}

impl Helper {
    /// Spawns `<program> <verb>` with `root` as working directory.
    pub fn spawn(program: &Path, verb: &'static str, root: &Path) -> Result<Self, StorageError> {
        let mut child = Command::new(program)
            .arg(verb)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .inspect_err(|e| {
                tracing::warn!(helper = %program.display(), verb, error = %e, "helper spawn failed");
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().map(BufReader::new);
        tracing::debug!(helper = %program.display(), verb, pid = child.id(), "helper started");
        Ok(Self {
            verb,
            child: Some(child),
            stdin,
            stdout,
        })
    }

    pub fn send_headers(&mut self, headers: &HeaderLines) -> Result<(), StorageError> {
        let stdin = self.stdin.as_mut().ok_or(StorageError::NotOpen)?;
        headers.write_to(stdin)
    }

    pub fn write_body(&mut self, buf: &[u8]) -> Result<(), StorageError> {
        let stdin = self.stdin.as_mut().ok_or(StorageError::NotOpen)?;
        stdin.write_all(buf)?;
        Ok(())
    }

    /// Closes the helper's stdin so it sees end of input.
    pub fn finish_input(&mut self) {
        self.stdin = None;
    }

    pub fn read_headers(&mut self) -> Result<HeaderLines, StorageError> {
        let stdout = self.stdout.as_mut().ok_or(StorageError::NotOpen)?;
        HeaderLines::read_from(stdout)
    }

    pub fn read_body(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        // Output already drained by `reap`.
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(0);
        };
        Ok(stdout.read(buf)?)
    }

    /// Waits for the `OK` acknowledgement that commits an upload.
    pub fn expect_ok(&mut self) -> Result<(), StorageError> {
        let stdout = self.stdout.as_mut().ok_or(StorageError::NotOpen)?;
        let mut line = String::new();
        stdout.read_line(&mut line)?;
        if line.trim_end_matches(['\n', '\r']) == "OK" {
            Ok(())
        } else {
            Err(StorageError::Helper(format!(
                "{} not acknowledged: {:?}",
                self.verb,
                line.trim_end()
            )))
        }
    }

    /// Drains remaining output and waits for a successful exit.
    pub fn wait_success(mut self) -> Result<(), StorageError> {
        self.reap()
    }

    /// Like [`Helper::wait_success`], but keeps the handle. Reaping an
    /// already reaped helper succeeds.
    pub fn reap(&mut self) -> Result<(), StorageError> {
        if self.child.is_none() {
            return Ok(());
        }
        self.finish_input();
        if let Some(mut stdout) = self.stdout.take() {
            std::io::copy(&mut stdout, &mut std::io::sink())?;
        }
        let status = self.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(StorageError::Helper(format!("{} exited with {status}", self.verb)))
        }
    }

    fn wait(&mut self) -> Result<ExitStatus, StorageError> {
        let mut child = self.child.take().ok_or(StorageError::NotOpen)?;
        Ok(child.wait()?)
    }

    /// Stops the helper: polite signal, grace period, forced kill, reap.
    pub fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Ok(Some(_)) = child.try_wait() {
            self.stdin = None;
            self.stdout = None;
            return;
        }

        // Signal before closing the pipes so the helper cannot mistake end
        // of input for a completed upload.
        signal_terminate(&child);
        self.stdin = None;
        self.stdout = None;
        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(verb = self.verb, %status, "helper terminated");
                    return;
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(_) => break,
            }
        }

        tracing::warn!(verb = self.verb, pid = child.id(), "helper ignored SIGTERM, killing");
        if let Err(e) = child.kill() {
            tracing::error!(verb = self.verb, error = %e, "kill failed");
        }
        if let Err(e) = child.wait() {
            tracing::error!(verb = self.verb, error = %e, "reaping helper failed");
        }
    }
}

impl Drop for Helper {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(unix)]
fn signal_terminate(child: &Child) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: the child has not been reaped yet, so the pid still names it.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn signal_terminate(_child: &Child) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn terminate_reaps_stubborn_helper() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("stubborn.sh");
        std::fs::write(&script, "#!/bin/sh\ntrap '' TERM\nsleep 30\n").unwrap();

        let mut helper = Helper {
            verb: "put",
            child: Some(
                Command::new("/bin/sh")
                    .arg(&script)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .spawn()
                    .unwrap(),
            ),
            stdin: None,
            stdout: None,
        };
        let started = Instant::now();
        helper.terminate();
        assert!(helper.child.is_none());
        assert!(started.elapsed() >= TERMINATE_GRACE);
    }

    #[test]
    fn terminate_is_quick_for_cooperative_helper() {
        let mut helper = Helper {
            verb: "get",
            child: Some(Command::new("sleep").arg("30").spawn().unwrap()),
            stdin: None,
            stdout: None,
        };
        let started = Instant::now();
        helper.terminate();
        assert!(started.elapsed() < TERMINATE_GRACE);
    }

    #[test]
    fn reap_reports_failed_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("fails.sh");
        std::fs::write(&script, "#!/bin/sh\nprintf partial\nexit 3\n").unwrap();

        let mut child = Command::new("/bin/sh")
            .arg(&script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let mut helper = Helper {
            verb: "get",
            stdin: child.stdin.take(),
            stdout: child.stdout.take().map(BufReader::new),
            child: Some(child),
        };
        assert!(matches!(helper.reap(), Err(StorageError::Helper(_))));
        assert!(helper.child.is_none());
        assert_eq!(helper.read_body(&mut [0u8; 4]).unwrap(), 0);
        assert!(helper.reap().is_ok());
    }

    #[test]
    fn spawn_failure_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = Helper::spawn(&tmp.path().join("missing"), "get", tmp.path());
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
