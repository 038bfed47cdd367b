//! Piped child processes for the ffmpeg tools.
//!
//! stdout is handed to the caller while stderr drains on its own thread so
//! the child never blocks on a full pipe. A child that is dropped before
//! [`PipedChild::finish`] is killed and reaped.

use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use revunk_common::error::{RevunkError, RevunkResult};

/// A running child with piped stdout and a drained stderr.
#[derive(Debug)]
pub(crate) struct PipedChild {
    program: String,
    child: Child,
    stderr_task: Option<JoinHandle<String>>,
    reaped: bool,
}

impl PipedChild {
    pub(crate) fn spawn(program: &str, args: &[String]) -> RevunkResult<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RevunkError::render(format!("Failed to start {program}: {e}")))?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || -> String {
                let mut output = String::new();
                match stderr.read_to_string(&mut output) {
                    Ok(_) => output,
                    Err(err) => format!("<failed to read stderr: {err}>"),
                }
            })
        });

        Ok(Self {
            program: program.to_string(),
            child,
            stderr_task,
            reaped: false,
        })
    }

    pub(crate) fn id(&self) -> u32 {
        self.child.id()
    }

    pub(crate) fn take_stdout(&mut self) -> RevunkResult<ChildStdout> {
        self.child.stdout.take().ok_or_else(|| {
            RevunkError::render(format!("Failed to capture {} stdout", self.program))
        })
    }

    /// Wait for the child to exit; a non-zero status becomes an error
    /// carrying `task` and whatever the child wrote to stderr.
    pub(crate) fn finish(mut self, task: &str) -> RevunkResult<()> {
        let status = self.child.wait();
        self.reaped = true;
        let stderr_output = self.join_stderr();
        let status = status.map_err(|e| {
            RevunkError::render(format!("Failed to wait on {}: {e}", self.program))
        })?;

        if !status.success() {
            return Err(RevunkError::render(format!(
                "{} {task} failed (status {status}): {}",
                self.program,
                stderr_output.trim()
            )));
        }
        Ok(())
    }

    fn join_stderr(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => task
                .join()
                .unwrap_or_else(|_| "<failed to join stderr reader>".to_string()),
            None => String::new(),
        }
    }
}

impl Drop for PipedChild {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        tracing::warn!(
            program = %self.program,
            pid = self.child.id(),
            "Stopping child before it finished"
        );
        // The child may already have exited on its own.
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.join_stderr();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> PipedChild {
        PipedChild::spawn("sh", &["-c".to_string(), script.to_string()]).unwrap()
    }

    fn is_alive(pid: u32) -> bool {
        Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_finish_reads_stdout_and_succeeds() {
        let mut child = sh("printf abc");
        let mut output = String::new();
        child.take_stdout().unwrap().read_to_string(&mut output).unwrap();
        assert_eq!(output, "abc");
        child.finish("test").unwrap();
    }

    #[test]
    fn test_failed_child_reports_stderr() {
        let err = sh("echo boom >&2; exit 3").finish("grid sampling").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("sh grid sampling failed"), "{message}");
        assert!(message.contains("boom"), "{message}");
    }

    #[test]
    fn test_dropped_child_is_killed_and_reaped() {
        let started = Instant::now();
        let mut child = sh("exec sleep 30");
        let pid = child.id();
        let _stdout = child.take_stdout().unwrap();
        assert!(is_alive(pid));

        // A read error in the caller returns early and drops the child.
        drop(child);

        assert!(!is_alive(pid));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_take_stdout_twice_fails() {
        let mut child = sh("true");
        child.take_stdout().unwrap();
        assert!(child.take_stdout().is_err());
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        let err = PipedChild::spawn("revunk-no-such-binary", &[]).unwrap_err();
        assert!(err.to_string().contains("Failed to start revunk-no-such-binary"));
    }
}
