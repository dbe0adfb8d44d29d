//! CommandRunner trait and SystemRunner (sync subprocess wrapper with a deadline).
//! Audio backends go through the trait so tests can inject canned output.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::HostError;

/// Deadline for a single audio-control subprocess.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Trait for executing external programs. Enables mock injection for testing.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`; returns trimmed stdout on a zero exit.
    fn run(&self, program: &str, args: &[&str]) -> Result<String, HostError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, HostError> {
        (**self).run(program, args)
    }
}

/// Real runner using `std::process::Command`. Kills the child on timeout.
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(COMMAND_TIMEOUT)
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, HostError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => HostError::NotFound(program.to_owned()),
                _ => HostError::Io(e),
            })?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(program, "audio command timed out");
                return Err(HostError::Timeout);
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let mut stdout = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout)?;
        }
        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut err) = child.stderr.take() {
                err.read_to_string(&mut stderr)?;
            }
            let stderr = stderr.trim();
            let detail = if stderr.is_empty() {
                format!("Unknown {program} error")
            } else {
                stderr.to_owned()
            };
            tracing::debug!(program, code = ?status.code(), %detail, "audio command failed");
            return Err(HostError::CommandFailed(detail));
        }
        Ok(stdout.trim().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_runner_uses_five_second_deadline() {
        let runner = SystemRunner::default();
        assert_eq!(runner.timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_program_is_not_found() {
        let runner = SystemRunner::default();
        let err = runner
            .run("admute-definitely-not-a-real-binary", &[])
            .expect_err("must fail");
        assert_eq!(err.to_string(), "admute-definitely-not-a-real-binary not found");
    }

    #[test]
    fn blanket_ref_impl() {
        struct Mock;
        impl CommandRunner for Mock {
            fn run(&self, program: &str, _args: &[&str]) -> Result<String, HostError> {
                Ok(program.to_owned())
            }
        }
        let mock = Mock;
        let r: &Mock = &mock;
        assert_eq!(r.run("osascript", &[]).expect("ok"), "osascript");
    }

    #[cfg(unix)]
    #[test]
    fn captures_trimmed_stdout() {
        let runner = SystemRunner::default();
        let out = runner.run("sh", &["-c", "echo '  true  '"]).expect("sh runs");
        assert_eq!(out, "true");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_reports_stderr() {
        let runner = SystemRunner::default();
        let err = runner
            .run("sh", &["-c", "echo 'no sink' >&2; exit 1"])
            .expect_err("must fail");
        assert_eq!(err.to_string(), "no sink");
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let runner = SystemRunner::new(Duration::from_millis(50));
        let err = runner.run("sleep", &["5"]).expect_err("must time out");
        assert!(matches!(err, HostError::Timeout));
    }
}
