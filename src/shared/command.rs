use std::io::{BufReader, Read};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("binary `{binary}` was not found on PATH")]
    MissingBinary { binary: String },
    #[error("`{binary}` timed out after {timeout_ms}ms")]
    Timeout { binary: String, timeout_ms: u64 },
    #[error("`{binary}` exited with code {exit_code}: {stderr}")]
    NonZeroExit {
        binary: String,
        exit_code: i32,
        stderr: String,
    },
    #[error("failed to run `{binary}`: {source}")]
    Io {
        binary: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub binary: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Runs a command to completion and returns stdout. The child is killed once
/// `timeout` elapses.
pub fn run_command(spec: &CommandSpec) -> Result<String, CommandError> {
    let io_error = |source: std::io::Error| CommandError::Io {
        binary: spec.binary.clone(),
        source,
    };

    let mut command = Command::new(&spec.binary);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(CommandError::MissingBinary {
                binary: spec.binary.clone(),
            })
        }
        Err(err) => return Err(io_error(err)),
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_error(std::io::Error::other("missing stdout pipe")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io_error(std::io::Error::other("missing stderr pipe")))?;
    let stdout_reader = thread::spawn(move || {
        let mut buf = String::new();
        let _ = BufReader::new(stdout).read_to_string(&mut buf);
        buf
    });
    let stderr_reader = thread::spawn(move || {
        let mut buf = String::new();
        let _ = BufReader::new(stderr).read_to_string(&mut buf);
        buf
    });

    let start = Instant::now();
    let exit_status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() > spec.timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_reader.join();
                    let _ = stderr_reader.join();
                    return Err(CommandError::Timeout {
                        binary: spec.binary.clone(),
                        timeout_ms: u64::try_from(spec.timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(err) => return Err(io_error(err)),
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    if !exit_status.success() {
        return Err(CommandError::NonZeroExit {
            binary: spec.binary.clone(),
            exit_code: exit_status.code().unwrap_or(-1),
            stderr: stderr.trim().chars().take(512).collect(),
        });
    }
    Ok(stdout)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn stdout_is_returned_on_success() {
        let spec = CommandSpec::new("sh", Duration::from_secs(5)).args(["-c", "printf '{\"ok\":true}'"]);
        assert_eq!(run_command(&spec).expect("run"), "{\"ok\":true}");
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let spec = CommandSpec::new("sh", Duration::from_secs(5)).args(["-c", "echo denied >&2; exit 3"]);
        let err = run_command(&spec).expect_err("fail");
        assert!(matches!(
            err,
            CommandError::NonZeroExit { exit_code: 3, ref stderr, .. } if stderr == "denied"
        ));
    }

    #[test]
    fn missing_binary_is_reported() {
        let spec = CommandSpec::new("agentops-definitely-missing-binary", Duration::from_secs(1));
        assert!(matches!(
            run_command(&spec),
            Err(CommandError::MissingBinary { .. })
        ));
    }

    #[test]
    fn slow_commands_time_out() {
        let spec = CommandSpec::new("sh", Duration::from_millis(100)).args(["-c", "sleep 5"]);
        assert!(matches!(run_command(&spec), Err(CommandError::Timeout { .. })));
    }
}
