//! Command execution backing `cmd.run`, `cmd.run_all` and `cmd.retcode`.

use crate::capability::args::CallError;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::process::{Command, Stdio};
use std::time::Instant;

static ARGV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)"|'([^']*)'|(\S+)"#).expect("valid argv regex"));

/// Result of one finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub pid: Option<u32>,
    pub retcode: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// `cmd.run_all` return shape.
    pub fn to_value(&self) -> Value {
        json!({
            "pid": self.pid,
            "retcode": self.retcode,
            "stdout": self.stdout,
            "stderr": self.stderr,
        })
    }
}

/// Options for one command run.
#[derive(Debug, Clone, Default)]
pub struct CommandRequest<'a> {
    pub cmd: &'a str,
    /// Route through `sh -c` (or `cmd /C` on Windows) instead of splitting.
    pub python_shell: bool,
    pub cwd: Option<&'a str>,
    pub env: Vec<(String, String)>,
}

/// Splits a command line on whitespace, keeping simple quoted groups.
pub fn split_command(cmd: &str) -> Vec<String> {
    ARGV_RE
        .captures_iter(cmd)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

/// Runs a command to completion.
///
/// Non-zero exit codes are not errors; only spawn/wait failures are.
pub fn run_command(request: &CommandRequest<'_>) -> Result<CommandOutput, CallError> {
    let started_at = Instant::now();
    let mut command = if request.python_shell {
        shell_command(request.cmd)
    } else {
        let argv = split_command(request.cmd);
        let Some((program, rest)) = argv.split_first() else {
            return Err(CallError::Invocation("command must not be empty".to_string()));
        };
        let mut command = Command::new(program);
        command.args(rest);
        command
    };
    if let Some(cwd) = request.cwd {
        command.current_dir(cwd);
    }
    command.envs(request.env.iter().map(|(key, value)| (key, value)));
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = command.spawn().map_err(|err| CallError::CommandFailed {
        command: request.cmd.to_string(),
        message: err.to_string(),
    })?;
    let pid = child.id();
    let output = child
        .wait_with_output()
        .map_err(|err| CallError::CommandFailed {
            command: request.cmd.to_string(),
            message: err.to_string(),
        })?;

    let retcode = output.status.code().unwrap_or(-1);
    let result = CommandOutput {
        pid: Some(pid),
        retcode,
        stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
    };
    if retcode == 0 {
        debug!(
            "event=cmd_run module=capability status=ok retcode=0 duration_ms={}",
            started_at.elapsed().as_millis()
        );
    } else {
        warn!(
            "event=cmd_run module=capability status=nonzero retcode={} duration_ms={} cmd={}",
            retcode,
            started_at.elapsed().as_millis(),
            request.cmd
        );
    }
    Ok(result)
}

#[cfg(windows)]
fn shell_command(cmd: &str) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", cmd]);
    command
}

#[cfg(not(windows))]
fn shell_command(cmd: &str) -> Command {
    let mut command = Command::new("sh");
    command.args(["-c", cmd]);
    command
}

#[cfg(test)]
mod tests {
    use super::{run_command, split_command, CommandRequest};
    use crate::capability::args::CallError;

    #[test]
    fn splits_quoted_groups() {
        assert_eq!(
            split_command(r#"getent group "domain users" 'x y' plain"#),
            vec!["getent", "group", "domain users", "x y", "plain"]
        );
        assert!(split_command("   ").is_empty());
    }

    #[test]
    fn empty_command_is_invocation_error() {
        let err = run_command(&CommandRequest {
            cmd: "  ",
            ..CommandRequest::default()
        })
        .expect_err("empty command must fail");
        assert!(matches!(err, CallError::Invocation(_)));
    }

    #[test]
    fn missing_binary_is_command_failure() {
        let err = run_command(&CommandRequest {
            cmd: "saltloader-definitely-missing-binary --flag",
            ..CommandRequest::default()
        })
        .expect_err("missing binary must fail");
        assert!(matches!(err, CallError::CommandFailed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn shell_mode_captures_output_and_retcode() {
        let output = run_command(&CommandRequest {
            cmd: "echo hello; echo oops >&2; exit 3",
            python_shell: true,
            ..CommandRequest::default()
        })
        .expect("sh should run");
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.stderr, "oops");
        assert_eq!(output.retcode, 3);
        assert!(output.pid.is_some());
    }
}
