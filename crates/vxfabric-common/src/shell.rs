//! Shell command execution utilities for fabric daemons.
//!
//! This module provides safe shell command execution with proper quoting
//! to prevent command injection. All device configuration in this project
//! flows through `ovs-vsctl` subprocess invocations against a remote
//! OVSDB endpoint, so every helper here is async and the bounded variant
//! enforces the per-call timeout required for port-control I/O.
//!
//! # Example
//!
//! ```ignore
//! use vxfabric_common::shell::{self, OVS_VSCTL_CMD, shellquote};
//!
//! let cmd = format!("{} --db={} list-br", OVS_VSCTL_CMD, shellquote("tcp:10.0.0.2:6640"));
//! let out = shell::exec_or_throw(&cmd).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{FabricError, FabricResult};

/// Path to the `ovs-vsctl` utility for OVSDB configuration.
pub const OVS_VSCTL_CMD: &str = "/usr/bin/ovs-vsctl";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Wraps the string in double quotes and escapes the characters that have
/// special meaning inside double quotes: `$`, `` ` ``, `"`, `\`, newline.
///
/// # Example
///
/// ```
/// use vxfabric_common::shell::shellquote;
///
/// assert_eq!(shellquote("vxlan_10.0.0.2_0"), "\"vxlan_10.0.0.2_0\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The trimmed stdout output.
    pub stdout: String,
    /// The trimmed stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes a shell command asynchronously.
///
/// The command runs through `/bin/sh -c` to support `--`-chained
/// `ovs-vsctl` transactions.
pub async fn exec(cmd: &str) -> FabricResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing control command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| FabricError::CommandExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let result = ExecResult {
        exit_code,
        stdout,
        stderr,
    };

    if result.success() {
        tracing::trace!(command = %cmd, exit_code = exit_code, "Command succeeded");
    } else {
        tracing::warn!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a shell command and returns an error on non-zero exit.
pub async fn exec_or_throw(cmd: &str) -> FabricResult<String> {
    let result = exec(cmd).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(FabricError::CommandFailed {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}

/// Executes a shell command with a deadline.
///
/// Port-control calls are potentially blocking network I/O against a
/// remote OVSDB; a device that stops answering must not stall the caller
/// past the configured bound.
pub async fn exec_bounded(cmd: &str, timeout: Duration) -> FabricResult<String> {
    match tokio::time::timeout(timeout, exec_or_throw(cmd)).await {
        Ok(result) => result,
        Err(_) => Err(FabricError::Timeout {
            command: cmd.to_string(),
            secs: timeout.as_secs(),
        }),
    }
}
