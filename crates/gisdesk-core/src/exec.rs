//! Bounded execution of short external queries.

use std::collections::BTreeMap;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Run `program args...` to completion, capturing output, killing it if it
/// outlives `timeout`.
pub async fn run_captured(
    program: &str,
    args: &[&str],
    env: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<Output> {
    let cmd = format!("{} {}", program, args.join(" "));
    debug!("exec: {}", cmd);

    let child = Command::new(program)
        .args(args)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(Error::Timeout {
            cmd,
            secs: timeout.as_secs(),
        }),
    }
}

/// Like [`run_captured`], but a non-zero exit is an error.
pub async fn run_checked(
    program: &str,
    args: &[&str],
    env: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<String> {
    let output = run_captured(program, args, env, timeout).await?;

    if !output.status.success() {
        return Err(Error::CommandFailed {
            cmd: format!("{} {}", program, args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// First non-empty line of a command's stdout, falling back to stderr.
///
/// Some programs print `--version` to stderr.
pub fn first_line(output: &Output) -> Option<String> {
    [&output.stdout, &output.stderr]
        .into_iter()
        .map(|bytes| String::from_utf8_lossy(bytes).to_string())
        .find_map(|text| {
            text.lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(String::from)
        })
}
