//! Running external tools with a deadline.

use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Why a tool invocation did not produce a successful exit.
#[derive(Debug)]
pub(crate) enum ToolFailure {
    /// The binary is not on PATH.
    NotFound,
    /// The tool ran longer than allowed and was killed.
    TimedOut(Duration),
    /// The tool exited with a non-zero status.
    Failed { code: Option<i32>, stderr: String },
    /// Spawning or talking to the process failed.
    Io(std::io::Error),
}

impl ToolFailure {
    /// Human-readable description, including `program` for context.
    pub(crate) fn describe(&self, program: &str) -> String {
        match self {
            ToolFailure::NotFound => format!("{} not found", program),
            ToolFailure::TimedOut(limit) => {
                format!("{} timed out after {}s", program, limit.as_secs())
            }
            ToolFailure::Failed { code, stderr } => {
                let code = code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into());
                format!("{} exited with {}: {}", program, code, truncate(stderr, 300))
            }
            ToolFailure::Io(e) => format!("{} execution failed: {}", program, e),
        }
    }
}

/// Run `program` with `args`, optionally feeding `stdin`, and wait at most
/// `timeout` for it to finish.
pub(crate) async fn run_tool(
    program: &str,
    args: &[String],
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<Output, ToolFailure> {
    debug!("Running {} {}", program, args.join(" "));

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ToolFailure::NotFound),
        Err(e) => return Err(ToolFailure::Io(e)),
    };

    if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(text.as_bytes()).await.map_err(ToolFailure::Io)?;
        // Closing stdin signals end of input.
        drop(pipe);
    }

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(ToolFailure::Io(e)),
        Err(_) => return Err(ToolFailure::TimedOut(timeout)),
    };

    if !output.status.success() {
        return Err(ToolFailure::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tool_is_not_found() {
        let result = run_tool(
            "cuesplice-definitely-missing-tool",
            &[],
            None,
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(ToolFailure::NotFound)));
    }

    #[test]
    fn test_describe_failure() {
        let failure = ToolFailure::Failed {
            code: Some(1),
            stderr: "x".repeat(400),
        };
        let text = failure.describe("ffmpeg");
        assert!(text.starts_with("ffmpeg exited with 1: "));
        assert!(text.ends_with("..."));
    }
}
