use crate::error::ProbeError;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::runtime::Handle;

// ==================================================================================
// TRAIT DEFINITION (Allows Mocking for Tests)
// ==================================================================================

pub trait CommandRunner: Send + Sync {
    /// Runs `program args..` to completion and returns its stdout.
    fn run(&self, program: &str, args: &[&str]) -> Result<String, ProbeError>;

    fn is_discoverable(&self, program: &str) -> bool {
        is_on_path(program)
    }
}

/// Looks `program` up on `PATH` the way a shell would.
pub fn is_on_path(program: &str) -> bool {
    if program.contains('/') {
        return is_executable(Path::new(program));
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(program))))
        .unwrap_or(false)
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

// ==================================================================================
// SYSTEM RUNNER (Real Implementation)
// ==================================================================================

/// Executes commands on the tokio runtime, bounded by a timeout.
///
/// Must be called from outside the runtime (the event-loop thread or a
/// `spawn_blocking` task), since it blocks on the handle.
#[derive(Clone)]
pub struct SystemRunner {
    handle: Handle,
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(handle: Handle, timeout: Duration) -> Self {
        Self { handle, timeout }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, ProbeError> {
        let output = self.handle.block_on(async {
            tokio::time::timeout(
                self.timeout,
                Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true)
                    .output(),
            )
            .await
        });

        match output {
            Err(_) => Err(ProbeError::TimedOut {
                program: program.to_string(),
            }),
            Ok(Err(e)) => Err(ProbeError::unavailable(program, e)),
            Ok(Ok(out)) if !out.status.success() => {
                Err(ProbeError::unavailable(program, out.status))
            }
            Ok(Ok(out)) => Ok(String::from_utf8_lossy(&out.stdout).into_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_are_checked_directly() {
        assert!(is_on_path("/bin/sh"));
        assert!(!is_on_path("/definitely/not/here"));
    }

    #[test]
    fn missing_programs_are_not_discoverable() {
        assert!(!is_on_path("eww-osd-no-such-tool-4242"));
    }

    #[test]
    fn runner_reports_missing_tools_as_unavailable() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let runner = SystemRunner::new(runtime.handle().clone(), Duration::from_secs(2));
        let err = runner.run("eww-osd-no-such-tool-4242", &[]).unwrap_err();
        assert!(matches!(err, ProbeError::ToolUnavailable { .. }));
    }

    #[test]
    fn runner_times_out_slow_commands() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let runner = SystemRunner::new(runtime.handle().clone(), Duration::from_millis(50));
        let err = runner.run("sleep", &["5"]).unwrap_err();
        assert!(matches!(err, ProbeError::TimedOut { .. }));
    }

    #[test]
    fn runner_captures_stdout() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let runner = SystemRunner::new(runtime.handle().clone(), Duration::from_secs(2));
        let out = runner.run("echo", &["Volume:", "42%"]).unwrap();
        assert_eq!(out.trim(), "Volume: 42%");
    }
}
