//! External build invocation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::errors::BuildError;

/// Lines of build stderr kept in a [`BuildError::CommandFailed`].
const STDERR_TAIL_LINES: usize = 20;

/// One invocation of the project build.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub working_directory: PathBuf,
    /// Extra arguments appended to the configured command.
    pub arguments: Vec<String>,
    /// Variables exported to the build process.
    pub environment: BTreeMap<String, String>,
}

pub trait BuildInvoker: Send + Sync {
    fn build(&self, request: &BuildRequest) -> Result<(), BuildError>;
}

/// Runs a configured command line (program plus arguments).
#[derive(Debug, Clone)]
pub struct CommandBuildInvoker {
    program: String,
    arguments: Vec<String>,
}

impl CommandBuildInvoker {
    pub fn new(command: &[String]) -> Result<Self, BuildError> {
        let (program, arguments) = command.split_first().ok_or(BuildError::NotConfigured)?;
        if program.trim().is_empty() {
            return Err(BuildError::NotConfigured);
        }
        Ok(Self {
            program: program.clone(),
            arguments: arguments.to_vec(),
        })
    }
}

impl BuildInvoker for CommandBuildInvoker {
    fn build(&self, request: &BuildRequest) -> Result<(), BuildError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.arguments)
            .args(&request.arguments)
            .current_dir(&request.working_directory)
            .envs(&request.environment)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!(program = %self.program, dir = %request.working_directory.display(), "running build");
        let output = cmd.output()?;
        debug!(stdout = %String::from_utf8_lossy(&output.stdout), "build output");
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        let exit_code = output.status.code().unwrap_or(-1);
        warn!(exit_code, "build failed");
        Err(BuildError::CommandFailed {
            exit_code,
            stderr: tail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandBuildInvoker {
        CommandBuildInvoker::new(&["sh".to_string(), "-c".to_string(), script.to_string()]).unwrap()
    }

    #[test]
    fn test_empty_command_is_not_configured() {
        assert!(matches!(
            CommandBuildInvoker::new(&[]),
            Err(BuildError::NotConfigured)
        ));
        assert!(matches!(
            CommandBuildInvoker::new(&[" ".to_string()]),
            Err(BuildError::NotConfigured)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_exports_environment() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = shell("printf '%s' \"$RELEASE_TAG\" > tag.txt");
        let request = BuildRequest {
            working_directory: dir.path().to_path_buf(),
            arguments: Vec::new(),
            environment: BTreeMap::from([("RELEASE_TAG".to_string(), "app-1.0".to_string())]),
        };
        invoker.build(&request).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("tag.txt")).unwrap(), "app-1.0");
    }

    #[cfg(unix)]
    #[test]
    fn test_build_failure_keeps_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = shell("echo broken >&2; exit 3");
        let request = BuildRequest {
            working_directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        match invoker.build(&request).unwrap_err() {
            BuildError::CommandFailed { exit_code, stderr } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
