//! Blocking wrapper around the `svn` command line.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info, instrument, warn};

use super::parser::{
    parse_committed_revision, parse_svn_diff_summarize, parse_svn_info, parse_svn_list,
    parse_svn_log, parse_svn_status, SvnDiffEntry, SvnInfo, SvnLogEntry, SvnStatusEntry,
};
use crate::errors::{ScmError, ScmOperation};

/// Runs `svn` subcommands non-interactively with optional credentials.
#[derive(Clone, Default)]
pub struct SvnClient {
    username: Option<String>,
    password: Option<String>,
}

impl std::fmt::Debug for SvnClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvnClient")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl SvnClient {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }

    pub fn info(&self, target: &str) -> Result<SvnInfo, ScmError> {
        let output = self.run(ScmOperation::Info, None, &["info", "--xml", target])?;
        parse_svn_info(&output)
    }

    /// `svn log` over `range` (e.g. `HEAD:10`), newest first when the range
    /// is descending.
    #[instrument(skip(self))]
    pub fn log(&self, target: &str, range: &str) -> Result<Vec<SvnLogEntry>, ScmError> {
        let output = self.run(
            ScmOperation::History,
            None,
            &["log", "--xml", "--verbose", "-r", range, target],
        )?;
        Ok(parse_svn_log(&output))
    }

    pub fn status(&self, dir: &Path) -> Result<Vec<SvnStatusEntry>, ScmError> {
        let output = self.run(ScmOperation::Info, Some(dir), &["status", "--xml"])?;
        Ok(parse_svn_status(&output))
    }

    pub fn diff_summary(&self, dir: &Path, revisions: Option<&str>) -> Result<Vec<SvnDiffEntry>, ScmError> {
        let mut args = vec!["diff", "--summarize", "--xml"];
        if let Some(revisions) = revisions {
            args.extend(["-r", revisions]);
        }
        args.push(".");
        let output = self.run(ScmOperation::Diff, Some(dir), &args)?;
        Ok(parse_svn_diff_summarize(&output))
    }

    pub fn diff_text(&self, dir: &Path, revisions: Option<&str>, path: &str) -> Result<String, ScmError> {
        let mut args = vec!["diff"];
        if let Some(revisions) = revisions {
            args.extend(["-r", revisions]);
        }
        args.push(path);
        self.run(ScmOperation::Diff, Some(dir), &args)
    }

    pub fn list(&self, url: &str) -> Result<Vec<String>, ScmError> {
        let output = self.run(ScmOperation::Info, None, &["list", url])?;
        let names = parse_svn_list(&output);
        debug!(url, count = names.len(), "listed entries");
        Ok(names)
    }

    /// Server-side copy; returns the committed revision.
    #[instrument(skip(self, message))]
    pub fn copy(
        &self,
        op: ScmOperation,
        source: &str,
        revision: Option<&str>,
        destination: &str,
        message: &str,
    ) -> Result<u64, ScmError> {
        let mut args = vec!["copy"];
        if let Some(revision) = revision {
            args.extend(["-r", revision]);
        }
        args.extend([source, destination, "-m", message]);
        let output = self.run(op, None, &args)?;
        let revision = committed(op, &output)?;
        info!(destination, revision, "svn copy committed");
        Ok(revision)
    }

    #[instrument(skip(self, message))]
    pub fn delete_url(&self, op: ScmOperation, url: &str, message: &str) -> Result<u64, ScmError> {
        let output = self.run(op, None, &["delete", url, "-m", message])?;
        committed(op, &output)
    }

    pub fn export(&self, url: &str, revision: u64, destination: &Path) -> Result<(), ScmError> {
        let revision = revision.to_string();
        let destination = destination.to_string_lossy();
        self.run(
            ScmOperation::RevertCommits,
            None,
            &["export", "--force", "-r", &revision, url, &destination],
        )?;
        Ok(())
    }

    /// Commit `paths` (or everything) in `dir`. `None` when nothing changed.
    #[instrument(skip(self, message, paths), fields(dir = %dir.display()))]
    pub fn commit(&self, dir: &Path, message: &str, paths: &[String]) -> Result<Option<u64>, ScmError> {
        let mut args = vec!["commit", "-m", message];
        if paths.is_empty() {
            args.push(".");
        } else {
            args.extend(paths.iter().map(String::as_str));
        }
        let output = self.run(ScmOperation::Commit, Some(dir), &args)?;
        let revision = parse_committed_revision(&output);
        match revision {
            Some(revision) => info!(revision, "svn commit succeeded"),
            None => debug!("svn commit had nothing to send"),
        }
        Ok(revision)
    }

    pub fn run(&self, op: ScmOperation, dir: Option<&Path>, args: &[&str]) -> Result<String, ScmError> {
        let mut cmd = Command::new("svn");
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.args(args).arg("--non-interactive").arg("--no-auth-cache");
        if let Some(username) = &self.username {
            cmd.arg("--username").arg(username);
        }
        if let Some(password) = &self.password {
            cmd.arg("--password").arg(password);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        debug!(cmd = %format!("svn {}", args.join(" ")), "running svn command");
        let output = cmd.output().map_err(ScmError::io(op))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "svn command failed");
            return Err(ScmError::SvnCommand {
                operation: op,
                exit_code,
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn committed(op: ScmOperation, output: &str) -> Result<u64, ScmError> {
    parse_committed_revision(output)
        .ok_or_else(|| ScmError::failed(op, format!("no committed revision in svn output: {output}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_password() {
        let client = SvnClient::new(Some("user".into()), Some("secret".into()));
        let rendered = format!("{client:?}");
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_committed_requires_revision() {
        assert_eq!(committed(ScmOperation::Tag, "Committed revision 7.").unwrap(), 7);
        let err = committed(ScmOperation::Tag, "").unwrap_err();
        assert_eq!(err.operation(), ScmOperation::Tag);
    }
}
