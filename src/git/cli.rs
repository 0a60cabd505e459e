use std::{
    io::Read,
    path::Path,
    process::{Child, ChildStdout, Command, Stdio},
};

use log::debug;

use super::{GitBackend, GitError, TarSource};

/// Subprocess-backed [`GitBackend`] invoking the system git binary.
///
/// Commands run with interactive prompts and hook execution disabled;
/// credentials are whatever the surrounding environment provides.
pub struct GitCli {
    git_path: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            git_path: "git".into(),
        }
    }

    fn command(&self, git_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.args(["-c", "core.hooksPath="]);
        cmd.arg("--git-dir");
        cmd.arg(git_dir);
        cmd.stdin(Stdio::null());
        cmd
    }

    fn run(&self, mut cmd: Command, fail: impl Fn(String) -> GitError) -> Result<Vec<u8>, GitError> {
        debug!("running {:?}", cmd);
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(fail(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(output.stdout)
    }
}

/// Reject values that git could mistake for a command-line flag, and values
/// that cannot appear in a well-formed ref or path.
fn validate_argument(value: &str, what: &str) -> Result<(), GitError> {
    if value.starts_with('-') {
        return Err(GitError::InvalidInput(format!(
            "{what} cannot start with '-'"
        )));
    }
    if value.bytes().any(|b| b < 0x20) {
        return Err(GitError::InvalidInput(format!(
            "{what} cannot contain control characters"
        )));
    }
    Ok(())
}

impl GitBackend for GitCli {
    fn init_bare(&self, git_dir: &Path) -> Result<(), GitError> {
        let mut cmd = self.command(git_dir);
        cmd.args(["init", "--bare"]);
        self.run(cmd, GitError::Init)?;
        Ok(())
    }

    fn fetch_branch(&self, git_dir: &Path, repo: &str, branch: &str) -> Result<(), GitError> {
        validate_argument(repo, "repository identifier")?;
        validate_argument(branch, "branch")?;
        let mut cmd = self.command(git_dir);
        cmd.arg("fetch");
        cmd.arg(repo);
        cmd.arg(format!("+{branch}:{branch}"));
        self.run(cmd, GitError::Fetch)?;
        Ok(())
    }

    fn resolve_ref(&self, git_dir: &Path, refname: &str) -> Result<String, GitError> {
        validate_argument(refname, "ref")?;
        let mut cmd = self.command(git_dir);
        cmd.arg("rev-parse");
        cmd.arg(refname);
        let stdout = self.run(cmd, GitError::Resolve)?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    fn export_tar(
        &self,
        git_dir: &Path,
        commit: &str,
        tree: &str,
    ) -> Result<Box<dyn TarSource>, GitError> {
        validate_argument(commit, "commit")?;
        validate_argument(tree, "tree")?;
        let mut cmd = self.command(git_dir);
        cmd.args(["archive", "--format", "tar"]);
        cmd.arg(format!("{commit}:{tree}"));
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        debug!("running {:?}", cmd);
        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GitError::Archive("no stdout pipe".to_string()))?;
        Ok(Box::new(GitTarStream { child, stdout }))
    }
}

struct GitTarStream {
    child: Child,
    stdout: ChildStdout,
}

impl std::io::Read for GitTarStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl TarSource for GitTarStream {
    fn finish(&mut self) -> Result<(), GitError> {
        let status = self.child.wait()?;
        if !status.success() {
            let mut stderr = String::new();
            if let Some(pipe) = self.child.stderr.as_mut() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(GitError::Archive(stderr.trim().to_string()));
        }
        Ok(())
    }
}

impl Drop for GitTarStream {
    fn drop(&mut self) {
        // An abandoned export must not leave a zombie behind.
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
