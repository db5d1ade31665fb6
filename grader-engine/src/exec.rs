use crate::config::Executor;
use crate::lang::Language;

use grader_protocol::{ExecutionResult, Phase};
use grader_sandbox::signal::signal_name;
use grader_sandbox::{ResourceLimits, SandboxArgs, SandboxError, SandboxOutput};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::debug;

pub const COMPILE_TIMED_OUT: &str = "Compilation timed out.";
pub const RUN_TIMED_OUT: &str = "Execution timed out.";

/// A disposable directory for one compile-and-run. Removed on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("grader-");
        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root).with_context(|| {
                    format!("failed to create workspace root: path = {}", root.display())
                })?;
                let root = fs::canonicalize(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .context("failed to create workspace")?;
        debug!(path = %dir.path().display(), "workspace created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Both phases of one compiled-track attempt.
#[derive(Debug, Clone)]
pub struct CompiledRun {
    pub compile: ExecutionResult,
    /// Absent when compilation failed.
    pub run: Option<ExecutionResult>,
}

pub struct CompiledRunner {
    lang: Box<dyn Language>,
    workspace_root: Option<PathBuf>,
    compile_timeout: u64, // milliseconds
    run_timeout: u64,     // milliseconds
    limits: ResourceLimits,
}

impl CompiledRunner {
    pub fn new(config: &Executor, lang: Box<dyn Language>) -> Self {
        Self {
            lang,
            workspace_root: config.workspace_root.clone(),
            compile_timeout: config.compile_timeout,
            run_timeout: config.run_timeout,
            limits: config.hard_limit.to_resource_limits(),
        }
    }

    pub fn lang(&self) -> &dyn Language {
        &*self.lang
    }

    pub fn workspace(&self) -> Result<Workspace> {
        Workspace::create(self.workspace_root.as_deref())
    }

    /// Writes `source` into the workspace and builds it. The toolchain runs
    /// under the wall-clock timeout only.
    pub async fn compile(&self, workspace: &Workspace, source: &str) -> Result<ExecutionResult> {
        let src_path = workspace.path().join(self.lang.src_name());
        tokio::fs::write(&src_path, source)
            .await
            .with_context(|| format!("failed to write source: path = {}", src_path.display()))?;

        let mut args = SandboxArgs::new(self.lang.compile_cmd(workspace.path()));
        args.current_dir = Some(workspace.path().to_owned());
        args.real_time_limit = self.compile_timeout;

        match grader_sandbox::run(&args).await {
            Ok(output) => Ok(to_result(Phase::Compile, output, COMPILE_TIMED_OUT)),
            Err(SandboxError::NotFound(bin)) => Ok(ExecutionResult::failure(
                Phase::Compile,
                format!("Toolchain unavailable: {} was not found.", bin.display()),
            )),
            Err(err) => Err(err).context("failed to invoke toolchain"),
        }
    }

    /// Runs the built artifact under the resource ceilings.
    pub async fn run(&self, workspace: &Workspace, stdin: &str) -> Result<ExecutionResult> {
        let mut args = SandboxArgs::new(self.lang.run_cmd(workspace.path()));
        args.current_dir = Some(workspace.path().to_owned());
        args.stdin = stdin.as_bytes().to_vec();
        args.real_time_limit = self.run_timeout;
        args.limits = Some(self.limits);

        let output = grader_sandbox::run(&args)
            .await
            .context("failed to run submission")?;
        Ok(to_result(Phase::Run, output, RUN_TIMED_OUT))
    }

    /// Compiles, then runs when compilation succeeded. The workspace is gone
    /// when this returns, whatever the outcome.
    pub async fn execute(&self, source: &str, stdin: &str) -> Result<CompiledRun> {
        let workspace = self.workspace()?;
        let compile = self.compile(&workspace, source).await?;
        if !compile.succeeded {
            return Ok(CompiledRun { compile, run: None });
        }
        let run = self.run(&workspace, stdin).await?;
        Ok(CompiledRun {
            compile,
            run: Some(run),
        })
    }
}

fn to_result(phase: Phase, output: SandboxOutput, timeout_message: &str) -> ExecutionResult {
    let succeeded = output.is_success();
    let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if output.timed_out {
        stderr = timeout_message.to_owned();
    } else if let Some(signal) = output.signal {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!(
            "Process terminated by signal {} ({})",
            signal,
            signal_name(signal).unwrap_or("unknown")
        ));
    }
    ExecutionResult {
        phase,
        succeeded,
        exit_status: output.code,
        signal: output.signal,
        timed_out: output.timed_out,
        real_time: output.real_time,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> SandboxOutput {
        SandboxOutput {
            code: Some(0),
            signal: None,
            timed_out: false,
            real_time: 3,
            stdout: b"10\n".to_vec(),
            stderr: Vec::new(),
        }
    }

    #[test]
    fn success() {
        let result = to_result(Phase::Run, output(), RUN_TIMED_OUT);
        assert!(result.succeeded);
        assert_eq!(result.stdout, "10\n");
        assert_eq!(result.stderr, "");
    }

    #[test]
    fn timeout_replaces_stderr() {
        let out = SandboxOutput {
            code: None,
            signal: Some(9),
            timed_out: true,
            ..output()
        };
        let result = to_result(Phase::Compile, out, COMPILE_TIMED_OUT);
        assert!(!result.succeeded);
        assert!(result.timed_out);
        assert_eq!(result.stderr, COMPILE_TIMED_OUT);
    }

    #[test]
    fn signal_is_noted() {
        let out = SandboxOutput {
            code: None,
            signal: Some(11),
            stderr: b"partial".to_vec(),
            ..output()
        };
        let result = to_result(Phase::Run, out, RUN_TIMED_OUT);
        assert!(!result.succeeded);
        assert_eq!(result.stderr, "partial\nProcess terminated by signal 11 (SIGSEGV)");
    }

    #[test]
    fn workspace_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(Some(root.path())).unwrap();
        let path = workspace.path().to_owned();
        assert!(path.starts_with(fs::canonicalize(root.path()).unwrap()));
        fs::write(path.join("file"), "x").unwrap();
        drop(workspace);
        assert!(!path.exists());
    }
}
