#![deny(clippy::all)]

mod child;
mod parent;

pub mod limit;
pub mod signal;

pub use self::limit::ResourceLimits;

use grader_utils::os_cmd::OsCmd;

use std::io;
use std::path::PathBuf;
use std::time::Instant;

use tracing::debug;

pub const DEFAULT_OUTPUT_LIMIT: usize = 64 * 1024; // bytes

#[derive(Debug, Clone)]
pub struct SandboxArgs {
    pub cmd: OsCmd,

    pub current_dir: Option<PathBuf>,

    pub stdin: Vec<u8>,

    pub real_time_limit: u64, // milliseconds

    /// Ceilings installed in the child before `exec`. `None` runs unlimited.
    pub limits: Option<ResourceLimits>,

    pub output_limit: usize, // bytes per stream
}

#[derive(Debug, Clone)]
pub struct SandboxOutput {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,

    pub real_time: u64, // milliseconds

    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("binary not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to spawn {}: {source}", .bin.display())]
    Spawn {
        bin: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to collect child output: {0}")]
    Io(#[from] io::Error),
}

impl SandboxArgs {
    pub fn new(cmd: OsCmd) -> Self {
        Self {
            cmd,
            current_dir: None,
            stdin: Vec::new(),
            real_time_limit: 2000,
            limits: None,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }
}

impl SandboxOutput {
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }
}

/// Spawns `args.cmd` in a fresh process group and waits for it, killing the
/// whole group once `real_time_limit` elapses.
pub async fn run(args: &SandboxArgs) -> Result<SandboxOutput, SandboxError> {
    let limits = args.limits.map(|l| l.prepare());
    let mut cmd = child::build_command(args, limits);

    debug!(bin = %args.cmd.bin.display(), args = ?args.cmd.args, "spawning child");

    let t0 = Instant::now();
    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(SandboxError::NotFound(args.cmd.bin.clone()))
        }
        Err(source) => {
            return Err(SandboxError::Spawn {
                bin: args.cmd.bin.clone(),
                source,
            })
        }
    };

    parent::run_parent(args, child, t0).await
}
