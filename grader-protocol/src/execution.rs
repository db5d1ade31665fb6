use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Compile,
    Run,
}

/// What one compile or run step produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub phase: Phase,
    pub succeeded: bool,
    pub exit_status: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub real_time: u64, // milliseconds
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    /// A result for a step that never produced a process.
    pub fn failure(phase: Phase, stderr: impl Into<String>) -> Self {
        Self {
            phase,
            succeeded: false,
            exit_status: None,
            signal: None,
            timed_out: false,
            real_time: 0,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_compile_failure(&self) -> bool {
        self.phase == Phase::Compile && !self.succeeded
    }
}
