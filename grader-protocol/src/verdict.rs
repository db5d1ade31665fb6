use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Solved,
    Incorrect,
    CompileError,
    RuntimeError,
    Timeout,
    InternalError,
}

impl Outcome {
    pub fn is_solved(self) -> bool {
        self == Outcome::Solved
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Solved => "Solved",
            Outcome::Incorrect => "Incorrect",
            Outcome::CompileError => "CompileError",
            Outcome::RuntimeError => "RuntimeError",
            Outcome::Timeout => "Timeout",
            Outcome::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The final result of one grading call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: Outcome,
    pub message: String,
    pub stdout: String,
    pub stderr: String,
}

impl Verdict {
    pub fn new(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    pub fn is_solved(&self) -> bool {
        self.outcome.is_solved()
    }
}
