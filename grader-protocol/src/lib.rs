#![deny(clippy::all)]

pub mod challenge;
pub mod execution;
pub mod verdict;

pub use self::challenge::{ChallengeSpec, ErrorClass, GradeRequest, Submission, Track};
pub use self::execution::{ExecutionResult, Phase};
pub use self::verdict::{Outcome, Verdict};
