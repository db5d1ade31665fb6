use crate::config::Config;
use crate::exec::{CompiledRun, CompiledRunner, RUN_TIMED_OUT};
use crate::interp::{self, Limits};
use crate::lang::cpp::Cpp;
use crate::lang::Language;
use crate::store::VerdictStore;
use crate::structural;
use crate::value::{self, Value, DEFAULT_TOLERANCE};

use grader_protocol::{ChallengeSpec, Outcome, Submission, Track, Verdict};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const SOLVED: &str = "Correct! Level solved.";
pub const COMPILE_FAILED: &str = "Compilation error. See compiler output below.";
pub const RUN_FAILED: &str = "Runtime error or non-zero exit. See stderr below.";
pub const STRUCTURE_MISMATCH: &str = "The code still does not match the repaired version.";

/// Binding names checked before all others, in this order.
pub const CONVENTIONAL_NAMES: [&str; 6] = ["result", "output", "answer", "ans", "res", "value"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingState {
    Pending,
    Dispatched,
    Compiling,
    Running,
    SandboxExecuting,
    StructuralComparing,
    Verdicted,
}

impl GradingState {
    pub fn can_advance(self, next: GradingState) -> bool {
        use GradingState::*;
        matches!(
            (self, next),
            (Pending, Dispatched)
                | (Dispatched, Compiling)
                | (Dispatched, SandboxExecuting)
                | (Dispatched, StructuralComparing)
                | (Compiling, Running)
                | (Dispatched, Verdicted)
                | (Compiling, Verdicted)
                | (Running, Verdicted)
                | (SandboxExecuting, Verdicted)
                | (StructuralComparing, Verdicted)
        )
    }
}

/// Per-call grading state. Lives for exactly one `grade` call.
#[derive(Debug)]
struct GradingContext {
    state: GradingState,
}

impl GradingContext {
    fn new() -> Self {
        Self {
            state: GradingState::Pending,
        }
    }

    fn advance(&mut self, next: GradingState) {
        if !self.state.can_advance(next) {
            warn!(from = ?self.state, to = ?next, "illegal grading state transition");
            debug_assert!(false, "illegal grading state transition: {:?} -> {:?}", self.state, next);
        }
        debug!(from = ?self.state, to = ?next, "grading state");
        self.state = next;
    }
}

pub struct Grader {
    runner: CompiledRunner,
    limits: Limits,
}

impl Grader {
    pub fn new(config: Config) -> Self {
        Self::with_language(config, Box::new(Cpp::default()))
    }

    pub fn with_language(config: Config, lang: Box<dyn Language>) -> Self {
        Self {
            runner: CompiledRunner::new(&config.executor, lang),
            limits: config.interpreter.to_limits(),
        }
    }

    /// Grades one submission. Every failure, including faults in the engine
    /// itself, comes back as a verdict.
    #[tracing::instrument(
        skip_all,
        fields(
            title = challenge.title.as_deref().unwrap_or(""),
            track = challenge.track.as_str(),
            class = %challenge.error_classification,
        )
    )]
    pub async fn grade(&self, challenge: &ChallengeSpec, submission: &Submission) -> Verdict {
        let mut ctx = GradingContext::new();
        ctx.advance(GradingState::Dispatched);

        let verdict = match self.dispatch(&mut ctx, challenge, submission).await {
            Ok(verdict) => verdict,
            Err(err) => {
                error!(?err, "internal grading error");
                Verdict::new(
                    Outcome::InternalError,
                    format!("Internal grading error: {}", err),
                )
            }
        };

        ctx.advance(GradingState::Verdicted);
        info!(outcome = %verdict.outcome, "verdict");
        verdict
    }

    /// Grades, then hands the verdict to `store` under a fresh attempt id.
    pub async fn grade_and_record(
        &self,
        challenge_id: &str,
        challenge: &ChallengeSpec,
        submission: &Submission,
        store: &dyn VerdictStore,
    ) -> Result<(Uuid, Verdict)> {
        let attempt_id = Uuid::new_v4();
        let verdict = self.grade(challenge, submission).await;
        store
            .record(&verdict, challenge_id, attempt_id)
            .await
            .with_context(|| format!("failed to record verdict: attempt_id = {}", attempt_id))?;
        Ok((attempt_id, verdict))
    }

    /// Grades the reference solution against its own challenge.
    pub async fn self_check(&self, challenge: &ChallengeSpec, stdin: Option<String>) -> Verdict {
        let submission = Submission {
            source: challenge.reference_solution.clone(),
            stdin,
        };
        self.grade(challenge, &submission).await
    }

    async fn dispatch(
        &self,
        ctx: &mut GradingContext,
        challenge: &ChallengeSpec,
        submission: &Submission,
    ) -> Result<Verdict> {
        if challenge.error_classification.is_syntax() {
            ctx.advance(GradingState::StructuralComparing);
            return Ok(self.grade_structural(challenge, submission));
        }

        let expected = value::parse_expected(&challenge.expected_output)
            .context("malformed expected output")?;

        match challenge.track {
            Track::Compiled => self.grade_compiled(ctx, challenge, submission, &expected).await,
            Track::Interpreted => {
                ctx.advance(GradingState::SandboxExecuting);
                self.grade_interpreted(challenge, submission, &expected).await
            }
        }
    }

    fn grade_structural(&self, challenge: &ChallengeSpec, submission: &Submission) -> Verdict {
        let token = match challenge.track {
            Track::Compiled => self.runner.lang().comment_token(),
            Track::Interpreted => interp::COMMENT_TOKEN,
        };
        if structural::equivalent(&submission.source, &challenge.reference_solution, token) {
            Verdict::new(Outcome::Solved, SOLVED)
        } else {
            Verdict::new(Outcome::Incorrect, STRUCTURE_MISMATCH)
        }
    }

    async fn grade_compiled(
        &self,
        ctx: &mut GradingContext,
        challenge: &ChallengeSpec,
        submission: &Submission,
        expected: &Value,
    ) -> Result<Verdict> {
        ctx.advance(GradingState::Compiling);
        let workspace = self.runner.workspace()?;
        let compile = self.runner.compile(&workspace, &submission.source).await?;
        if !compile.succeeded {
            return Ok(Verdict::new(Outcome::CompileError, COMPILE_FAILED)
                .with_output(compile.stdout, compile.stderr));
        }

        ctx.advance(GradingState::Running);
        let run = self.runner.run(&workspace, submission.stdin()).await?;
        drop(workspace);

        if run.timed_out {
            return Ok(Verdict::new(Outcome::Timeout, RUN_TIMED_OUT).with_output("", run.stderr));
        }
        if !run.succeeded {
            return Ok(Verdict::new(Outcome::RuntimeError, RUN_FAILED).with_output(run.stdout, run.stderr));
        }

        let solved = matches_expected(&run.stdout, &[], &challenge.expected_output, expected)
            || matches_reference(
                &run.stdout,
                self.compiled_reference(challenge, submission.stdin()).await,
            );
        Ok(conclude(solved, &challenge.expected_output, run.stdout, run.stderr))
    }

    async fn compiled_reference(&self, challenge: &ChallengeSpec, stdin: &str) -> Option<String> {
        match self.runner.execute(&challenge.reference_solution, stdin).await {
            Ok(CompiledRun { run: Some(run), .. }) if run.succeeded => Some(run.stdout),
            Ok(_) => {
                warn!("reference solution did not run cleanly");
                None
            }
            Err(err) => {
                warn!(?err, "failed to run reference solution");
                None
            }
        }
    }

    async fn grade_interpreted(
        &self,
        challenge: &ChallengeSpec,
        submission: &Submission,
        expected: &Value,
    ) -> Result<Verdict> {
        let execution = interp::execute_isolated(
            submission.source.clone(),
            submission.stdin().to_owned(),
            self.limits.clone(),
        )
        .await?;

        if let Some(err) = execution.error {
            let outcome = if execution.timed_out {
                Outcome::Timeout
            } else {
                Outcome::RuntimeError
            };
            return Ok(Verdict::new(outcome, err.clone()).with_output(execution.printed, err));
        }

        let solved = matches_expected(
            &execution.printed,
            &execution.bindings,
            &challenge.expected_output,
            expected,
        ) || matches_reference(
            &execution.printed,
            self.interpreted_reference(challenge, submission.stdin()).await,
        );
        Ok(conclude(solved, &challenge.expected_output, execution.printed, String::new()))
    }

    async fn interpreted_reference(&self, challenge: &ChallengeSpec, stdin: &str) -> Option<String> {
        let result = interp::execute_isolated(
            challenge.reference_solution.clone(),
            stdin.to_owned(),
            self.limits.clone(),
        )
        .await;
        match result {
            Ok(execution) if execution.succeeded => Some(execution.printed),
            Ok(execution) => {
                warn!(error = ?execution.error, "reference solution failed");
                None
            }
            Err(err) => {
                warn!(?err, "failed to run reference solution");
                None
            }
        }
    }
}

/// Printed output against the expected text, then bindings against the
/// parsed expected value.
fn matches_expected(
    printed: &str,
    bindings: &[(String, Value)],
    expected_text: &str,
    expected: &Value,
) -> bool {
    let expected_text = expected_text.trim();
    if expected_text.is_empty() {
        return false;
    }
    if printed.trim() == expected_text {
        debug!("printed output matches expected text");
        return true;
    }

    let conventional = CONVENTIONAL_NAMES
        .iter()
        .filter_map(|name| bindings.iter().find(|(n, _)| n == name));
    for (name, value) in conventional.chain(bindings) {
        if value::equivalent(value, expected, DEFAULT_TOLERANCE) {
            debug!(%name, "binding matches expected value");
            return true;
        }
    }
    false
}

fn matches_reference(printed: &str, reference: Option<String>) -> bool {
    match reference {
        Some(reference) => {
            let reference = reference.trim();
            let matched = !reference.is_empty() && printed.trim() == reference;
            if matched {
                debug!("printed output matches reference output");
            }
            matched
        }
        None => false,
    }
}

fn conclude(solved: bool, expected_text: &str, stdout: String, stderr: String) -> Verdict {
    if solved {
        return Verdict::new(Outcome::Solved, SOLVED).with_output(stdout, stderr);
    }
    let message = format!(
        "Output mismatch. Expected: \"{}\", Got: \"{}\"",
        expected_text.trim(),
        stdout.trim()
    );
    Verdict::new(Outcome::Incorrect, message).with_output(stdout, stderr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()
    }

    #[test]
    fn transitions() {
        use GradingState::*;
        assert!(Pending.can_advance(Dispatched));
        assert!(Compiling.can_advance(Running));
        assert!(Compiling.can_advance(Verdicted));
        assert!(SandboxExecuting.can_advance(Verdicted));
        assert!(!Pending.can_advance(Verdicted));
        assert!(!Running.can_advance(Compiling));
        assert!(!SandboxExecuting.can_advance(Running));
        assert!(!Verdicted.can_advance(Dispatched));
    }

    #[test]
    fn printed_output_wins() {
        let expected = value::parse_expected("Survivors: 5").unwrap();
        assert!(matches_expected("Survivors: 5\n", &[], "Survivors: 5", &expected));
        assert!(!matches_expected("Survivors: 4\n", &[], "Survivors: 5", &expected));
    }

    #[test]
    fn bindings_are_compared_by_value() {
        let expected = value::parse_expected("(70, 52.5)").unwrap();
        let found = bindings(&[
            ("x", Value::Integer(1)),
            (
                "pair",
                Value::Tuple(vec![Value::Integer(70), Value::Float(52.5004)]),
            ),
        ]);
        assert!(matches_expected("", &found, "(70, 52.5)", &expected));

        let wrong = bindings(&[(
            "result",
            Value::Sequence(vec![Value::Integer(70), Value::Float(52.5)]),
        )]);
        assert!(!matches_expected("", &wrong, "(70, 52.5)", &expected));
    }

    #[test]
    fn empty_expected_never_matches() {
        let expected = value::parse_expected("").unwrap();
        let found = bindings(&[("s", Value::String(String::new()))]);
        assert!(!matches_expected("", &found, "   ", &expected));
    }

    #[test]
    fn reference_output() {
        assert!(matches_reference("42\n", Some(" 42".into())));
        assert!(!matches_reference("", Some("\n".into())));
        assert!(!matches_reference("42", None));
    }

    #[test]
    fn mismatch_message() {
        let verdict = conclude(false, " 10\n", "9\n".into(), String::new());
        assert_eq!(verdict.outcome, Outcome::Incorrect);
        assert_eq!(verdict.message, "Output mismatch. Expected: \"10\", Got: \"9\"");
        assert_eq!(verdict.stdout, "9\n");
    }
}
