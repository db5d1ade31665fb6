mod common;

use common::{challenge, grader, has_gxx, init};

use grader_engine::lang::Language;
use grader_engine::{Config, Grader, MemoryVerdictStore};
use grader_protocol::{Outcome, Submission, Track, Verdict};
use grader_utils::os_cmd::OsCmd;

use std::path::Path;
use std::time::{Duration, Instant};

const PRINT_TEN: &str = r#"
#include <iostream>
int main() {
    std::cout << 10 << std::endl;
    return 0;
}
"#;

const PAIR_REFERENCE: &str = "
def split(total):
    big = total * 70 // 100
    return big, total * 0.525

rations = split(100)
print(rations)
";

async fn grade_interpreted(grader: &Grader, reference: &str, expected: &str, source: &str) -> Verdict {
    let challenge = challenge(Track::Interpreted, "logic", reference, expected);
    grader.grade(&challenge, &Submission::new(source)).await
}

#[tokio::test]
async fn interpreted_same_output_different_names() {
    let grader = grader();
    let submitted = "
def share(n):
    return n * 70 // 100, n * 0.525

answer = share(100)
print(answer)
";
    let verdict = grade_interpreted(&grader, PAIR_REFERENCE, "(70, 52.5)", submitted).await;
    assert_eq!(verdict.outcome, Outcome::Solved, "{:?}", verdict);
    assert_eq!(verdict.stdout.trim(), "(70, 52.5)");
}

#[tokio::test]
async fn interpreted_binding_match() {
    let grader = grader();
    let submitted = "xs = [1, 2, 3]\nresult = {'a': 1, 'b': sum(xs)}";
    let verdict = grade_interpreted(&grader, submitted, "{'b': 6, 'a': 1}", submitted).await;
    assert_eq!(verdict.outcome, Outcome::Solved, "{:?}", verdict);
}

#[tokio::test]
async fn interpreted_reference_output_match() {
    let grader = grader();
    let reference = "for i in range(3):\n    print(i)";
    let submitted = "i = 0\nwhile i < 3:\n    print(i)\n    i += 1";
    let verdict = grade_interpreted(&grader, reference, "[0, 1, 2]", submitted).await;
    assert_eq!(verdict.outcome, Outcome::Solved, "{:?}", verdict);
}

#[tokio::test]
async fn interpreted_mismatch() {
    let grader = grader();
    let verdict = grade_interpreted(&grader, "print(10)", "10", "print(9)").await;
    assert_eq!(verdict.outcome, Outcome::Incorrect);
    assert_eq!(verdict.message, "Output mismatch. Expected: \"10\", Got: \"9\"");
}

#[tokio::test]
async fn interpreted_infinite_loop_times_out() {
    let grader = grader();
    let t0 = Instant::now();
    let verdict = grade_interpreted(&grader, "print(1)", "1", "while True:\n    pass").await;
    assert_eq!(verdict.outcome, Outcome::Timeout);
    assert!(t0.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn interpreted_escapes_are_runtime_errors() {
    let grader = grader();
    for source in [
        "open('/etc/passwd').read()",
        "__import__('os').system('true')",
        "import os",
        "x = ().__class__",
    ] {
        let verdict = grade_interpreted(&grader, "print(1)", "1", source).await;
        assert_eq!(verdict.outcome, Outcome::RuntimeError, "{}", source);
        assert!(!verdict.message.contains('\n'), "{}", verdict.message);
    }
}

#[tokio::test]
async fn interpreted_heap_exhaustion_is_runtime_error() {
    init();
    let mut config = Config::default();
    config.interpreter.wall_time = 60_000;
    let grader = Grader::new(config);
    let source = "xs = []\nfor i in range(40):\n    xs.append([0] * 999999)\nprint(len(xs))";
    let verdict = grade_interpreted(&grader, "print(40)", "40", source).await;
    assert_eq!(verdict.outcome, Outcome::RuntimeError, "{:?}", verdict);
    assert!(verdict.stderr.starts_with("MemoryError"), "{}", verdict.stderr);
}

#[tokio::test]
async fn malformed_expected_is_internal_error() {
    let grader = grader();
    let verdict = grade_interpreted(&grader, "print(1)", "[1, 2", "print(1)").await;
    assert_eq!(verdict.outcome, Outcome::InternalError);
    assert!(verdict.message.starts_with("Internal grading error"));
}

#[tokio::test]
async fn syntax_challenges_compare_structure() {
    let grader = grader();
    let reference = "int main() {\n    int s;\n    return 0;\n}\n";
    let challenge = challenge(Track::Compiled, "syntax", reference, "");

    let fixed = "int main() {  // fixed\n  int s;\n\n  return 0;\n}";
    let verdict = grader.grade(&challenge, &Submission::new(fixed)).await;
    assert_eq!(verdict.outcome, Outcome::Solved);

    let broken = "int main() {\n    int s\n    return 0;\n}\n";
    let verdict = grader.grade(&challenge, &Submission::new(broken)).await;
    assert_eq!(verdict.outcome, Outcome::Incorrect);
}

#[tokio::test]
async fn attempts_are_recorded() {
    let grader = grader();
    let store = MemoryVerdictStore::new();
    let challenge = challenge(Track::Interpreted, "logic", "print(3)", "3");

    let (first, verdict) = grader
        .grade_and_record("three", &challenge, &Submission::new("print(2)"), &store)
        .await
        .unwrap();
    assert_eq!(verdict.outcome, Outcome::Incorrect);
    let (second, verdict) = grader
        .grade_and_record("three", &challenge, &Submission::new("print(1 + 2)"), &store)
        .await
        .unwrap();
    assert!(verdict.is_solved());

    assert_ne!(first, second);
    assert_eq!(store.attempts_for("three").len(), 2);
    assert_eq!(store.get(&second).unwrap().verdict.outcome, Outcome::Solved);
}

#[tokio::test]
async fn self_check_interpreted() {
    let grader = grader();
    let challenge = challenge(Track::Interpreted, "logic", PAIR_REFERENCE, "(70, 52.5)");
    assert!(grader.self_check(&challenge, None).await.is_solved());
}

#[tokio::test]
async fn compiled_reference_is_solved() {
    if !has_gxx() {
        return;
    }
    let grader = grader();
    let challenge = challenge(Track::Compiled, "logic", PRINT_TEN, "10");
    let verdict = grader.grade(&challenge, &Submission::new(PRINT_TEN)).await;
    assert_eq!(verdict.outcome, Outcome::Solved, "{:?}", verdict);
    assert_eq!(verdict.stdout.trim(), "10");
}

#[tokio::test]
async fn compiled_missing_semicolon() {
    if !has_gxx() {
        return;
    }
    let grader = grader();
    let challenge = challenge(Track::Compiled, "logic", PRINT_TEN, "10");
    let broken = PRINT_TEN.replace("<< std::endl;", "<< std::endl");
    let verdict = grader.grade(&challenge, &Submission::new(broken)).await;
    assert_eq!(verdict.outcome, Outcome::CompileError);
    assert!(!verdict.stderr.is_empty());
}

#[tokio::test]
async fn compiled_infinite_loop_times_out() {
    if !has_gxx() {
        return;
    }
    let grader = grader();
    let challenge = challenge(Track::Compiled, "logic", PRINT_TEN, "10");
    let looping = "int main() { volatile int x = 0; while (true) { x++; } }";
    let t0 = Instant::now();
    let verdict = grader.grade(&challenge, &Submission::new(looping)).await;
    assert_eq!(verdict.outcome, Outcome::Timeout);
    assert_eq!(verdict.stderr, "Execution timed out.");
    assert!(t0.elapsed() < Duration::from_secs(15));
}

#[tokio::test]
async fn compiled_nonzero_exit() {
    if !has_gxx() {
        return;
    }
    let grader = grader();
    let challenge = challenge(Track::Compiled, "runtime", PRINT_TEN, "10");
    let verdict = grader
        .grade(&challenge, &Submission::new("int main() { return 3; }"))
        .await;
    assert_eq!(verdict.outcome, Outcome::RuntimeError);
}

/// A toolchain that never finishes building.
struct Stalled;

impl Language for Stalled {
    fn lang_name(&self) -> &str {
        "stalled"
    }

    fn src_name(&self) -> &str {
        "main.txt"
    }

    fn exe_name(&self) -> &str {
        "main"
    }

    fn comment_token(&self) -> &str {
        "#"
    }

    fn compile_cmd(&self, _: &Path) -> OsCmd {
        let mut cmd = OsCmd::new("/bin/sh");
        cmd.arg("-c").arg("exec sleep 5").inherit_env("PATH");
        cmd
    }

    fn run_cmd(&self, workspace: &Path) -> OsCmd {
        OsCmd::new(workspace.join(self.exe_name()))
    }
}

#[tokio::test]
async fn compile_timeout_is_compile_error() {
    init();
    let mut config = Config::default();
    config.executor.compile_timeout = 200;
    let grader = Grader::with_language(config, Box::new(Stalled));

    let challenge = challenge(Track::Compiled, "logic", "ok", "10");
    let t0 = Instant::now();
    let verdict = grader.grade(&challenge, &Submission::new("anything")).await;
    assert_eq!(verdict.outcome, Outcome::CompileError, "{:?}", verdict);
    assert_eq!(verdict.stderr, "Compilation timed out.");
    assert!(t0.elapsed() < Duration::from_secs(4));
}
