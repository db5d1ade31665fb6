mod common;

use common::{has_gxx, init};

use grader_engine::config::Executor;
use grader_engine::exec::{CompiledRunner, Workspace};
use grader_engine::lang::cpp::Cpp;
use grader_engine::lang::Language;

use grader_protocol::Phase;

use std::time::Instant;

use tracing::debug;

fn runner() -> CompiledRunner {
    init();
    CompiledRunner::new(&Executor::default(), Box::new(Cpp::default()))
}

#[tokio::test]
async fn compile_and_run_cpp() {
    if !has_gxx() {
        return;
    }
    let runner = runner();
    let _enter = tracing::debug_span!("lang", name = runner.lang().lang_name()).entered();
    let t0 = Instant::now();

    let source = r#"
#include <iostream>
#include <string>
int main() {
    std::string name;
    std::getline(std::cin, name);
    std::cout << "hello " << name << std::endl;
    return 0;
}
"#;
    let outcome = runner.execute(source, "world\n").await.unwrap();
    assert!(outcome.compile.succeeded, "{}", outcome.compile.stderr);
    let run = outcome.run.unwrap();
    assert_eq!(run.phase, Phase::Run);
    assert!(run.succeeded);
    assert_eq!(run.stdout, "hello world\n");

    debug!(elapsed = ?t0.elapsed(), "cpp round");
}

#[tokio::test]
async fn compile_failure_skips_run() {
    if !has_gxx() {
        return;
    }
    let runner = runner();
    let outcome = runner.execute("int main() { return 0 }", "").await.unwrap();
    assert!(outcome.compile.is_compile_failure());
    assert!(outcome.compile.stderr.contains("error"));
    assert!(outcome.run.is_none());
}

#[tokio::test]
async fn environment_is_cleared() {
    if !has_gxx() {
        return;
    }
    std::env::set_var("GRADER_SECRET", "leak");
    let runner = runner();
    let source = r#"
#include <cstdlib>
#include <iostream>
int main() {
    const char* v = std::getenv("GRADER_SECRET");
    std::cout << (v ? v : "none") << std::endl;
    return 0;
}
"#;
    let run = runner.execute(source, "").await.unwrap().run.unwrap();
    assert_eq!(run.stdout.trim(), "none");
}

#[tokio::test]
async fn crash_is_reported_with_signal() {
    if !has_gxx() {
        return;
    }
    let runner = runner();
    let source = "#include <cstdlib>\nint main() { std::abort(); }";
    let run = runner.execute(source, "").await.unwrap().run.unwrap();
    assert!(!run.succeeded);
    assert_eq!(run.signal, Some(6));
    assert!(run.stderr.contains("SIGABRT"), "{}", run.stderr);
}

#[tokio::test]
async fn missing_toolchain() {
    let runner = {
        init();
        let cpp = Cpp {
            compiler: "definitely-not-a-compiler".to_owned(),
        };
        CompiledRunner::new(&Executor::default(), Box::new(cpp))
    };
    let workspace = Workspace::create(None).unwrap();
    let compile = runner.compile(&workspace, "int main() {}").await.unwrap();
    assert!(compile.is_compile_failure());
    assert!(compile.stderr.contains("not found"), "{}", compile.stderr);
}
