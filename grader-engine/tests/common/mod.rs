#![allow(dead_code)]

use std::process::Command;
use std::sync::Once;

use grader_engine::{Config, Grader};
use grader_protocol::{ChallengeSpec, ErrorClass, Track};
use grader_utils::tracing::setup_tracing;

use tracing::warn;

pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        dotenv::dotenv().ok();
        setup_tracing();
    });
}

pub fn grader() -> Grader {
    init();
    Grader::new(Config::default())
}

/// Tests that need the C++ toolchain return early when it is missing.
pub fn has_gxx() -> bool {
    let found = Command::new("g++")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    if !found {
        warn!("g++ is not available, skipping");
    }
    found
}

pub fn challenge(track: Track, class: &str, reference: &str, expected: &str) -> ChallengeSpec {
    ChallengeSpec {
        title: None,
        buggy_source: String::new(),
        reference_solution: reference.to_owned(),
        expected_output: expected.to_owned(),
        error_classification: ErrorClass::from(class),
        track,
    }
}
