mod common;

use common::{grader, has_gxx};

use grader_protocol::{GradeRequest, Outcome, Submission, Track};

fn request(json: &str) -> GradeRequest {
    serde_json::from_str(json).unwrap()
}

const MISSING_SEMICOLON: &str = include_str!("requests/missing_semicolon.json");
const OFF_BY_ONE_SUM: &str = include_str!("requests/off_by_one_sum.json");
const INTEGER_DIVISION: &str = include_str!("requests/integer_division.json");
const RECURSION_BASE: &str = include_str!("requests/recursion_base.json");
const MISSING_INCLUDE: &str = include_str!("requests/missing_include.json");
const FORMAT_OUTPUT: &str = include_str!("requests/format_output.json");
const RATION_SPLIT: &str = include_str!("requests/ration_split.json");

const COMPILED: [&str; 5] = [
    OFF_BY_ONE_SUM,
    INTEGER_DIVISION,
    RECURSION_BASE,
    MISSING_INCLUDE,
    FORMAT_OUTPUT,
];

#[tokio::test]
async fn syntax_fixture() {
    let grader = grader();
    let (challenge, submission) = request(MISSING_SEMICOLON).into_parts();
    assert!(challenge.error_classification.is_syntax());

    let verdict = grader.grade(&challenge, &submission).await;
    assert_eq!(verdict.outcome, Outcome::Solved);

    let buggy = Submission::new(challenge.buggy_source.clone());
    let verdict = grader.grade(&challenge, &buggy).await;
    assert_eq!(verdict.outcome, Outcome::Incorrect);
}

#[tokio::test]
async fn interpreted_fixture() {
    let grader = grader();
    let (challenge, submission) = request(RATION_SPLIT).into_parts();
    assert_eq!(challenge.track, Track::Interpreted);

    let verdict = grader.grade(&challenge, &submission).await;
    assert_eq!(verdict.outcome, Outcome::Solved, "{:?}", verdict);
    assert!(grader.self_check(&challenge, None).await.is_solved());

    let buggy = Submission::new(challenge.buggy_source.clone());
    let verdict = grader.grade(&challenge, &buggy).await;
    assert_eq!(verdict.outcome, Outcome::Incorrect);
    assert_eq!(
        verdict.message,
        "Output mismatch. Expected: \"(70, 52.5)\", Got: \"(700, 52.5)\""
    );
}

#[tokio::test]
async fn compiled_references_pass_self_check() {
    if !has_gxx() {
        return;
    }
    let grader = grader();
    for json in COMPILED {
        let (challenge, submission) = request(json).into_parts();
        let verdict = grader.self_check(&challenge, submission.stdin).await;
        assert_eq!(verdict.outcome, Outcome::Solved, "{:?}: {:?}", challenge.title, verdict);
    }
}

#[tokio::test]
async fn compiled_bugs_are_caught() {
    if !has_gxx() {
        return;
    }
    let grader = grader();
    for json in [INTEGER_DIVISION, RECURSION_BASE] {
        let (challenge, _) = request(json).into_parts();
        let buggy = Submission::new(challenge.buggy_source.clone());
        let verdict = grader.grade(&challenge, &buggy).await;
        assert_eq!(verdict.outcome, Outcome::Incorrect, "{:?}", challenge.title);
    }
}
