use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    #[default]
    Compiled,
    Interpreted,
}

impl Track {
    pub fn as_str(self) -> &'static str {
        match self {
            Track::Compiled => "compiled",
            Track::Interpreted => "interpreted",
        }
    }
}

/// The kind of bug a challenge is about.
///
/// Unknown names are kept verbatim in [`ErrorClass::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorClass {
    Syntax,
    Logic,
    Index,
    Type,
    Attribute,
    Value,
    Runtime,
    Compile,
    Format,
    Other(String),
}

impl ErrorClass {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorClass::Syntax => "syntax",
            ErrorClass::Logic => "logic",
            ErrorClass::Index => "index",
            ErrorClass::Type => "type",
            ErrorClass::Attribute => "attribute",
            ErrorClass::Value => "value",
            ErrorClass::Runtime => "runtime",
            ErrorClass::Compile => "compile",
            ErrorClass::Format => "format",
            ErrorClass::Other(s) => s,
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, ErrorClass::Syntax)
    }
}

impl From<String> for ErrorClass {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "syntax" => ErrorClass::Syntax,
            "logic" => ErrorClass::Logic,
            "index" => ErrorClass::Index,
            "type" => ErrorClass::Type,
            "attribute" => ErrorClass::Attribute,
            "value" => ErrorClass::Value,
            "runtime" => ErrorClass::Runtime,
            "compile" => ErrorClass::Compile,
            "format" => ErrorClass::Format,
            _ => ErrorClass::Other(s),
        }
    }
}

impl From<&str> for ErrorClass {
    fn from(s: &str) -> Self {
        ErrorClass::from(s.to_owned())
    }
}

impl From<ErrorClass> for String {
    fn from(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Other(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A challenge definition. The engine only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeSpec {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub buggy_source: String,

    pub reference_solution: String,

    /// Literal text of the expected result.
    pub expected_output: String,

    pub error_classification: ErrorClass,

    #[serde(default)]
    pub track: Track,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submission {
    pub source: String,

    #[serde(default)]
    pub stdin: Option<String>,
}

impl Submission {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn stdin(&self) -> &str {
        self.stdin.as_deref().unwrap_or("")
    }
}

/// The flat record accepted at the engine entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRequest {
    pub submitted_source: String,

    #[serde(default)]
    pub stdin: Option<String>,

    #[serde(flatten)]
    pub challenge: ChallengeSpec,
}

impl GradeRequest {
    pub fn into_parts(self) -> (ChallengeSpec, Submission) {
        let submission = Submission {
            source: self.submitted_source,
            stdin: self.stdin,
        };
        (self.challenge, submission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_class_is_preserved() {
        let class: ErrorClass = serde_json::from_str(r#""Overflow""#).unwrap();
        assert_eq!(class, ErrorClass::Other("Overflow".into()));
        assert_eq!(serde_json::to_string(&class).unwrap(), r#""Overflow""#);

        let class: ErrorClass = serde_json::from_str(r#""SYNTAX""#).unwrap();
        assert!(class.is_syntax());
    }

    #[test]
    fn request_defaults() {
        let json = r#"{
            "submitted_source": "print(1)",
            "reference_solution": "print(1)",
            "expected_output": "1",
            "error_classification": "logic"
        }"#;
        let req: GradeRequest = serde_json::from_str(json).unwrap();
        let (challenge, submission) = req.into_parts();
        assert_eq!(challenge.track, Track::Compiled);
        assert_eq!(challenge.error_classification, ErrorClass::Logic);
        assert!(challenge.title.is_none());
        assert_eq!(submission.stdin(), "");
        assert_eq!(submission.source, "print(1)");
    }
}
