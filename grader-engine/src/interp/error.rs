use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message} (line {line})")]
pub struct SyntaxError {
    pub kind: &'static str,
    pub message: String,
    pub line: usize,
}

impl SyntaxError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            kind: "SyntaxError",
            message: message.into(),
            line,
        }
    }

    pub fn indentation(line: usize, message: impl Into<String>) -> Self {
        Self {
            kind: "IndentationError",
            message: message.into(),
            line,
        }
    }
}

/// An exception raised by a running program.
#[derive(Debug, Clone)]
pub struct Exception {
    pub kind: &'static str,
    pub message: String,
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// (name, base)
const EXCEPTION_TYPES: &[(&str, &str)] = &[
    ("BaseException", ""),
    ("Exception", "BaseException"),
    ("ArithmeticError", "Exception"),
    ("ZeroDivisionError", "ArithmeticError"),
    ("OverflowError", "ArithmeticError"),
    ("LookupError", "Exception"),
    ("IndexError", "LookupError"),
    ("KeyError", "LookupError"),
    ("ValueError", "Exception"),
    ("TypeError", "Exception"),
    ("NameError", "Exception"),
    ("UnboundLocalError", "NameError"),
    ("AttributeError", "Exception"),
    ("RuntimeError", "Exception"),
    ("RecursionError", "RuntimeError"),
    ("NotImplementedError", "RuntimeError"),
    ("EOFError", "Exception"),
    ("AssertionError", "Exception"),
    ("ImportError", "Exception"),
    ("ModuleNotFoundError", "ImportError"),
    ("MemoryError", "Exception"),
    ("StopIteration", "Exception"),
];

/// Raised for resource ceilings; `except` never sees these.
const UNCATCHABLE: &[&str] = &["MemoryError", "RecursionError", "OutputLimitExceeded"];

pub fn exception_type(name: &str) -> Option<&'static str> {
    EXCEPTION_TYPES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(n, _)| *n)
}

pub fn is_subclass(kind: &str, base: &str) -> bool {
    let mut cur = kind;
    loop {
        if cur == base {
            return true;
        }
        match EXCEPTION_TYPES.iter().find(|(n, _)| *n == cur) {
            Some((_, parent)) if !parent.is_empty() => cur = parent,
            _ => return false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Fault {
    Syntax(SyntaxError),
    Raised {
        exc: Rc<Exception>,
        line: Option<usize>,
    },
    StepLimit,
    WallTime,
}

pub type Result<T, E = Fault> = std::result::Result<T, E>;

impl Fault {
    pub fn raise(kind: &'static str, message: impl Into<String>) -> Self {
        Fault::Raised {
            exc: Rc::new(Exception {
                kind,
                message: message.into(),
            }),
            line: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::raise("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::raise("ValueError", message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::raise("IndexError", message)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::raise("ZeroDivisionError", message)
    }

    pub fn overflow() -> Self {
        Self::raise("OverflowError", "integer overflow")
    }

    pub fn memory() -> Self {
        Self::raise("MemoryError", "size limit exceeded")
    }

    pub fn attribute(type_name: &str, attr: &str) -> Self {
        Self::raise(
            "AttributeError",
            format!("'{}' object has no attribute '{}'", type_name, attr),
        )
    }

    pub fn at_line(self, at: usize) -> Self {
        match self {
            Fault::Raised { exc, line: None } => Fault::Raised {
                exc,
                line: Some(at),
            },
            other => other,
        }
    }

    pub fn is_budget(&self) -> bool {
        matches!(self, Fault::StepLimit | Fault::WallTime)
    }

    /// The exception an `except` clause may handle, if any.
    pub fn catchable(&self) -> Option<&Rc<Exception>> {
        match self {
            Fault::Raised { exc, .. } if !UNCATCHABLE.contains(&exc.kind) => Some(exc),
            _ => None,
        }
    }
}

impl From<SyntaxError> for Fault {
    fn from(err: SyntaxError) -> Self {
        Fault::Syntax(err)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Syntax(err) => err.fmt(f),
            Fault::Raised { exc, line: Some(line) } => write!(f, "{} (line {})", exc, line),
            Fault::Raised { exc, line: None } => exc.fmt(f),
            Fault::StepLimit => f.write_str("Timeout: step budget exhausted"),
            Fault::WallTime => f.write_str("Timeout: time budget exhausted"),
        }
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy() {
        assert!(is_subclass("ZeroDivisionError", "ArithmeticError"));
        assert!(is_subclass("KeyError", "Exception"));
        assert!(is_subclass("ValueError", "ValueError"));
        assert!(!is_subclass("ValueError", "LookupError"));
        assert!(!is_subclass("Unknown", "Exception"));
    }

    #[test]
    fn messages() {
        let f = Fault::zero_division("division by zero").at_line(3);
        assert_eq!(f.to_string(), "ZeroDivisionError: division by zero (line 3)");
        assert!(f.catchable().is_some());
        assert!(Fault::memory().catchable().is_none());
        assert!(Fault::StepLimit.is_budget());
    }
}
