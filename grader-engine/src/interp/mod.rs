//! Interpreter for the interpreted track.
//!
//! Submissions run against a closed set of builtins and methods; there is no
//! path from a program to the filesystem, the network or the host process.

mod ast;
mod builtins;
mod error;
mod eval;
mod format;
mod lexer;
mod object;
mod ops;
mod parser;

pub use self::error::SyntaxError;

use self::eval::Interpreter;
use crate::value::Value;

use std::time::Duration;

use anyhow::Context;
use tokio::sync::oneshot;
use tracing::debug;

pub const MAX_SOURCE_LEN: usize = 256 * 1024;

pub const COMMENT_TOKEN: &str = "#";

const STACK_SIZE: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Limits {
    pub step_limit: u64,
    pub wall_time: Duration,
    pub max_depth: usize,
    pub max_len: usize,
    pub max_output: usize,
    /// Estimated bytes of objects the program still holds, see `Interpreter::alloc`.
    pub max_memory: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            step_limit: 10_000_000,
            wall_time: Duration::from_millis(2000),
            max_depth: 200,
            max_len: 1_000_000,
            max_output: 64 * 1024,
            max_memory: 256 * 1024 * 1024,
        }
    }
}

/// Outcome of running one program.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub succeeded: bool,
    /// The step or wall-clock budget ran out.
    pub timed_out: bool,
    /// Top-level bindings in first-binding order.
    pub bindings: Vec<(String, Value)>,
    pub printed: String,
    /// `"<Kind>: <detail>"` when the program failed.
    pub error: Option<String>,
}

impl Execution {
    fn rejected(message: String) -> Self {
        Self {
            succeeded: false,
            timed_out: false,
            bindings: Vec::new(),
            printed: String::new(),
            error: Some(message),
        }
    }

    pub fn binding(&self, name: &str) -> Option<&Value> {
        self.bindings.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

pub fn execute(source: &str, stdin: &str, limits: &Limits) -> Execution {
    if source.len() > MAX_SOURCE_LEN {
        return Execution::rejected(format!(
            "SyntaxError: source exceeds {} bytes",
            MAX_SOURCE_LEN
        ));
    }
    let program = match parser::parse_program(source) {
        Ok(program) => program,
        Err(err) => return Execution::rejected(err.to_string()),
    };

    let mut interp = Interpreter::new(stdin, limits.clone());
    let result = interp.run(&program);
    let bindings = interp.bindings();
    let printed = interp.into_printed();

    match result {
        Ok(()) => Execution {
            succeeded: true,
            timed_out: false,
            bindings,
            printed,
            error: None,
        },
        Err(fault) => Execution {
            succeeded: false,
            timed_out: fault.is_budget(),
            bindings,
            printed,
            error: Some(fault.to_string()),
        },
    }
}

/// Runs [`execute`] on a dedicated thread with a large stack.
///
/// A panic inside the interpreter surfaces as an error here.
pub async fn execute_isolated(source: String, stdin: String, limits: Limits) -> anyhow::Result<Execution> {
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("interpreter".into())
        .stack_size(STACK_SIZE)
        .spawn(move || {
            let execution = execute(&source, &stdin, &limits);
            let _ = tx.send(execution);
        })
        .context("failed to spawn interpreter thread")?;

    let execution = rx.await.context("interpreter thread panicked")?;
    debug!(
        succeeded = execution.succeeded,
        timed_out = execution.timed_out,
        "interpreter finished"
    );
    Ok(execution)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Execution {
        run_with(source, Limits::default())
    }

    fn run_with(source: &str, limits: Limits) -> Execution {
        let source = source.to_owned();
        std::thread::Builder::new()
            .stack_size(STACK_SIZE)
            .spawn(move || execute(&source, "", &limits))
            .unwrap()
            .join()
            .unwrap()
    }

    /// Default limits without the wall clock, for tests that build large
    /// objects in unoptimized builds.
    fn unhurried() -> Limits {
        Limits {
            wall_time: Duration::from_secs(120),
            ..Limits::default()
        }
    }

    fn printed(source: &str) -> String {
        let execution = run(source);
        assert!(execution.succeeded, "{:?}", execution.error);
        execution.printed
    }

    fn error(source: &str) -> String {
        let execution = run(source);
        assert!(!execution.succeeded);
        execution.error.unwrap()
    }

    #[test]
    fn arithmetic_and_printing() {
        assert_eq!(printed("print(7 // 2, 7 % 3, -7 // 2, 2 ** 10)"), "3 1 -4 1024\n");
        assert_eq!(printed("print(7 / 2, 1 / 3)"), "3.5 0.3333333333333333\n");
        assert_eq!(printed("print(1, 2, sep='-', end='!')"), "1-2!");
        assert_eq!(printed("x = 0.1 + 0.2\nprint(x)"), "0.30000000000000004\n");
    }

    #[test]
    fn bindings_in_order() {
        let execution = run("b = 2\na = [1, (2, 'x')]\nb = 3\ndef f(): pass");
        assert_eq!(
            execution.bindings,
            vec![
                ("b".to_owned(), Value::Integer(3)),
                (
                    "a".to_owned(),
                    Value::Sequence(vec![
                        Value::Integer(1),
                        Value::Tuple(vec![Value::Integer(2), Value::String("x".into())]),
                    ])
                ),
            ]
        );
    }

    #[test]
    fn functions_and_closures() {
        let src = "
def make(n):
    def add(x):
        return x + n
    return add

add3 = make(3)
print(add3(4))
print((lambda a, b=10: a * b)(2))
";
        assert_eq!(printed(src), "7\n20\n");
    }

    #[test]
    fn recursion_is_bounded() {
        let src = "def f(n):\n    return f(n + 1)\nf(0)";
        assert!(error(src).starts_with("RecursionError"));

        let src = "def fact(n):\n    return 1 if n <= 1 else n * fact(n - 1)\nprint(fact(20))";
        assert_eq!(printed(src), "2432902008176640000\n");
    }

    #[test]
    fn unbound_local() {
        let src = "count = 0\ndef bump():\n    count += 1\nbump()";
        assert!(error(src).starts_with("UnboundLocalError"));

        let src = "count = 0\ndef bump():\n    global count\n    count += 1\nbump()\nbump()\nprint(count)";
        assert_eq!(printed(src), "2\n");
    }

    #[test]
    fn exceptions() {
        let src = "
try:
    x = 1 / 0
except ZeroDivisionError as e:
    print('caught', e)
else:
    print('no')
finally:
    print('done')
";
        assert_eq!(printed(src), "caught division by zero\ndone\n");

        let src = "
try:
    [1][5]
except LookupError:
    print('lookup')
";
        assert_eq!(printed(src), "lookup\n");

        assert_eq!(
            error("raise ValueError('bad input')"),
            "ValueError: bad input (line 1)"
        );
        assert_eq!(error("x = 1\nassert x == 2, 'nope'"), "AssertionError: nope (line 2)");
    }

    #[test]
    fn resource_errors_are_not_catchable() {
        let src = "
try:
    x = [0] * 10000000
except Exception:
    print('caught')
";
        assert!(error(src).starts_with("MemoryError"));
    }

    #[test]
    fn live_heap_is_bounded() {
        let src = "xs = []\nfor i in range(40):\n    xs.append([0] * 999999)\nprint(len(xs))";
        let execution = run_with(src, unhurried());
        assert!(!execution.timed_out);
        assert!(execution.error.unwrap().starts_with("MemoryError"), "{}", src);
        assert_eq!(execution.printed, "");

        let src = "
try:
    keep = [[0] * 999999 for _ in range(40)]
except MemoryError:
    print('caught')
";
        let execution = run_with(src, unhurried());
        assert!(execution.error.unwrap().starts_with("MemoryError"));
        assert_eq!(execution.printed, "");
    }

    #[test]
    fn garbage_is_given_back() {
        let limits = Limits {
            max_memory: 4 * 1024 * 1024,
            ..unhurried()
        };
        let execution = run_with("xs = [0] * 200000", limits.clone());
        assert!(execution.error.unwrap().starts_with("MemoryError"));

        let src = "for i in range(20):\n    tmp = [0] * 50000\n    tmp.append(i)\nprint(len(tmp))";
        let execution = run_with(src, limits.clone());
        assert!(execution.succeeded, "{:?}", execution.error);
        assert_eq!(execution.printed, "50001\n");

        let src = "words = []\nfor i in range(100):\n    words.append('ab' * 50000)\nprint(len(words))";
        let execution = run_with(src, limits.clone());
        assert!(execution.error.unwrap().starts_with("MemoryError"));

        let src = "
def build(n):
    s = ''
    for i in range(n):
        s += 'abcdefgh'
    return len(s)

print(build(3000))
";
        let execution = run_with(src, limits.clone());
        assert!(execution.succeeded, "{:?}", execution.error);
        assert_eq!(execution.printed, "24000\n");

        let src = "
errors = []
for i in range(100):
    try:
        raise ValueError('x' * 100000)
    except ValueError as e:
        errors.append(e)
";
        let execution = run_with(src, limits);
        assert!(execution.error.unwrap().starts_with("MemoryError"));
    }

    #[test]
    fn shared_references_stay_cheap() {
        let execution = run_with("x = [0] * 999999\na = [x] * 999999\nn = len(a)", unhurried());
        assert!(execution.succeeded, "{:?}", execution.error);
        assert_eq!(execution.binding("n"), Some(&Value::Integer(999999)));
        assert!(execution.binding("a").is_none());
        assert!(matches!(execution.binding("x"), Some(Value::Sequence(items)) if items.len() == 999999));

        let src = "
def grow():
    a = [0]
    for i in range(28):
        a = [a, a]
    print(a)

grow()
";
        let t0 = std::time::Instant::now();
        assert!(error(src).starts_with("OutputLimitExceeded"));
        assert!(t0.elapsed() < Duration::from_secs(2));

        let src = "a = [0]\nfor i in range(28):\n    a = [a, a]\ns = str(a)";
        let execution = run_with(src, unhurried());
        assert!(execution.error.as_ref().unwrap().starts_with("MemoryError"));
        assert!(execution.binding("a").is_none());
    }

    #[test]
    fn loops_and_comprehensions() {
        let src = "
total = 0
for i in range(10):
    if i % 2:
        continue
    total += i
else:
    total += 100
squares = [x * x for x in range(5) if x != 2]
pairs = {k: v for k, v in zip('ab', [1, 2])}
print(total, squares, pairs)
";
        assert_eq!(printed(src), "120 [0, 1, 9, 16] {'a': 1, 'b': 2}\n");

        let src = "n = 0\nwhile True:\n    n += 1\n    if n == 5:\n        break\nprint(n)";
        assert_eq!(printed(src), "5\n");
    }

    #[test]
    fn strings_and_formatting() {
        assert_eq!(printed("print(' a b '.strip().upper().split())"), "['A', 'B']\n");
        assert_eq!(printed("print(', '.join(['x', 'y']))"), "x, y\n");
        assert_eq!(printed("v = 3.14159\nprint(f'{v:.2f}|{v!r}|{7:>3}')"), "3.14|3.14159|  7\n");
        assert_eq!(printed("print('%d-%s' % (4, 'z'))"), "4-z\n");
        assert_eq!(printed("print('{} {name}'.format(1, name='n'))"), "1 n\n");
        assert_eq!(printed("print('abc'[::-1], 'abc'[1:])"), "cba bc\n");
    }

    #[test]
    fn containers() {
        let src = "
xs = [3, 1, 2]
xs.sort()
xs.append(4)
d = {'a': 1}
d['b'] = 2
d.update(c=3)
print(xs, sorted(d.items(), reverse=True), d.get('z', 0), len(d))
";
        assert_eq!(printed(src), "[1, 2, 3, 4] [('c', 3), ('b', 2), ('a', 1)] 0 3\n");
        assert_eq!(printed("a, b = 1, 2\na, b = b, a\nprint(a, b)"), "2 1\n");
        assert_eq!(printed("print(sorted(['bb', 'a', 'ccc'], key=len))"), "['a', 'bb', 'ccc']\n");
        assert_eq!(printed("print(max([1, 5, 3]), min(4, 2), sum(x for x in range(4)))"), "5 2 6\n");
    }

    #[test]
    fn math_module() {
        assert_eq!(printed("import math\nprint(math.sqrt(16), math.floor(2.7))"), "4.0 2\n");
        assert_eq!(printed("from math import gcd as g\nprint(g(12, 18))"), "6\n");
        assert!(error("import os").starts_with("ModuleNotFoundError: No module named 'os'"));
    }

    #[test]
    fn stdin_lines() {
        let execution = execute("a = input()\nb = int(input())\nprint(a, b + 1)", "hi\r\n41\n", &Limits::default());
        assert_eq!(execution.printed, "hi 42\n");
        assert!(error("input()").starts_with("EOFError"));
    }

    #[test]
    fn no_escape_hatches() {
        assert!(error("open('/etc/passwd')").starts_with("NameError"));
        assert!(error("__import__('os')").starts_with("NameError"));
        assert!(error("().__class__").starts_with("AttributeError"));
        assert!(error("eval('1')").starts_with("NameError"));
        assert!(error("'x'.__len__()").starts_with("AttributeError"));
    }

    #[test]
    fn budgets() {
        let limits = Limits {
            step_limit: 10_000,
            ..Limits::default()
        };
        let execution = execute("while True:\n    pass", "", &limits);
        assert!(execution.timed_out);
        assert!(!execution.succeeded);

        let limits = Limits {
            max_output: 16,
            ..Limits::default()
        };
        let execution = execute("for i in range(100):\n    print(i)", "", &limits);
        assert!(execution.error.unwrap().starts_with("OutputLimitExceeded"));
        assert!(execution.printed.len() <= 16);

        let execution = run("x = 2 ** 62\ny = x * 4");
        assert!(execution.error.unwrap().starts_with("OverflowError"));
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(error("def f(:\n  pass").starts_with("SyntaxError"));
        assert!(error("if True:\nprint(1)").starts_with("IndentationError"));
    }

    #[tokio::test]
    async fn isolated_execution() {
        let execution = execute_isolated("print(sum(range(5)))".into(), String::new(), Limits::default())
            .await
            .unwrap();
        assert_eq!(execution.printed, "10\n");
    }
}
