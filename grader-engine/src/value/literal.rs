use super::Value;

use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed literal at offset {offset}: {message}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: &'static str,
}

/// Parses a challenge's expected output.
///
/// Text that does not start with a bracket or a quote and does not parse as
/// a whole literal is a bare string (`1:30`, `Survivors: 5`). Text that
/// does start with one must parse.
pub fn parse_expected(text: &str) -> Result<Value, LiteralError> {
    let text = text.trim();
    match parse_literal(text) {
        Ok(value) => Ok(value),
        Err(err) if text.starts_with(['[', '(', '{', '\'', '"']) => Err(err),
        Err(_) => Ok(Value::String(text.to_owned())),
    }
}

/// Parses a literal. A top-level comma-separated list is a tuple.
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    let mut p = Parser {
        src: text,
        chars: text.char_indices().peekable(),
    };
    let first = p.value(0)?;
    p.skip_ws();
    let value = if p.eat(',') {
        let mut items = vec![first];
        p.skip_ws();
        while !p.at_end() {
            items.push(p.value(0)?);
            p.skip_ws();
            if !p.eat(',') {
                break;
            }
            p.skip_ws();
        }
        Value::Tuple(items)
    } else {
        first
    };
    p.skip_ws();
    if !p.at_end() {
        return Err(p.error("unexpected trailing text"));
    }
    Ok(value)
}

const MAX_NESTING: usize = 64;

struct Parser<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.src.len(), |&(i, _)| i)
    }

    fn error(&mut self, message: &'static str) -> LiteralError {
        LiteralError {
            offset: self.offset(),
            message,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_NESTING {
            return Err(self.error("nesting too deep"));
        }
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("expected a value")),
            Some('[') => {
                self.chars.next();
                let (items, _) = self.items(']', depth)?;
                Ok(Value::Sequence(items))
            }
            Some('(') => {
                self.chars.next();
                let (mut items, trailing_comma) = self.items(')', depth)?;
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Value::Tuple(items))
                }
            }
            Some('{') => {
                self.chars.next();
                self.mapping(depth)
            }
            Some(q @ ('\'' | '"')) => {
                self.chars.next();
                self.string(q).map(Value::String)
            }
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some(c) if c.is_alphabetic() => self.word(),
            Some(_) => Err(self.error("unexpected character")),
        }
    }

    fn items(&mut self, close: char, depth: usize) -> Result<(Vec<Value>, bool), LiteralError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Ok((items, trailing_comma));
            }
            items.push(self.value(depth + 1)?);
            self.skip_ws();
            trailing_comma = self.eat(',');
            if !trailing_comma {
                self.skip_ws();
                if self.eat(close) {
                    return Ok((items, false));
                }
                return Err(self.error("expected ',' or a closing bracket"));
            }
        }
    }

    fn mapping(&mut self, depth: usize) -> Result<Value, LiteralError> {
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.eat('}') {
                return Ok(Value::Mapping(entries));
            }
            let key = self.value(depth + 1)?;
            self.skip_ws();
            if !self.eat(':') {
                return Err(self.error("expected ':' in mapping"));
            }
            let value = self.value(depth + 1)?;
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
            self.skip_ws();
            if !self.eat(',') {
                self.skip_ws();
                if self.eat('}') {
                    return Ok(Value::Mapping(entries));
                }
                return Err(self.error("expected ',' or '}'"));
            }
        }
    }

    fn word(&mut self) -> Result<Value, LiteralError> {
        let start = self.offset();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.chars.next();
        }
        let end = self.offset();
        match &self.src[start..end] {
            "True" => Ok(Value::Boolean(true)),
            "False" => Ok(Value::Boolean(false)),
            "None" => Ok(Value::None),
            _ => Err(LiteralError {
                offset: start,
                message: "unknown name",
            }),
        }
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.offset();
        if matches!(self.peek(), Some('-' | '+')) {
            self.chars.next();
        }
        let mut is_float = false;
        let mut digits = 0;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => digits += 1,
                '_' => {}
                '.' if !is_float => is_float = true,
                'e' | 'E' if digits > 0 => {
                    is_float = true;
                    self.chars.next();
                    if matches!(self.peek(), Some('-' | '+')) {
                        self.chars.next();
                    }
                    continue;
                }
                _ => break,
            }
            self.chars.next();
        }
        let end = self.offset();
        let text: String = self.src[start..end].chars().filter(|&c| c != '_').collect();
        if digits == 0 {
            return Err(LiteralError {
                offset: start,
                message: "expected digits",
            });
        }
        let invalid = LiteralError {
            offset: start,
            message: "invalid number",
        };
        if is_float {
            text.parse::<f64>().map(Value::Float).map_err(|_| invalid)
        } else {
            text.parse::<i64>().map(Value::Integer).map_err(|_| invalid)
        }
    }

    fn string(&mut self, quote: char) -> Result<String, LiteralError> {
        let mut out = String::new();
        loop {
            let c = match self.chars.next() {
                Some((_, c)) => c,
                None => return Err(self.error("unterminated string")),
            };
            match c {
                c if c == quote => return Ok(out),
                '\\' => self.escape(&mut out)?,
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        let c = match self.chars.next() {
            Some((_, c)) => c,
            None => return Err(self.error("unterminated string")),
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' | '\'' | '"' => out.push(c),
            '\n' => {}
            'x' => out.push(self.hex_char(2)?),
            'u' => out.push(self.hex_char(4)?),
            'U' => out.push(self.hex_char(8)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn hex_char(&mut self, len: usize) -> Result<char, LiteralError> {
        let mut code = 0u32;
        for _ in 0..len {
            let digit = self.peek().and_then(|c| c.to_digit(16));
            match digit {
                Some(d) => {
                    code = code * 16 + d;
                    self.chars.next();
                }
                None => return Err(self.error("truncated escape")),
            }
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::String(text.to_owned())
    }

    #[test]
    fn scalars() {
        assert_eq!(parse_literal("-3"), Ok(Value::Integer(-3)));
        assert_eq!(parse_literal("2.5"), Ok(Value::Float(2.5)));
        assert_eq!(parse_literal("1e3"), Ok(Value::Float(1000.0)));
        assert_eq!(parse_literal(".5"), Ok(Value::Float(0.5)));
        assert_eq!(parse_literal("True"), Ok(Value::Boolean(true)));
        assert_eq!(parse_literal("None"), Ok(Value::None));
        assert_eq!(parse_literal(r#"'a\n"b'"#), Ok(s("a\n\"b")));
        assert_eq!(parse_literal(r#""it's""#), Ok(s("it's")));
    }

    #[test]
    fn containers() {
        assert_eq!(
            parse_literal("[1, [2, 3],]"),
            Ok(Value::Sequence(vec![
                Value::Integer(1),
                Value::Sequence(vec![Value::Integer(2), Value::Integer(3)]),
            ]))
        );
        assert_eq!(parse_literal("(1,)"), Ok(Value::Tuple(vec![Value::Integer(1)])));
        assert_eq!(parse_literal("(1)"), Ok(Value::Integer(1)));
        assert_eq!(parse_literal("()"), Ok(Value::Tuple(vec![])));
        assert_eq!(
            parse_literal("70, 52.5"),
            Ok(Value::Tuple(vec![Value::Integer(70), Value::Float(52.5)]))
        );
        assert_eq!(
            parse_literal("{'a': 1, 'b': (2, 3)}"),
            Ok(Value::Mapping(vec![
                (s("a"), Value::Integer(1)),
                (s("b"), Value::Tuple(vec![Value::Integer(2), Value::Integer(3)])),
            ]))
        );
    }

    #[test]
    fn bare_text_becomes_a_string() {
        assert_eq!(parse_expected("1:30"), Ok(s("1:30")));
        assert_eq!(parse_expected("Survivors: 5"), Ok(s("Survivors: 5")));
        assert_eq!(parse_expected("Hello, World!"), Ok(s("Hello, World!")));
        assert_eq!(parse_expected("  42\n"), Ok(Value::Integer(42)));
        assert_eq!(parse_expected("-5 apples"), Ok(s("-5 apples")));
        assert_eq!(parse_expected(""), Ok(s("")));
    }

    #[test]
    fn malformed_structures_are_errors() {
        assert!(parse_expected("[1, 2").is_err());
        assert!(parse_expected("{'a' 1}").is_err());
        assert!(parse_expected("'unterminated").is_err());
        assert!(parse_expected("(1, 2) trailing").is_err());
    }

    #[test]
    fn deep_nesting_is_refused() {
        let text = format!("{}{}", "[".repeat(200), "]".repeat(200));
        assert!(parse_literal(&text).is_err());
    }
}
