use super::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    FStr(Vec<FPiece>),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FPiece {
    Lit(String),
    Expr {
        src: String,
        conversion: Option<char>,
        spec: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

/// Longest first.
const OPS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "->", "<<", ">>", "+", "-", "*", "/", "%", "(", ")", "[", "]", "{", "}",
    ",", ":", ".", ";", "=", "<", ">", "&", "|", "^", "~", "@",
];

const TAB_SIZE: usize = 8;

pub fn tokenize(src: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer {
        chars: src.chars().collect(),
        pos: 0,
        line: 1,
        tokens: Vec::new(),
        indents: vec![0],
        brackets: 0,
        at_line_start: true,
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    brackets: usize,
    at_line_start: bool,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token {
            tok,
            line: self.line,
        });
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.line, message)
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        loop {
            if self.at_line_start && self.brackets == 0 && !self.indentation()? {
                continue;
            }
            let c = match self.peek() {
                Some(c) => c,
                None => break,
            };
            match c {
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '#' => self.skip_comment(),
                '\\' => {
                    self.pos += 1;
                    if self.peek() == Some('\r') {
                        self.pos += 1;
                    }
                    if self.bump() != Some('\n') {
                        return Err(self.error("unexpected character after line continuation character"));
                    }
                }
                '\n' => {
                    if self.brackets == 0 {
                        self.push_newline();
                        self.at_line_start = true;
                    }
                    self.bump();
                }
                '0'..='9' => self.number()?,
                '.' if matches!(self.peek_at(1), Some('0'..='9')) => self.number()?,
                '\'' | '"' => self.string("")?,
                c if c.is_alphabetic() || c == '_' => self.name()?,
                _ => self.op()?,
            }
        }

        if self.brackets > 0 {
            return Err(self.error("unexpected EOF while parsing"));
        }
        self.push_newline();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(())
    }

    fn push_newline(&mut self) {
        match self.tokens.last() {
            None | Some(Token { tok: Tok::Newline, .. }) => {}
            _ => self.push(Tok::Newline),
        }
    }

    fn skip_comment(&mut self) {
        while !matches!(self.peek(), None | Some('\n')) {
            self.pos += 1;
        }
    }

    /// Measures the indentation of a new logical line. Returns `false` when
    /// the line was blank and has been consumed.
    fn indentation(&mut self) -> Result<bool, SyntaxError> {
        let mut col = 0;
        loop {
            match self.peek() {
                Some(' ') => col += 1,
                Some('\t') => col = (col / TAB_SIZE + 1) * TAB_SIZE,
                Some('\x0c') => col = 0,
                Some('\r') => {}
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek() {
            None => return Ok(true),
            Some('#') => {
                self.skip_comment();
                if self.peek().is_none() {
                    return Ok(true);
                }
                self.bump();
                return Ok(false);
            }
            Some('\n') => {
                self.bump();
                return Ok(false);
            }
            Some(_) => {}
        }

        self.at_line_start = false;
        let current = self.indents.last().copied().unwrap_or(0);
        if col > current {
            self.indents.push(col);
            self.push(Tok::Indent);
        } else if col < current {
            while self.indents.last().map_or(false, |&top| col < top) {
                self.indents.pop();
                self.push(Tok::Dedent);
            }
            if self.indents.last().copied().unwrap_or(0) != col {
                return Err(SyntaxError::indentation(
                    self.line,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        Ok(true)
    }

    fn number(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => 16,
                Some('o' | 'O') => 8,
                Some('b' | 'B') => 2,
                _ => 0,
            };
            if radix != 0 {
                self.pos += 2;
                let digits = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                let digits: String = digits.chars().filter(|&c| c != '_').collect();
                let value = i64::from_str_radix(&digits, radix)
                    .map_err(|_| self.error("invalid integer literal"))?;
                self.push(Tok::Int(value));
                return Ok(());
            }
        }

        let mut is_float = false;
        self.take_while(|c| c.is_ascii_digit() || c == '_');
        if self.peek() == Some('.') {
            is_float = true;
            self.pos += 1;
            self.take_while(|c| c.is_ascii_digit() || c == '_');
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let digit_at = match self.peek_at(1) {
                Some('+' | '-') => 2,
                _ => 1,
            };
            if matches!(self.peek_at(digit_at), Some('0'..='9')) {
                is_float = true;
                self.pos += digit_at;
                self.take_while(|c| c.is_ascii_digit());
            }
        }
        if matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            return Err(self.error("invalid decimal literal"));
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();
        let tok = if is_float {
            Tok::Float(text.parse().map_err(|_| self.error("invalid float literal"))?)
        } else {
            Tok::Int(text.parse().map_err(|_| self.error("integer literal is too large"))?)
        };
        self.push(tok);
        Ok(())
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if pred(c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn name(&mut self) -> Result<(), SyntaxError> {
        let ident = self.take_while(|c| c.is_alphanumeric() || c == '_');
        let is_prefix = matches!(
            ident.to_ascii_lowercase().as_str(),
            "r" | "f" | "b" | "u" | "rf" | "fr" | "rb" | "br"
        );
        if is_prefix && matches!(self.peek(), Some('\'' | '"')) {
            return self.string(&ident.to_ascii_lowercase());
        }
        self.push(Tok::Name(ident));
        Ok(())
    }

    fn string(&mut self, prefix: &str) -> Result<(), SyntaxError> {
        let raw = prefix.contains('r');
        let formatted = prefix.contains('f');
        let line = self.line;

        let quote = self.bump().unwrap_or('"');
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.pos += 2;
        }

        let mut body = String::new();
        loop {
            let c = match self.bump() {
                Some(c) => c,
                None => return Err(SyntaxError::new(line, "unterminated string literal")),
            };
            match c {
                '\\' => {
                    body.push('\\');
                    if let Some(next) = self.bump() {
                        body.push(next);
                    }
                }
                c if c == quote => {
                    if !triple {
                        break;
                    }
                    if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                        self.pos += 2;
                        break;
                    }
                    body.push(c);
                }
                '\n' if !triple => {
                    return Err(SyntaxError::new(line, "unterminated string literal"));
                }
                c => body.push(c),
            }
        }

        let tok = if formatted {
            Tok::FStr(split_fstring(&body, raw).map_err(|msg| SyntaxError::new(line, msg))?)
        } else if raw {
            Tok::Str(body)
        } else {
            Tok::Str(unescape(&body).map_err(|msg| SyntaxError::new(line, msg))?)
        };
        self.tokens.push(Token { tok, line });
        Ok(())
    }

    fn op(&mut self) -> Result<(), SyntaxError> {
        let found = OPS.iter().find(|op| {
            op.chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c))
        });
        let op = match found {
            Some(op) => *op,
            None => {
                let c = self.peek().unwrap_or(' ');
                return Err(self.error(format!("invalid character '{}'", c)));
            }
        };
        self.pos += op.len();
        match op {
            "(" | "[" | "{" => self.brackets += 1,
            ")" | "]" | "}" => self.brackets = self.brackets.saturating_sub(1),
            _ => {}
        }
        self.push(Tok::Op(op));
        Ok(())
    }
}

pub fn unescape(body: &str) -> Result<String, &'static str> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            None => out.push('\\'),
            Some('\n') => {}
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some(c @ ('\\' | '\'' | '"')) => out.push(c),
            Some(c @ ('x' | 'u' | 'U')) => {
                let len = match c {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = chars.by_ref().take(len).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == len)
                    .ok_or("truncated escape sequence")?;
                out.push(char::from_u32(code).ok_or("invalid code point in escape")?);
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

fn split_fstring(body: &str, raw: bool) -> Result<Vec<FPiece>, &'static str> {
    let chars: Vec<char> = body.chars().collect();
    let mut pieces = Vec::new();
    let mut lit = String::new();
    let mut i = 0;

    let flush = |lit: &mut String, pieces: &mut Vec<FPiece>| -> Result<(), &'static str> {
        if !lit.is_empty() {
            let text = if raw { lit.clone() } else { unescape(lit)? };
            pieces.push(FPiece::Lit(text));
            lit.clear();
        }
        Ok(())
    };

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                lit.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                lit.push('}');
                i += 2;
            }
            '}' => return Err("f-string: single '}' is not allowed"),
            '{' => {
                flush(&mut lit, &mut pieces)?;
                i += 1;
                let start = i;
                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                while i < chars.len() {
                    let c = chars[i];
                    match quote {
                        Some(q) if c == q => quote = None,
                        Some(_) => {}
                        None => match c {
                            '\'' | '"' => quote = Some(c),
                            '(' | '[' | '{' => depth += 1,
                            ')' | ']' | '}' if depth > 0 => depth -= 1,
                            '}' | ':' if depth == 0 => break,
                            '!' if depth == 0 && chars.get(i + 1) != Some(&'=') => break,
                            _ => {}
                        },
                    }
                    i += 1;
                }
                let src: String = chars[start..i].iter().collect();
                if src.trim().is_empty() {
                    return Err("f-string: empty expression not allowed");
                }

                let mut conversion = None;
                if chars.get(i) == Some(&'!') {
                    match chars.get(i + 1) {
                        Some(&c @ ('r' | 's' | 'a')) => conversion = Some(c),
                        _ => return Err("f-string: invalid conversion character"),
                    }
                    i += 2;
                }
                let mut spec = String::new();
                if chars.get(i) == Some(&':') {
                    i += 1;
                    while i < chars.len() && chars[i] != '}' {
                        if chars[i] == '{' {
                            return Err("f-string: nested format specs are not supported");
                        }
                        spec.push(chars[i]);
                        i += 1;
                    }
                }
                if chars.get(i) != Some(&'}') {
                    return Err("f-string: expecting '}'");
                }
                i += 1;
                pieces.push(FPiece::Expr {
                    src,
                    conversion,
                    spec,
                });
            }
            c => {
                lit.push(c);
                i += 1;
            }
        }
    }
    flush(&mut lit, &mut pieces)?;
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    fn name(s: &str) -> Tok {
        Tok::Name(s.to_owned())
    }

    #[test]
    fn indentation_produces_blocks() {
        let src = "if x:\n    y = 1\n\n    # note\nz\n";
        assert_eq!(
            toks(src),
            vec![
                name("if"),
                name("x"),
                Tok::Op(":"),
                Tok::Newline,
                Tok::Indent,
                name("y"),
                Tok::Op("="),
                Tok::Int(1),
                Tok::Newline,
                Tok::Dedent,
                name("z"),
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn brackets_join_lines() {
        let src = "x = [1,\n     2]\n";
        assert_eq!(
            toks(src),
            vec![
                name("x"),
                Tok::Op("="),
                Tok::Op("["),
                Tok::Int(1),
                Tok::Op(","),
                Tok::Int(2),
                Tok::Op("]"),
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn numbers_and_operators() {
        assert_eq!(
            toks("a //= 2.5e1 ** 0x10"),
            vec![
                name("a"),
                Tok::Op("//="),
                Tok::Float(25.0),
                Tok::Op("**"),
                Tok::Int(16),
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn strings() {
        assert_eq!(toks(r"'a\tb'")[0], Tok::Str("a\tb".into()));
        assert_eq!(toks(r"r'a\tb'")[0], Tok::Str("a\\tb".into()));
        assert_eq!(toks("'''x\ny'''")[0], Tok::Str("x\ny".into()));
        assert!(tokenize("'open").is_err());
    }

    #[test]
    fn fstring_pieces() {
        assert_eq!(
            toks("f'{{x}} = {x:.2f}{y!r}'")[0],
            Tok::FStr(vec![
                FPiece::Lit("{x} = ".into()),
                FPiece::Expr {
                    src: "x".into(),
                    conversion: None,
                    spec: ".2f".into(),
                },
                FPiece::Expr {
                    src: "y".into(),
                    conversion: Some('r'),
                    spec: String::new(),
                },
            ])
        );
        assert_eq!(
            toks("f\"{d['k']}\"")[0],
            Tok::FStr(vec![FPiece::Expr {
                src: "d['k']".into(),
                conversion: None,
                spec: String::new(),
            }])
        );
    }

    #[test]
    fn bad_dedent() {
        let err = tokenize("if x:\n    y\n  z\n").unwrap_err();
        assert_eq!(err.kind, "IndentationError");
    }
}
