use super::ast::*;
use super::error::SyntaxError;
use super::lexer::{tokenize, FPiece, Tok, Token};

use std::rc::Rc;

type Result<T> = std::result::Result<T, SyntaxError>;

/// Bound on nested expressions and blocks.
const MAX_NESTING: usize = 100;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

pub fn parse_program(src: &str) -> Result<Block> {
    let mut parser = Parser::new(tokenize(src)?, 0);
    let mut body = Vec::new();
    while !parser.check(&Tok::Eof) {
        if parser.eat(&Tok::Newline) {
            continue;
        }
        body.extend(parser.statement()?);
    }
    Ok(body)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
    functions: usize,
    loops: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, nesting: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting,
            functions: 0,
            loops: 0,
        }
    }

    fn peek(&self) -> &Tok {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Tok {
        self.tokens
            .get(self.pos + n)
            .or_else(|| self.tokens.last())
            .map_or(&Tok::Eof, |t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        let found = self.check(tok);
        if found {
            self.advance();
        }
        found
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        let found = self.is_op(op);
        if found {
            self.advance();
        }
        found
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", op)))
        }
    }

    fn is_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == kw)
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        let found = self.is_kw(kw);
        if found {
            self.advance();
        }
        found
    }

    fn expect_kw(&mut self, kw: &str) -> Result<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", kw)))
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.peek() {
            Tok::Name(n) if !KEYWORDS.contains(&n.as_str()) => {
                let n = n.clone();
                self.advance();
                Ok(n)
            }
            _ => Err(self.error("invalid syntax")),
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        match self.peek() {
            Tok::Eof => SyntaxError::new(self.line(), "unexpected EOF while parsing"),
            _ => SyntaxError::new(self.line(), message),
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(SyntaxError::new(self.line(), "too many nested expressions"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.leave_n(1)
    }

    fn leave_n(&mut self, n: usize) {
        self.nesting = self.nesting.saturating_sub(n);
    }

    fn at_stmt_end(&self) -> bool {
        matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Op(";"))
    }

    fn can_start_expr(&self) -> bool {
        match self.peek() {
            Tok::Name(n) => {
                !KEYWORDS.contains(&n.as_str())
                    || matches!(n.as_str(), "True" | "False" | "None" | "not" | "lambda")
            }
            Tok::Int(_) | Tok::Float(_) | Tok::Str(_) | Tok::FStr(_) => true,
            Tok::Op(o) => matches!(*o, "(" | "[" | "{" | "-" | "+" | "~"),
            _ => false,
        }
    }

    // statements

    fn statement(&mut self) -> Result<Vec<Stmt>> {
        let line = self.line();
        let word = match self.peek() {
            Tok::Indent => return Err(SyntaxError::indentation(line, "unexpected indent")),
            Tok::Name(n) => n.clone(),
            _ => return self.simple_stmts(),
        };
        let kind = match word.as_str() {
            "if" => self.if_stmt()?,
            "while" => self.while_stmt()?,
            "for" => self.for_stmt()?,
            "def" => self.def_stmt()?,
            "try" => self.try_stmt()?,
            "class" | "with" | "async" => {
                return Err(SyntaxError::new(
                    line,
                    format!("'{}' statements are not supported", word),
                ))
            }
            _ => return self.simple_stmts(),
        };
        Ok(vec![Stmt { kind, line }])
    }

    fn block(&mut self) -> Result<Block> {
        self.expect_op(":")?;
        self.enter()?;
        let body = if self.eat(&Tok::Newline) {
            if !self.eat(&Tok::Indent) {
                return Err(SyntaxError::indentation(
                    self.line(),
                    "expected an indented block",
                ));
            }
            let mut body = Vec::new();
            while !self.eat(&Tok::Dedent) && !self.check(&Tok::Eof) {
                body.extend(self.statement()?);
            }
            body
        } else {
            self.simple_stmts()?
        };
        self.leave();
        Ok(body)
    }

    fn optional_else(&mut self) -> Result<Option<Block>> {
        if self.eat_kw("else") {
            Ok(Some(self.block()?))
        } else {
            Ok(None)
        }
    }

    fn if_stmt(&mut self) -> Result<StmtKind> {
        self.advance();
        let cond = self.expr()?;
        let body = self.block()?;
        let mut branches = vec![(cond, body)];
        while self.eat_kw("elif") {
            let cond = self.expr()?;
            let body = self.block()?;
            branches.push((cond, body));
        }
        let orelse = self.optional_else()?;
        Ok(StmtKind::If { branches, orelse })
    }

    fn loop_body(&mut self) -> Result<Block> {
        self.loops += 1;
        let body = self.block();
        self.loops -= 1;
        body
    }

    fn while_stmt(&mut self) -> Result<StmtKind> {
        self.advance();
        let cond = self.expr()?;
        let body = self.loop_body()?;
        let orelse = self.optional_else()?;
        Ok(StmtKind::While { cond, body, orelse })
    }

    fn for_stmt(&mut self) -> Result<StmtKind> {
        self.advance();
        let target = self.target_list()?;
        self.expect_kw("in")?;
        let iter = self.expr_list()?;
        let body = self.loop_body()?;
        let orelse = self.optional_else()?;
        Ok(StmtKind::For {
            target,
            iter,
            body,
            orelse,
        })
    }

    fn def_stmt(&mut self) -> Result<StmtKind> {
        self.advance();
        let name = self.ident()?;
        self.expect_op("(")?;
        let params = self.params(")")?;
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.expr()?;
        }

        let loops = std::mem::replace(&mut self.loops, 0);
        self.functions += 1;
        let body = self.block();
        self.functions -= 1;
        self.loops = loops;

        Ok(StmtKind::Def(Rc::new(FuncDef::new(name, params, body?))))
    }

    fn params(&mut self, close: &str) -> Result<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        while !self.is_op(close) {
            if self.is_op("*") || self.is_op("**") {
                return Err(self.error("variadic parameters are not supported"));
            }
            let name = self.ident()?;
            if close == ")" && self.eat_op(":") {
                self.expr()?;
            }
            let default = if self.eat_op("=") {
                Some(self.expr()?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    return Err(self.error("non-default argument follows default argument"));
                }
                None
            };
            if params.iter().any(|p| p.name == name) {
                return Err(self.error(format!(
                    "duplicate argument '{}' in function definition",
                    name
                )));
            }
            params.push(Param { name, default });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    fn try_stmt(&mut self) -> Result<StmtKind> {
        self.advance();
        let body = self.block()?;
        let mut handlers = Vec::new();
        while self.eat_kw("except") {
            let kind = if self.is_op(":") {
                None
            } else {
                Some(self.expr()?)
            };
            let name = if self.eat_kw("as") {
                Some(self.ident()?)
            } else {
                None
            };
            let body = self.block()?;
            handlers.push(Handler { kind, name, body });
        }
        let orelse = if handlers.is_empty() {
            None
        } else {
            self.optional_else()?
        };
        let finalbody = if self.eat_kw("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if handlers.is_empty() && finalbody.is_none() {
            return Err(self.error("expected 'except' or 'finally' block"));
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn simple_stmts(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = vec![self.simple_stmt()?];
        while self.eat_op(";") {
            if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                break;
            }
            stmts.push(self.simple_stmt()?);
        }
        if !self.eat(&Tok::Newline) && !self.check(&Tok::Eof) {
            return Err(self.error("invalid syntax"));
        }
        Ok(stmts)
    }

    fn simple_stmt(&mut self) -> Result<Stmt> {
        let line = self.line();
        let word = match self.peek() {
            Tok::Name(n) => n.clone(),
            _ => String::new(),
        };
        let kind = match word.as_str() {
            "pass" => {
                self.advance();
                StmtKind::Pass
            }
            "break" | "continue" => {
                if self.loops == 0 {
                    return Err(SyntaxError::new(line, format!("'{}' outside loop", word)));
                }
                self.advance();
                if word == "break" {
                    StmtKind::Break
                } else {
                    StmtKind::Continue
                }
            }
            "return" => {
                if self.functions == 0 {
                    return Err(SyntaxError::new(line, "'return' outside function"));
                }
                self.advance();
                if self.at_stmt_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.expr_list()?))
                }
            }
            "raise" => {
                self.advance();
                let exc = if self.at_stmt_end() {
                    None
                } else {
                    Some(self.expr()?)
                };
                if self.is_kw("from") {
                    return Err(self.error("'raise ... from' is not supported"));
                }
                StmtKind::Raise(exc)
            }
            "assert" => {
                self.advance();
                let cond = self.expr()?;
                let msg = if self.eat_op(",") {
                    Some(self.expr()?)
                } else {
                    None
                };
                StmtKind::Assert { cond, msg }
            }
            "global" => {
                self.advance();
                let mut names = vec![self.ident()?];
                while self.eat_op(",") {
                    names.push(self.ident()?);
                }
                StmtKind::Global(names)
            }
            "import" => {
                self.advance();
                let module = self.ident()?;
                if self.is_op(".") || self.is_op(",") {
                    return Err(self.error("only single top-level modules can be imported"));
                }
                let alias = if self.eat_kw("as") {
                    Some(self.ident()?)
                } else {
                    None
                };
                StmtKind::Import { module, alias }
            }
            "from" => {
                self.advance();
                let module = self.ident()?;
                self.expect_kw("import")?;
                if self.is_op("*") {
                    return Err(self.error("wildcard imports are not supported"));
                }
                let paren = self.eat_op("(");
                let mut names = Vec::new();
                loop {
                    let name = self.ident()?;
                    let alias = if self.eat_kw("as") {
                        Some(self.ident()?)
                    } else {
                        None
                    };
                    names.push((name, alias));
                    if !self.eat_op(",") || (paren && self.is_op(")")) {
                        break;
                    }
                }
                if paren {
                    self.expect_op(")")?;
                }
                StmtKind::ImportFrom { module, names }
            }
            "del" | "nonlocal" | "yield" | "await" => {
                return Err(SyntaxError::new(line, format!("'{}' is not supported", word)))
            }
            _ => self.expr_stmt()?,
        };
        Ok(Stmt { kind, line })
    }

    fn expr_stmt(&mut self) -> Result<StmtKind> {
        let first = self.expr_list()?;

        if self.eat_op(":") {
            self.expr()?;
            let target = self.to_target(first)?;
            return Ok(if self.eat_op("=") {
                StmtKind::Assign {
                    targets: vec![target],
                    value: self.expr_list()?,
                }
            } else {
                StmtKind::Pass
            });
        }

        if self.is_op("=") {
            let mut targets = Vec::new();
            let mut value = first;
            while self.eat_op("=") {
                targets.push(self.to_target(value)?);
                value = self.expr_list()?;
            }
            return Ok(StmtKind::Assign { targets, value });
        }

        if let Some(op) = self.aug_op() {
            self.advance();
            let target = match self.to_target(first)? {
                Target::Unpack(_) => {
                    return Err(self.error("illegal expression for augmented assignment"))
                }
                target => target,
            };
            let value = self.expr_list()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }

        Ok(StmtKind::Expr(first))
    }

    fn aug_op(&self) -> Option<BinOp> {
        let op = match self.peek() {
            Tok::Op(o) => *o,
            _ => return None,
        };
        Some(match op {
            "+=" => BinOp::Add,
            "-=" => BinOp::Sub,
            "*=" => BinOp::Mul,
            "/=" => BinOp::Div,
            "//=" => BinOp::FloorDiv,
            "%=" => BinOp::Mod,
            "**=" => BinOp::Pow,
            "&=" => BinOp::BitAnd,
            "|=" => BinOp::BitOr,
            "^=" => BinOp::BitXor,
            "<<=" => BinOp::Shl,
            ">>=" => BinOp::Shr,
            _ => return None,
        })
    }

    fn to_target(&self, expr: Expr) -> Result<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Index { obj, index } => Ok(Target::Index {
                obj: *obj,
                index: *index,
            }),
            Expr::Tuple(items) | Expr::List(items) => Ok(Target::Unpack(
                items
                    .into_iter()
                    .map(|item| self.to_target(item))
                    .collect::<Result<_>>()?,
            )),
            Expr::Attr { .. } => Err(self.error("cannot assign to attribute")),
            Expr::Slice { .. } => Err(self.error("slice assignment is not supported")),
            Expr::None | Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) => {
                Err(self.error("cannot assign to literal"))
            }
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    fn target_list(&mut self) -> Result<Target> {
        let first = self.bitor()?;
        if !self.is_op(",") {
            return self.to_target(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_kw("in") {
                break;
            }
            items.push(self.bitor()?);
        }
        self.to_target(Expr::Tuple(items))
    }

    // expressions

    fn expr_list(&mut self) -> Result<Expr> {
        let first = self.expr()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if !self.can_start_expr() {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn expr(&mut self) -> Result<Expr> {
        self.enter()?;
        let expr = self.conditional();
        self.leave();
        expr
    }

    fn conditional(&mut self) -> Result<Expr> {
        if self.eat_kw("lambda") {
            return self.lambda();
        }
        let then = self.disjunction()?;
        if !self.eat_kw("if") {
            return Ok(then);
        }
        let cond = self.disjunction()?;
        self.expect_kw("else")?;
        let orelse = self.expr()?;
        Ok(Expr::IfElse {
            cond: Box::new(cond),
            then: Box::new(then),
            orelse: Box::new(orelse),
        })
    }

    fn lambda(&mut self) -> Result<Expr> {
        let line = self.line();
        let params = self.params(":")?;
        self.expect_op(":")?;
        let loops = std::mem::replace(&mut self.loops, 0);
        self.functions += 1;
        let body = self.expr();
        self.functions -= 1;
        self.loops = loops;
        let body = vec![Stmt {
            kind: StmtKind::Return(Some(body?)),
            line,
        }];
        Ok(Expr::Lambda(Rc::new(FuncDef::new(
            "<lambda>".to_owned(),
            params,
            body,
        ))))
    }

    fn disjunction(&mut self) -> Result<Expr> {
        let mut left = self.conjunction()?;
        let mut depth = 0;
        while self.eat_kw("or") {
            self.enter()?;
            depth += 1;
            let right = self.conjunction()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.leave_n(depth);
        Ok(left)
    }

    fn conjunction(&mut self) -> Result<Expr> {
        let mut left = self.inversion()?;
        let mut depth = 0;
        while self.eat_kw("and") {
            self.enter()?;
            depth += 1;
            let right = self.inversion()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.leave_n(depth);
        Ok(left)
    }

    fn inversion(&mut self) -> Result<Expr> {
        if !self.eat_kw("not") {
            return self.comparison();
        }
        self.enter()?;
        let operand = self.inversion()?;
        self.leave();
        Ok(Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        })
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.bitor()?;
        let mut ops = Vec::new();
        loop {
            let (op, width) = match (self.peek(), self.peek_at(1)) {
                (Tok::Op("=="), _) => (CmpOp::Eq, 1),
                (Tok::Op("!="), _) => (CmpOp::NotEq, 1),
                (Tok::Op("<"), _) => (CmpOp::Lt, 1),
                (Tok::Op("<="), _) => (CmpOp::LtE, 1),
                (Tok::Op(">"), _) => (CmpOp::Gt, 1),
                (Tok::Op(">="), _) => (CmpOp::GtE, 1),
                (Tok::Name(n), _) if n == "in" => (CmpOp::In, 1),
                (Tok::Name(n), Tok::Name(m)) if n == "not" && m == "in" => (CmpOp::NotIn, 2),
                (Tok::Name(n), Tok::Name(m)) if n == "is" && m == "not" => (CmpOp::IsNot, 2),
                (Tok::Name(n), _) if n == "is" => (CmpOp::Is, 1),
                _ => break,
            };
            for _ in 0..width {
                self.advance();
            }
            ops.push((op, self.bitor()?));
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
            })
        }
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        let mut depth = 0;
        loop {
            let op = match self.peek() {
                Tok::Op(o) => ops.iter().find(|(s, _)| s == o).map(|(_, op)| *op),
                _ => None,
            };
            let op = match op {
                Some(op) => op,
                None => break,
            };
            self.advance();
            self.enter()?;
            depth += 1;
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.leave_n(depth);
        Ok(left)
    }

    fn bitor(&mut self) -> Result<Expr> {
        self.binary_level(&[("|", BinOp::BitOr)], Self::bitxor)
    }

    fn bitxor(&mut self) -> Result<Expr> {
        self.binary_level(&[("^", BinOp::BitXor)], Self::bitand)
    }

    fn bitand(&mut self) -> Result<Expr> {
        self.binary_level(&[("&", BinOp::BitAnd)], Self::shift)
    }

    fn shift(&mut self) -> Result<Expr> {
        self.binary_level(&[("<<", BinOp::Shl), (">>", BinOp::Shr)], Self::sum)
    }

    fn sum(&mut self) -> Result<Expr> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::term)
    }

    fn term(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                ("*", BinOp::Mul),
                ("/", BinOp::Div),
                ("//", BinOp::FloorDiv),
                ("%", BinOp::Mod),
            ],
            Self::factor,
        )
    }

    fn factor(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Tok::Op("-") => UnaryOp::Neg,
            Tok::Op("+") => UnaryOp::Pos,
            Tok::Op("~") => UnaryOp::Invert,
            _ => return self.power(),
        };
        self.advance();
        self.enter()?;
        let operand = self.factor()?;
        self.leave();
        Ok(match (op, operand) {
            (UnaryOp::Neg, Expr::Int(n)) if n != i64::MIN => Expr::Int(-n),
            (UnaryOp::Neg, Expr::Float(x)) => Expr::Float(-x),
            (op, operand) => Expr::Unary {
                op,
                operand: Box::new(operand),
            },
        })
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.primary()?;
        if !self.eat_op("**") {
            return Ok(base);
        }
        self.enter()?;
        let exp = self.factor()?;
        self.leave();
        Ok(Expr::Binary {
            op: BinOp::Pow,
            left: Box::new(base),
            right: Box::new(exp),
        })
    }

    fn primary(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        let mut depth = 0;
        loop {
            let trailer = if self.eat_op("(") {
                let args = self.call_args()?;
                Expr::Call {
                    func: Box::new(expr),
                    args,
                }
            } else if self.eat_op("[") {
                self.subscript(expr)?
            } else if self.eat_op(".") {
                let name = self.ident()?;
                Expr::Attr {
                    obj: Box::new(expr),
                    name,
                }
            } else {
                break;
            };
            self.enter()?;
            depth += 1;
            expr = trailer;
        }
        self.leave_n(depth);
        Ok(expr)
    }

    fn atom(&mut self) -> Result<Expr> {
        let line = self.line();
        let tok = self.advance();
        Ok(match tok {
            Tok::Int(n) => Expr::Int(n),
            Tok::Float(x) => Expr::Float(x),
            Tok::Str(_) | Tok::FStr(_) => self.strings(tok, line)?,
            Tok::Name(n) => match n.as_str() {
                "True" => Expr::Bool(true),
                "False" => Expr::Bool(false),
                "None" => Expr::None,
                kw if KEYWORDS.contains(&kw) => {
                    return Err(SyntaxError::new(line, "invalid syntax"))
                }
                _ => Expr::Name(n),
            },
            Tok::Op("(") => self.paren()?,
            Tok::Op("[") => self.list_display()?,
            Tok::Op("{") => self.dict_display()?,
            Tok::Indent => return Err(SyntaxError::indentation(line, "unexpected indent")),
            Tok::Eof => return Err(SyntaxError::new(line, "unexpected EOF while parsing")),
            _ => return Err(SyntaxError::new(line, "invalid syntax")),
        })
    }

    /// Adjacent string literals concatenate.
    fn strings(&mut self, first: Tok, line: usize) -> Result<Expr> {
        let mut parts = Vec::new();
        let mut formatted = false;
        let mut tok = first;
        loop {
            match tok {
                Tok::Str(s) => parts.push(FPart::Lit(s)),
                Tok::FStr(pieces) => {
                    formatted = true;
                    for piece in pieces {
                        parts.push(match piece {
                            FPiece::Lit(s) => FPart::Lit(s),
                            FPiece::Expr {
                                src,
                                conversion,
                                spec,
                            } => FPart::Expr {
                                expr: self.fstring_expr(&src, line)?,
                                conversion,
                                spec,
                            },
                        });
                    }
                }
                _ => break,
            }
            if !matches!(self.peek(), Tok::Str(_) | Tok::FStr(_)) {
                break;
            }
            tok = self.advance();
        }

        if formatted {
            return Ok(Expr::FString(parts));
        }
        let text: String = parts
            .into_iter()
            .map(|part| match part {
                FPart::Lit(s) => s,
                FPart::Expr { .. } => String::new(),
            })
            .collect();
        Ok(Expr::Str(text.into()))
    }

    fn fstring_expr(&mut self, src: &str, line: usize) -> Result<Expr> {
        let relocate = |err: SyntaxError| SyntaxError::new(line, format!("f-string: {}", err.message));
        let tokens = tokenize(&format!("({})", src)).map_err(relocate)?;
        let mut sub = Parser::new(tokens, self.nesting);
        let expr = sub.expr().map_err(relocate)?;
        sub.eat(&Tok::Newline);
        if !sub.check(&Tok::Eof) {
            return Err(SyntaxError::new(line, "f-string: invalid syntax"));
        }
        Ok(expr)
    }

    fn paren(&mut self) -> Result<Expr> {
        if self.eat_op(")") {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.expr()?;
        let expr = if self.is_kw("for") {
            Expr::ListComp {
                elt: Box::new(first),
                generators: self.comprehension()?,
            }
        } else if self.is_op(",") {
            let mut items = vec![first];
            while self.eat_op(",") {
                if self.is_op(")") {
                    break;
                }
                items.push(self.expr()?);
            }
            Expr::Tuple(items)
        } else {
            first
        };
        self.expect_op(")")?;
        Ok(expr)
    }

    fn list_display(&mut self) -> Result<Expr> {
        if self.eat_op("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expr()?;
        if self.is_kw("for") {
            let generators = self.comprehension()?;
            self.expect_op("]")?;
            return Ok(Expr::ListComp {
                elt: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op("]") {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect_op("]")?;
        Ok(Expr::List(items))
    }

    fn dict_display(&mut self) -> Result<Expr> {
        if self.eat_op("}") {
            return Ok(Expr::Dict(Vec::new()));
        }
        let key = self.expr()?;
        if !self.eat_op(":") {
            return Err(self.error("set literals are not supported"));
        }
        let value = self.expr()?;
        if self.is_kw("for") {
            let generators = self.comprehension()?;
            self.expect_op("}")?;
            return Ok(Expr::DictComp {
                key: Box::new(key),
                value: Box::new(value),
                generators,
            });
        }
        let mut entries = vec![(key, value)];
        while self.eat_op(",") {
            if self.is_op("}") {
                break;
            }
            let key = self.expr()?;
            self.expect_op(":")?;
            let value = self.expr()?;
            entries.push((key, value));
        }
        self.expect_op("}")?;
        Ok(Expr::Dict(entries))
    }

    fn comprehension(&mut self) -> Result<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.eat_kw("for") {
            let target = self.target_list()?;
            self.expect_kw("in")?;
            let iter = self.disjunction()?;
            let mut conds = Vec::new();
            while self.eat_kw("if") {
                conds.push(self.disjunction()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                conds,
            });
        }
        Ok(generators)
    }

    fn call_args(&mut self) -> Result<Vec<Arg>> {
        let mut args = Vec::new();
        let mut seen_keyword = false;
        while !self.is_op(")") {
            if self.eat_op("*") {
                args.push(Arg::Star(self.expr()?));
            } else if self.is_op("**") {
                return Err(self.error("'**' arguments are not supported"));
            } else if matches!(
                (self.peek(), self.peek_at(1)),
                (Tok::Name(_), Tok::Op("="))
            ) {
                let name = self.ident()?;
                self.advance();
                seen_keyword = true;
                args.push(Arg::Kw(name, self.expr()?));
            } else {
                if seen_keyword {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                let value = self.expr()?;
                if self.is_kw("for") {
                    let generators = self.comprehension()?;
                    args.push(Arg::Pos(Expr::ListComp {
                        elt: Box::new(value),
                        generators,
                    }));
                } else {
                    args.push(Arg::Pos(value));
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(args)
    }

    fn subscript(&mut self, obj: Expr) -> Result<Expr> {
        let obj = Box::new(obj);
        let lower = if self.is_op(":") {
            None
        } else {
            Some(self.expr_list()?)
        };
        if !self.eat_op(":") {
            self.expect_op("]")?;
            let index = lower.ok_or_else(|| self.error("invalid syntax"))?;
            return Ok(Expr::Index {
                obj,
                index: Box::new(index),
            });
        }
        let upper = if self.is_op(":") || self.is_op("]") {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let step = if self.eat_op(":") && !self.is_op("]") {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        self.expect_op("]")?;
        Ok(Expr::Slice {
            obj,
            lower: lower.map(Box::new),
            upper,
            step,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Block {
        parse_program(src).unwrap()
    }

    fn parse_err(src: &str) -> SyntaxError {
        parse_program(src).unwrap_err()
    }

    #[test]
    fn statements_and_blocks() {
        let src = "\
def f(a, b=2):
    if a > b:
        return a
    elif a == b: return 0
    else:
        pass
    return b

for i, x in enumerate([1, 2]):
    total = f(i, x); print(total)
";
        let body = parse(src);
        assert_eq!(body.len(), 2);
        assert!(matches!(body[0].kind, StmtKind::Def(ref def) if def.params.len() == 2));
        match &body[1].kind {
            StmtKind::For { target: Target::Unpack(items), body, .. } => {
                assert_eq!(items.len(), 2);
                assert_eq!(body.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(body[1].line, 9);
    }

    #[test]
    fn precedence() {
        let body = parse("x = -2 ** 2 + 3 * 4");
        match &body[0].kind {
            StmtKind::Assign { value: Expr::Binary { op: BinOp::Add, left, right }, .. } => {
                assert!(matches!(**left, Expr::Unary { op: UnaryOp::Neg, .. }));
                assert!(matches!(**right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn chained_comparison_and_membership() {
        let body = parse("ok = 0 < x <= 10 and y not in z");
        match &body[0].kind {
            StmtKind::Assign { value: Expr::And(left, right), .. } => {
                assert!(matches!(**left, Expr::Compare { ref ops, .. } if ops.len() == 2));
                assert!(matches!(**right, Expr::Compare { ref ops, .. } if ops[0].0 == CmpOp::NotIn));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn comprehensions_and_generator_arguments() {
        parse("ys = [x * x for x in range(10) if x % 2 for _ in 'ab']");
        parse("d = {k: v for k, v in pairs}");
        parse("s = sum(x for x in xs)");
        parse("t = sorted(xs, key=lambda p: (p[1], -p[0]), reverse=True)");
    }

    #[test]
    fn fstrings() {
        let body = parse("print(f'{name!r}: {score:.2f}' 'tail')");
        match &body[0].kind {
            StmtKind::Expr(Expr::Call { args, .. }) => match &args[0] {
                Arg::Pos(Expr::FString(parts)) => assert_eq!(parts.len(), 4),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn slices() {
        let body = parse("a = b[::-1]\nc = b[1:]\nd = b[:2]\ne = b[i]");
        assert!(matches!(body[0].kind, StmtKind::Assign { value: Expr::Slice { lower: None, upper: None, step: Some(_), .. }, .. }));
        assert!(matches!(body[1].kind, StmtKind::Assign { value: Expr::Slice { lower: Some(_), upper: None, step: None, .. }, .. }));
        assert!(matches!(body[2].kind, StmtKind::Assign { value: Expr::Slice { lower: None, upper: Some(_), .. }, .. }));
        assert!(matches!(body[3].kind, StmtKind::Assign { value: Expr::Index { .. }, .. }));
    }

    #[test]
    fn try_except() {
        let body = parse("try:\n    x = 1 / 0\nexcept (ZeroDivisionError, ValueError) as e:\n    x = 0\nfinally:\n    pass\n");
        assert!(matches!(body[0].kind, StmtKind::Try { ref handlers, finalbody: Some(_), .. } if handlers.len() == 1));
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(parse_err("x = (1, 2").message, "unexpected EOF while parsing");
        assert_eq!(parse_err("return 1").message, "'return' outside function");
        assert_eq!(parse_err("break").message, "'break' outside loop");
        assert_eq!(parse_err("if x\n    y = 1").message, "expected ':'");
        assert_eq!(parse_err("  x = 1").kind, "IndentationError");
        assert_eq!(parse_err("if x:\ny = 1").kind, "IndentationError");
        assert_eq!(parse_err("class A: pass").message, "'class' statements are not supported");
        assert_eq!(parse_err("1 = x").message, "cannot assign to literal");
        assert_eq!(parse_err("f(a=1, 2)").message, "positional argument follows keyword argument");
    }

    #[test]
    fn nesting_is_bounded() {
        let src = format!("x = {}1{}", "(".repeat(150), ")".repeat(150));
        assert_eq!(parse_err(&src).message, "too many nested expressions");
        let src = format!("x = 1{}", " + 1".repeat(150));
        assert_eq!(parse_err(&src).message, "too many nested expressions");
        parse(&format!("x = {}1{}", "(".repeat(20), ")".repeat(20)));
    }
}
