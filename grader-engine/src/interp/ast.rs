use std::collections::HashSet;
use std::rc::Rc;

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        targets: Vec<Target>,
        value: Expr,
    },
    AugAssign {
        target: Target,
        op: BinOp,
        value: Expr,
    },
    If {
        branches: Vec<(Expr, Block)>,
        orelse: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
        orelse: Option<Block>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Block,
        orelse: Option<Block>,
    },
    Try {
        body: Block,
        handlers: Vec<Handler>,
        orelse: Option<Block>,
        finalbody: Option<Block>,
    },
    Def(Rc<FuncDef>),
    Return(Option<Expr>),
    Raise(Option<Expr>),
    Assert {
        cond: Expr,
        msg: Option<Expr>,
    },
    Global(Vec<String>),
    Import {
        module: String,
        alias: Option<String>,
    },
    ImportFrom {
        module: String,
        names: Vec<(String, Option<String>)>,
    },
    Break,
    Continue,
    Pass,
}

#[derive(Debug, Clone)]
pub struct Handler {
    pub kind: Option<Expr>,
    pub name: Option<String>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub enum Target {
    Name(String),
    Index { obj: Expr, index: Expr },
    Unpack(Vec<Target>),
}

#[derive(Debug)]
pub struct FuncDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    /// Names bound anywhere in the body, minus `global` declarations.
    pub locals: HashSet<String>,
}

impl FuncDef {
    pub fn new(name: String, params: Vec<Param>, body: Block) -> Self {
        let mut locals: HashSet<String> = params.iter().map(|p| p.name.clone()).collect();
        let mut globals = HashSet::new();
        collect_bound(&body, &mut locals, &mut globals);
        locals.retain(|name| !globals.contains(name));
        Self {
            name,
            params,
            body,
            locals,
        }
    }
}

fn collect_bound(block: &[Stmt], bound: &mut HashSet<String>, globals: &mut HashSet<String>) {
    for stmt in block {
        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for target in targets {
                    target_names(target, bound);
                }
            }
            StmtKind::AugAssign { target, .. } => target_names(target, bound),
            StmtKind::For {
                target,
                body,
                orelse,
                ..
            } => {
                target_names(target, bound);
                collect_bound(body, bound, globals);
                if let Some(orelse) = orelse {
                    collect_bound(orelse, bound, globals);
                }
            }
            StmtKind::While { body, orelse, .. } => {
                collect_bound(body, bound, globals);
                if let Some(orelse) = orelse {
                    collect_bound(orelse, bound, globals);
                }
            }
            StmtKind::If { branches, orelse } => {
                for (_, body) in branches {
                    collect_bound(body, bound, globals);
                }
                if let Some(orelse) = orelse {
                    collect_bound(orelse, bound, globals);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_bound(body, bound, globals);
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        bound.insert(name.clone());
                    }
                    collect_bound(&handler.body, bound, globals);
                }
                for block in [orelse, finalbody].into_iter().flatten() {
                    collect_bound(block, bound, globals);
                }
            }
            StmtKind::Def(def) => {
                bound.insert(def.name.clone());
            }
            StmtKind::Import { module, alias } => {
                bound.insert(alias.as_ref().unwrap_or(module).clone());
            }
            StmtKind::ImportFrom { names, .. } => {
                for (name, alias) in names {
                    bound.insert(alias.as_ref().unwrap_or(name).clone());
                }
            }
            StmtKind::Global(names) => globals.extend(names.iter().cloned()),
            _ => {}
        }
    }
}

fn target_names(target: &Target, bound: &mut HashSet<String>) {
    match target {
        Target::Name(name) => {
            bound.insert(name.clone());
        }
        Target::Unpack(targets) => {
            for target in targets {
                target_names(target, bound);
            }
        }
        Target::Index { .. } => {}
    }
}

#[derive(Debug)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct Comprehension {
    pub target: Target,
    pub iter: Expr,
    pub conds: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub enum Arg {
    Pos(Expr),
    Star(Expr),
    Kw(String, Expr),
}

#[derive(Debug, Clone)]
pub enum FPart {
    Lit(String),
    Expr {
        expr: Expr,
        conversion: Option<char>,
        spec: String,
    },
}

#[derive(Debug, Clone)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    FString(Vec<FPart>),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    Attr {
        obj: Box<Expr>,
        name: String,
    },
    Index {
        obj: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        obj: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Arg>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda(Rc<FuncDef>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "** or pow()",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}
