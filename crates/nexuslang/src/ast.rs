//! Abstract syntax tree shared by the parser, interpreter, and compiler.
//!
//! The parser is the only producer. Every node carries the source position of
//! its first token; the interpreter and compiler treat the tree as read-only.

use std::rc::Rc;

use crate::token::CodeLoc;

/// A parsed program: ordered top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

/// An ordered sequence of statements introducing a new scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub loc: CodeLoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    /// Operator spelling used in diagnostics.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// A named argument in a call-shaped form (`name: value`).
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArg {
    pub name: String,
    pub value: Expr,
    pub loc: CodeLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: CodeLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    BoolLit(bool),
    NullLit,
    Ident(String),
    Array(Vec<Expr>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        target: Box<Expr>,
        name: String,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        named: Vec<NamedArg>,
    },
    /// Half-open integer range `start..end`.
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },
    /// `knowledge(query, filter: value, ...)` — host knowledge oracle.
    Knowledge {
        query: Box<Expr>,
        filters: Vec<NamedArg>,
    },
    /// `listen(timeout: ?, language: ?)` — host voice input.
    Listen {
        timeout: Option<Box<Expr>>,
        language: Option<Box<Expr>>,
    },
    /// `get_trait(name)` — read from the personality record.
    GetTrait {
        name: Box<Expr>,
    },
}

/// A function parameter. Parameters with defaults must follow those without.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_hint: Option<String>,
    pub default: Option<Expr>,
    pub loc: CodeLoc,
}

/// A function declaration.
///
/// Wrapped in `Rc` so closure values can share the body without cloning it.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_hint: Option<String>,
    pub body: Block,
    pub loc: CodeLoc,
}

/// One `trait: value` entry in a personality block.
///
/// The value is range-checked to [0.0, 1.0] at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitEntry {
    pub name: String,
    pub value: f64,
    pub loc: CodeLoc,
}

/// The left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Ident(String),
    Index { target: Expr, index: Expr },
    Member { target: Expr, name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: CodeLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let {
        name: String,
        type_hint: Option<String>,
        init: Expr,
    },
    Const {
        name: String,
        type_hint: Option<String>,
        init: Expr,
    },
    Assign {
        target: AssignTarget,
        value: Expr,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    For {
        binding: String,
        iterable: Expr,
        body: Block,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Block(Block),
    FunctionDecl(Rc<FunctionDecl>),
    /// Top-level `personality { trait: value, ... }` block.
    Personality(Vec<TraitEntry>),
    /// `voice { ... }` — a block executed under the host's voice context.
    Voice(Block),
    /// `say(text, emotion: ?, voice_id: ?, speed: ?)`.
    Say {
        text: Expr,
        emotion: Option<Expr>,
        voice_id: Option<Expr>,
        speed: Option<Expr>,
    },
    /// `optimize_self(metric: ?, target: ?, strategy: ?)`.
    OptimizeSelf {
        metric: Expr,
        target: Expr,
        strategy: Option<Expr>,
    },
    Expr(Expr),
}
