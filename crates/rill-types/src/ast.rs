//! AST node types for the Rill language.
//!
//! Every node carries a [`Span`] for error reporting. Expressions also carry
//! a [`NodeId`] so the analyzer can attach inferred types to them without
//! mutating the tree. Large recursive types are boxed.

use serde::{Deserialize, Serialize};

use crate::{Span, Type};

// ══════════════════════════════════════════════════════════════════════════════
// Top Level
// ══════════════════════════════════════════════════════════════════════════════

/// A complete program: functions and tasks in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub items: Vec<Item>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Function(FunctionDecl),
    Task(TaskDecl),
}

impl Item {
    pub fn name(&self) -> &Ident {
        match self {
            Item::Function(f) => &f.name,
            Item::Task(t) => &t.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Item::Function(f) => f.span,
            Item::Task(t) => t.span,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ══════════════════════════════════════════════════════════════════════════════

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// Stable identity of an expression node, assigned at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

// ══════════════════════════════════════════════════════════════════════════════
// Declarations
// ══════════════════════════════════════════════════════════════════════════════

/// `name: type` or `name: type = default`
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: Type,
    /// Passed when a call leaves this argument out.
    pub default: Option<Literal>,
    pub span: Span,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: Ident::new(name, Span::default()),
            ty,
            default: None,
            span: Span::default(),
        }
    }

    pub fn with_default(mut self, value: Literal) -> Self {
        self.default = Some(value);
        self
    }
}

/// What a function hands back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Outputs {
    /// No value.
    None,
    /// A single value returned on the operand stack.
    Single(Type),
    /// Named outputs written to the function's output region.
    Named(Vec<Param>),
}

/// `func name{config}(params) outputs { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Ident,
    /// Configuration parameters; bound before the regular parameters.
    pub config: Vec<Param>,
    pub params: Vec<Param>,
    pub outputs: Outputs,
    pub body: Block,
    pub span: Span,
}

/// What wakes a task up.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Runs whenever any of the named channels receives a value.
    Channels(Vec<Ident>),
    /// Runs on a fixed period, in nanoseconds.
    Interval(i64),
}

/// `task name on <trigger> { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDecl {
    pub name: Ident,
    pub trigger: Trigger,
    pub body: Block,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

/// `{ stmt* }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self {
            stmts,
            span: Span::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `name := init` or, when stateful, `name $= init`.
    VarDecl(VarDecl),
    /// `target[index] op= value`
    Assign(Assign),
    If(IfStmt),
    Loop(LoopStmt),
    Break(Span),
    Continue(Span),
    Return(ReturnStmt),
    /// An expression evaluated for its effects.
    Expr(Expr),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::VarDecl(s) => s.span,
            Stmt::Assign(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::Loop(s) => s.span,
            Stmt::Break(span) | Stmt::Continue(span) => *span,
            Stmt::Return(s) => s.span,
            Stmt::Expr(e) => e.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: Ident,
    /// Declared type; inferred from the initializer when absent.
    pub ty: Option<Type>,
    pub init: Expr,
    /// Value persists across activations through the host.
    pub stateful: bool,
    pub span: Span,
}

/// Plain or compound assignment operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl AssignOp {
    /// The arithmetic operator a compound assignment applies.
    pub fn binary(self) -> Option<BinOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
            AssignOp::Rem => Some(BinOp::Rem),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Rem => "%=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub target: Ident,
    /// Present for `target[index] = value`.
    pub index: Option<Expr>,
    pub op: AssignOp,
    pub value: Expr,
    pub span: Span,
}

/// `if c { } else if c { } else { }`
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_block: Block,
    pub else_ifs: Vec<(Expr, Block)>,
    pub else_block: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopKind {
    /// `for { }`
    Forever,
    /// `for cond { }`
    While(Expr),
    /// `for var := start..end step s { }`; start defaults to 0, step to 1.
    Range {
        var: Ident,
        start: Option<Expr>,
        end: Expr,
        step: Option<Expr>,
    },
    /// `for index, item := range seq { }`
    Each {
        index: Option<Ident>,
        item: Ident,
        seq: Expr,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopStmt {
    pub kind: LoopKind,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind, span: Span) -> Self {
        Self { id, kind, span }
    }

    /// A bare literal, looking through parentheses.
    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExprKind::Literal(lit) => Some(lit),
            ExprKind::Paren(inner) => inner.as_literal(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    Paren(Box<Expr>),
    /// `T(expr)`
    Cast {
        target: Type,
        expr: Box<Expr>,
    },
    Call {
        callee: Ident,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// `target[start:end]`
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    /// `[a, b, c]`
    SeriesLit(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `base ^ exponent`, right-associative.
    Power {
        base: Box<Expr>,
        exponent: Box<Expr>,
    },
    /// A chain of operators at one precedence level: `lhs op rhs op rhs ...`,
    /// evaluated left to right.
    Binary {
        lhs: Box<Expr>,
        rest: Vec<(BinOp, Expr)>,
    },
    /// `a && b && c` or `a || b || c`.
    Logical {
        op: LogicalOp,
        operands: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    /// A time span in nanoseconds.
    Duration(i64),
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Binary precedence levels, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Equality,
    Relational,
    Additive,
    Multiplicative,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }

    pub fn precedence(self) -> Precedence {
        match self {
            BinOp::Eq | BinOp::Ne => Precedence::Equality,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => Precedence::Relational,
            BinOp::Add | BinOp::Sub => Precedence::Additive,
            BinOp::Mul | BinOp::Div | BinOp::Rem => Precedence::Multiplicative,
        }
    }

    /// Comparison operators produce a boolean.
    pub fn is_comparison(self) -> bool {
        matches!(
            self.precedence(),
            Precedence::Equality | Precedence::Relational
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}
