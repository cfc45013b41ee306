//! Programmatic construction of typed trees.
//!
//! Hosts that embed the backend without the textual front end, and the
//! backend's own tests, build programs through [`AstBuilder`]. Every
//! expression it creates receives a fresh [`NodeId`]; spans are synthetic.

use crate::ast::*;
use crate::{Span, Type};

#[derive(Debug, Default)]
pub struct AstBuilder {
    next_id: u32,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        Expr::new(id, kind, Span::default())
    }

    // ── Primaries ────────────────────────────────────────────────────────

    pub fn int(&mut self, value: i64) -> Expr {
        self.expr(ExprKind::Literal(Literal::Int(value)))
    }

    pub fn float(&mut self, value: f64) -> Expr {
        self.expr(ExprKind::Literal(Literal::Float(value)))
    }

    pub fn string(&mut self, value: &str) -> Expr {
        self.expr(ExprKind::Literal(Literal::Str(value.to_string())))
    }

    pub fn boolean(&mut self, value: bool) -> Expr {
        self.expr(ExprKind::Literal(Literal::Bool(value)))
    }

    pub fn duration(&mut self, nanos: i64) -> Expr {
        self.expr(ExprKind::Literal(Literal::Duration(nanos)))
    }

    pub fn ident(&mut self, name: &str) -> Expr {
        self.expr(ExprKind::Ident(name.to_string()))
    }

    pub fn paren(&mut self, inner: Expr) -> Expr {
        self.expr(ExprKind::Paren(Box::new(inner)))
    }

    pub fn cast(&mut self, target: Type, inner: Expr) -> Expr {
        self.expr(ExprKind::Cast {
            target,
            expr: Box::new(inner),
        })
    }

    pub fn call(&mut self, callee: &str, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call {
            callee: Ident::new(callee, Span::default()),
            args,
        })
    }

    pub fn index(&mut self, target: Expr, index: Expr) -> Expr {
        self.expr(ExprKind::Index {
            target: Box::new(target),
            index: Box::new(index),
        })
    }

    pub fn slice(&mut self, target: Expr, start: Option<Expr>, end: Option<Expr>) -> Expr {
        self.expr(ExprKind::Slice {
            target: Box::new(target),
            start: start.map(Box::new),
            end: end.map(Box::new),
        })
    }

    pub fn series(&mut self, elems: Vec<Expr>) -> Expr {
        self.expr(ExprKind::SeriesLit(elems))
    }

    // ── Operators ────────────────────────────────────────────────────────

    pub fn binary(&mut self, lhs: Expr, op: BinOp, rhs: Expr) -> Expr {
        self.chain(lhs, vec![(op, rhs)])
    }

    /// `lhs op1 rhs1 op2 rhs2 ...` at a single precedence level.
    pub fn chain(&mut self, lhs: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
        self.expr(ExprKind::Binary {
            lhs: Box::new(lhs),
            rest,
        })
    }

    pub fn and(&mut self, operands: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Logical {
            op: LogicalOp::And,
            operands,
        })
    }

    pub fn or(&mut self, operands: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Logical {
            op: LogicalOp::Or,
            operands,
        })
    }

    pub fn neg(&mut self, operand: Expr) -> Expr {
        self.expr(ExprKind::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        })
    }

    pub fn not(&mut self, operand: Expr) -> Expr {
        self.expr(ExprKind::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        })
    }

    pub fn pow(&mut self, base: Expr, exponent: Expr) -> Expr {
        self.expr(ExprKind::Power {
            base: Box::new(base),
            exponent: Box::new(exponent),
        })
    }

    // ── Statements ───────────────────────────────────────────────────────

    pub fn var(&mut self, name: &str, init: Expr) -> Stmt {
        Stmt::VarDecl(VarDecl {
            name: Ident::new(name, Span::default()),
            ty: None,
            init,
            stateful: false,
            span: Span::default(),
        })
    }

    pub fn typed_var(&mut self, name: &str, ty: Type, init: Expr) -> Stmt {
        Stmt::VarDecl(VarDecl {
            name: Ident::new(name, Span::default()),
            ty: Some(ty),
            init,
            stateful: false,
            span: Span::default(),
        })
    }

    pub fn stateful(&mut self, name: &str, ty: Option<Type>, init: Expr) -> Stmt {
        Stmt::VarDecl(VarDecl {
            name: Ident::new(name, Span::default()),
            ty,
            init,
            stateful: true,
            span: Span::default(),
        })
    }

    pub fn assign(&mut self, target: &str, op: AssignOp, value: Expr) -> Stmt {
        Stmt::Assign(Assign {
            target: Ident::new(target, Span::default()),
            index: None,
            op,
            value,
            span: Span::default(),
        })
    }

    pub fn assign_index(&mut self, target: &str, index: Expr, op: AssignOp, value: Expr) -> Stmt {
        Stmt::Assign(Assign {
            target: Ident::new(target, Span::default()),
            index: Some(index),
            op,
            value,
            span: Span::default(),
        })
    }

    pub fn if_else(
        &mut self,
        condition: Expr,
        then_block: Vec<Stmt>,
        else_ifs: Vec<(Expr, Vec<Stmt>)>,
        else_block: Option<Vec<Stmt>>,
    ) -> Stmt {
        Stmt::If(IfStmt {
            condition,
            then_block: Block::new(then_block),
            else_ifs: else_ifs
                .into_iter()
                .map(|(cond, body)| (cond, Block::new(body)))
                .collect(),
            else_block: else_block.map(Block::new),
            span: Span::default(),
        })
    }

    pub fn loop_stmt(&mut self, kind: LoopKind, body: Vec<Stmt>) -> Stmt {
        Stmt::Loop(LoopStmt {
            kind,
            body: Block::new(body),
            span: Span::default(),
        })
    }

    pub fn range(
        &mut self,
        var: &str,
        start: Option<Expr>,
        end: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
    ) -> Stmt {
        let kind = LoopKind::Range {
            var: Ident::new(var, Span::default()),
            start,
            end,
            step,
        };
        self.loop_stmt(kind, body)
    }

    pub fn ret(&mut self, value: Option<Expr>) -> Stmt {
        Stmt::Return(ReturnStmt {
            value,
            span: Span::default(),
        })
    }

    // ── Items ────────────────────────────────────────────────────────────

    pub fn function(
        &mut self,
        name: &str,
        params: Vec<Param>,
        outputs: Outputs,
        body: Vec<Stmt>,
    ) -> Item {
        Item::Function(FunctionDecl {
            name: Ident::new(name, Span::default()),
            config: Vec::new(),
            params,
            outputs,
            body: Block::new(body),
            span: Span::default(),
        })
    }

    pub fn task(&mut self, name: &str, trigger: Trigger, body: Vec<Stmt>) -> Item {
        Item::Task(TaskDecl {
            name: Ident::new(name, Span::default()),
            trigger,
            body: Block::new(body),
            span: Span::default(),
        })
    }
}

impl Program {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            span: Span::default(),
        }
    }
}
