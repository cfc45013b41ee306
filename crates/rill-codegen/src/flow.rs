//! Structured control flow: conditionals, the four loop forms, and
//! `break`/`continue`.
//!
//! Every loop lowers to the same skeleton:
//!
//! ```text
//! block                 ;; break target
//!   loop                ;; repeat target
//!     <exit test>       ;; br_if 1 when the loop is done
//!     block             ;; continue target
//!       <body>
//!     end
//!     <advance>         ;; step / index increment
//!     br 0
//!   end
//! end
//! ```
//!
//! Branch targets are recorded as writer depths on entry, so a `br` from any
//! nesting level computes its label as `current depth - recorded depth`.

use rill_types::ast::*;
use rill_types::{SymbolKind, Type};
use wasm_encoder::{BlockType, Instruction, ValType};

use crate::compiler::{FuncContext, LoopTarget};
use crate::error::{CodegenError, CodegenResult};
use crate::expr;
use crate::imports::HostFn;
use crate::resolve;
use crate::stmt;
use crate::writer::Writer;

// ══════════════════════════════════════════════════════════════════════════════
// Conditionals
// ══════════════════════════════════════════════════════════════════════════════

/// `if / else if / else` as nested `if ... else ... end` blocks.
///
/// The chain diverges only when it ends in `else` and every branch
/// diverges; an `unreachable` then follows so the code after it validates
/// regardless of the enclosing block type.
pub fn compile_if(stmt: &IfStmt, ctx: &mut FuncContext, w: &mut Writer) -> CodegenResult<bool> {
    let branches: Vec<(&Expr, &Block)> = std::iter::once((&stmt.condition, &stmt.then_block))
        .chain(stmt.else_ifs.iter().map(|(cond, block)| (cond, block)))
        .collect();
    let diverged = compile_branches(&branches, stmt.else_block.as_ref(), ctx, w)?;
    if diverged {
        w.instruction(&Instruction::Unreachable);
    }
    Ok(diverged)
}

fn compile_branches(
    branches: &[(&Expr, &Block)],
    else_block: Option<&Block>,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<bool> {
    let Some(((condition, then_block), rest)) = branches.split_first() else {
        return match else_block {
            Some(block) => stmt::compile_block(block, ctx, w),
            None => Ok(false),
        };
    };

    let ty = expr::compile_expr(condition, None, ctx, w)?;
    resolve::emit_condition(&ty, w)?;
    w.instruction(&Instruction::If(BlockType::Empty));
    let then_diverged = stmt::compile_block(then_block, ctx, w)?;
    let else_diverged = if rest.is_empty() && else_block.is_none() {
        false
    } else {
        w.instruction(&Instruction::Else);
        compile_branches(rest, else_block, ctx, w)?
    };
    w.instruction(&Instruction::End);
    Ok(then_diverged && else_diverged)
}

// ══════════════════════════════════════════════════════════════════════════════
// Loops
// ══════════════════════════════════════════════════════════════════════════════

/// Compile any loop form. Loop variables live in a scope around the loop.
pub fn compile_loop(stmt: &LoopStmt, ctx: &mut FuncContext, w: &mut Writer) -> CodegenResult<()> {
    let saved = ctx.enter_scope();
    let result = match &stmt.kind {
        LoopKind::Forever => compile_forever(&stmt.body, ctx, w),
        LoopKind::While(condition) => compile_while(condition, &stmt.body, ctx, w),
        LoopKind::Range {
            var,
            start,
            end,
            step,
        } => compile_range(var, start.as_ref(), end, step.as_ref(), &stmt.body, ctx, w),
        LoopKind::Each { index, item, seq } => {
            compile_each(index.as_ref(), item, seq, &stmt.body, ctx, w)
        }
    };
    ctx.exit_scope(saved);
    result
}

fn compile_forever(body: &Block, ctx: &mut FuncContext, w: &mut Writer) -> CodegenResult<()> {
    let break_depth = begin_loop(w);
    emit_body(body, break_depth, ctx, w)?;
    end_loop(w);
    Ok(())
}

/// The condition is tested before each iteration.
fn compile_while(
    condition: &Expr,
    body: &Block,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<()> {
    let break_depth = begin_loop(w);
    let ty = expr::compile_expr(condition, None, ctx, w)?;
    resolve::emit_condition(&ty, w)?;
    exit_if_zero(break_depth, w);
    emit_body(body, break_depth, ctx, w)?;
    end_loop(w);
    Ok(())
}

/// How a range loop advances.
enum Step<'e> {
    /// No step given: ascend by one.
    Unit,
    /// A literal step whose sign is known at compile time.
    Constant { expr: &'e Expr, descending: bool },
    /// A computed step held in a local; its sign is tested every iteration.
    Dynamic(u32),
}

/// `for var in start..end step s`. The end bound is exclusive and is
/// evaluated once; bounds are evaluated in source order.
fn compile_range(
    var: &Ident,
    start: Option<&Expr>,
    end: &Expr,
    step: Option<&Expr>,
    body: &Block,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<()> {
    let ty = range_type(start, end, ctx);
    if !ty.is_numeric() {
        return Err(CodegenError::TypeMismatch {
            context: "range bound",
            expected: Type::I64,
            found: ty,
        });
    }

    match start {
        Some(start) => expr::compile_expr_as(start, &ty, ctx, w)?,
        None => {
            w.instruction(&resolve::zero(&ty));
        }
    }
    let end_local = ctx.alloc_temp(&ty)?;
    expr::compile_expr_as(end, &ty, ctx, w)?;
    w.instruction(&Instruction::LocalSet(end_local));

    let step = match step {
        None => Step::Unit,
        Some(e) => match literal_sign(e) {
            Some(negative) => Step::Constant {
                expr: e,
                descending: negative,
            },
            None => {
                let local = ctx.alloc_temp(&ty)?;
                expr::compile_expr_as(e, &ty, ctx, w)?;
                w.instruction(&Instruction::LocalSet(local));
                Step::Dynamic(local)
            }
        },
    };

    let counter = ctx.declare_local(&var.name, SymbolKind::Variable, ty.clone())?;
    w.instruction(&Instruction::LocalSet(counter));

    let break_depth = begin_loop(w);

    // Exit test.
    match &step {
        Step::Unit => emit_bound_check(counter, end_local, BinOp::Lt, &ty, w)?,
        Step::Constant { descending, .. } => {
            let op = if *descending { BinOp::Gt } else { BinOp::Lt };
            emit_bound_check(counter, end_local, op, &ty, w)?;
        }
        Step::Dynamic(step_local) => {
            w.instruction(&Instruction::LocalGet(*step_local));
            w.instruction(&resolve::zero(&ty));
            w.instruction(&resolve::binary(BinOp::Gt, &ty)?);
            w.instruction(&Instruction::If(BlockType::Result(ValType::I32)));
            emit_bound_check(counter, end_local, BinOp::Lt, &ty, w)?;
            w.instruction(&Instruction::Else);
            emit_bound_check(counter, end_local, BinOp::Gt, &ty, w)?;
            w.instruction(&Instruction::End);
        }
    }
    exit_if_zero(break_depth, w);

    emit_body(body, break_depth, ctx, w)?;

    // Advance.
    w.instruction(&Instruction::LocalGet(counter));
    match &step {
        Step::Unit => {
            w.instruction(&resolve::constant(&ty, 1));
        }
        Step::Constant { expr: e, .. } => expr::compile_expr_as(e, &ty, ctx, w)?,
        Step::Dynamic(step_local) => {
            w.instruction(&Instruction::LocalGet(*step_local));
        }
    }
    w.instruction(&resolve::binary(BinOp::Add, &ty)?);
    w.instruction(&Instruction::LocalSet(counter));

    end_loop(w);
    Ok(())
}

/// The counter type: the analyzer's type for the end bound, else whatever
/// the bounds say on their own, else `i64`.
fn range_type(start: Option<&Expr>, end: &Expr, ctx: &FuncContext) -> Type {
    ctx.types
        .get(end.id)
        .cloned()
        .or_else(|| expr::static_type(end, ctx))
        .or_else(|| start.and_then(|s| expr::static_type(s, ctx)))
        .unwrap_or(Type::I64)
}

/// Sign of a numeric literal, looking through parentheses and negation.
/// `Some(true)` means negative.
fn literal_sign(e: &Expr) -> Option<bool> {
    match &e.kind {
        ExprKind::Literal(Literal::Int(v)) => Some(*v < 0),
        ExprKind::Literal(Literal::Float(v)) => Some(*v < 0.0),
        ExprKind::Paren(inner) => literal_sign(inner),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => literal_sign(operand).map(|negative| !negative),
        _ => None,
    }
}

fn emit_bound_check(
    counter: u32,
    end: u32,
    op: BinOp,
    ty: &Type,
    w: &mut Writer,
) -> CodegenResult<()> {
    w.instruction(&Instruction::LocalGet(counter));
    w.instruction(&Instruction::LocalGet(end));
    w.instruction(&resolve::binary(op, ty)?);
    Ok(())
}

/// `for [index,] item in seq`: the length is read once before the loop and
/// each element is fetched at the top of the iteration.
fn compile_each(
    index: Option<&Ident>,
    item: &Ident,
    seq: &Expr,
    body: &Block,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<()> {
    let seq_ty = expr::compile_expr(seq, None, ctx, w)?;
    let elem = match &seq_ty {
        Type::Series(elem) => elem.as_ref().clone(),
        other => {
            return Err(CodegenError::TypeMismatch {
                context: "loop sequence",
                expected: Type::series(Type::I64),
                found: other.clone(),
            })
        }
    };

    let handle = ctx.alloc_temp(&seq_ty)?;
    w.instruction(&Instruction::LocalSet(handle));

    let len = ctx.alloc_temp(&Type::I64)?;
    w.instruction(&Instruction::LocalGet(handle));
    let series_len = ctx.import(HostFn::SeriesLen)?;
    w.instruction(&Instruction::Call(series_len));
    w.instruction(&Instruction::LocalSet(len));

    let counter = match index {
        Some(ident) => ctx.declare_local(&ident.name, SymbolKind::Variable, Type::I64)?,
        None => ctx.alloc_temp(&Type::I64)?,
    };
    w.instruction(&Instruction::I64Const(0));
    w.instruction(&Instruction::LocalSet(counter));
    let item_slot = ctx.declare_local(&item.name, SymbolKind::Variable, elem.clone())?;

    let break_depth = begin_loop(w);
    emit_bound_check(counter, len, BinOp::Lt, &Type::I64, w)?;
    exit_if_zero(break_depth, w);

    w.instruction(&Instruction::LocalGet(handle));
    w.instruction(&Instruction::LocalGet(counter));
    w.instruction(&Instruction::I32WrapI64);
    let get = ctx.import(HostFn::SeriesIndex(elem))?;
    w.instruction(&Instruction::Call(get));
    w.instruction(&Instruction::LocalSet(item_slot));

    emit_body(body, break_depth, ctx, w)?;

    w.instruction(&Instruction::LocalGet(counter));
    w.instruction(&Instruction::I64Const(1));
    w.instruction(&Instruction::I64Add);
    w.instruction(&Instruction::LocalSet(counter));

    end_loop(w);
    Ok(())
}

// ── Loop skeleton ────────────────────────────────────────────────────────────

/// Open the break block and the repeat loop; returns the break depth.
fn begin_loop(w: &mut Writer) -> u32 {
    w.instruction(&Instruction::Block(BlockType::Empty));
    let break_depth = w.depth();
    w.instruction(&Instruction::Loop(BlockType::Empty));
    break_depth
}

/// Leave the loop when the i32 on the stack is zero.
fn exit_if_zero(break_depth: u32, w: &mut Writer) {
    w.instruction(&Instruction::I32Eqz);
    let label = w.depth() - break_depth;
    w.instruction(&Instruction::BrIf(label));
}

/// The body inside its continue block, with the loop's targets active.
fn emit_body(
    body: &Block,
    break_depth: u32,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<()> {
    w.instruction(&Instruction::Block(BlockType::Empty));
    ctx.push_loop(LoopTarget {
        break_depth,
        continue_depth: w.depth(),
    });
    let result = stmt::compile_block(body, ctx, w);
    ctx.pop_loop();
    result?;
    w.instruction(&Instruction::End);
    Ok(())
}

fn end_loop(w: &mut Writer) {
    w.instruction(&Instruction::Br(0));
    w.instruction(&Instruction::End);
    w.instruction(&Instruction::End);
}

// ══════════════════════════════════════════════════════════════════════════════
// Break / continue
// ══════════════════════════════════════════════════════════════════════════════

pub fn compile_break(ctx: &FuncContext, w: &mut Writer) -> CodegenResult<()> {
    let target = ctx.current_loop().ok_or(CodegenError::OutsideLoop("break"))?;
    let label = w.depth() - target.break_depth;
    w.instruction(&Instruction::Br(label));
    Ok(())
}

pub fn compile_continue(ctx: &FuncContext, w: &mut Writer) -> CodegenResult<()> {
    let target = ctx.current_loop().ok_or(CodegenError::OutsideLoop("continue"))?;
    let label = w.depth() - target.continue_depth;
    w.instruction(&Instruction::Br(label));
    Ok(())
}
