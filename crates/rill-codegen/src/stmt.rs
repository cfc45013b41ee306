//! Statement code generation.
//!
//! Statements leave the operand stack as they found it. Each compile
//! function reports whether the statement diverged, i.e. control never
//! reaches the instruction after it; the function-level fallthrough return
//! and the `unreachable` after fully-diverging branch chains depend on it.

use rill_types::ast::*;
use rill_types::{Symbol, SymbolKind, Type};
use wasm_encoder::Instruction;

use crate::compiler::FuncContext;
use crate::error::{CodegenError, CodegenResult};
use crate::expr;
use crate::flow;
use crate::imports::HostFn;
use crate::layout::{OutputLayout, Returns};
use crate::resolve;
use crate::writer::Writer;

/// Emit a sequence of statements in the current scope.
pub fn compile_stmts(stmts: &[Stmt], ctx: &mut FuncContext, w: &mut Writer) -> CodegenResult<bool> {
    let mut diverged = false;
    for stmt in stmts {
        diverged |= compile_stmt(stmt, ctx, w)?;
    }
    Ok(diverged)
}

/// Emit a block under a fresh child scope.
pub fn compile_block(block: &Block, ctx: &mut FuncContext, w: &mut Writer) -> CodegenResult<bool> {
    let saved = ctx.enter_scope();
    let result = compile_stmts(&block.stmts, ctx, w);
    ctx.exit_scope(saved);
    result
}

/// Emit a single statement. Failures carry the statement's span.
pub fn compile_stmt(stmt: &Stmt, ctx: &mut FuncContext, w: &mut Writer) -> CodegenResult<bool> {
    let result = match stmt {
        Stmt::VarDecl(decl) => compile_var_decl(decl, ctx, w).map(|()| false),
        Stmt::Assign(assign) => compile_assign(assign, ctx, w).map(|()| false),
        Stmt::If(if_stmt) => flow::compile_if(if_stmt, ctx, w),
        Stmt::Loop(loop_stmt) => flow::compile_loop(loop_stmt, ctx, w).map(|()| false),
        Stmt::Break(_) => flow::compile_break(ctx, w).map(|()| true),
        Stmt::Continue(_) => flow::compile_continue(ctx, w).map(|()| true),
        Stmt::Return(ret) => compile_return(ret, ctx, w).map(|()| true),
        Stmt::Expr(e) => compile_expr_stmt(e, ctx, w).map(|()| false),
    };
    result.map_err(|e| e.at(stmt.span()))
}

// ══════════════════════════════════════════════════════════════════════════════
// Declarations
// ══════════════════════════════════════════════════════════════════════════════

fn compile_var_decl(decl: &VarDecl, ctx: &mut FuncContext, w: &mut Writer) -> CodegenResult<()> {
    if decl.stateful {
        return compile_stateful_decl(decl, ctx, w);
    }

    // The initializer is compiled before the binding exists, so it sees any
    // outer variable of the same name.
    let ty = match &decl.ty {
        Some(ty) => {
            expr::compile_expr_as(&decl.init, ty, ctx, w)?;
            ty.clone()
        }
        None => expr::compile_expr(&decl.init, None, ctx, w)?,
    };
    let slot = ctx.declare_local(&decl.name.name, SymbolKind::Variable, ty)?;
    w.instruction(&Instruction::LocalSet(slot));
    Ok(())
}

/// `state_load_T(owner, slot, init)` seeds the value on the first activation
/// and returns the persisted one afterwards.
fn compile_stateful_decl(
    decl: &VarDecl,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<()> {
    let ty = match &decl.ty {
        Some(ty) => ty.clone(),
        None => expr::static_type(&decl.init, ctx).ok_or_else(|| {
            CodegenError::Unsupported(format!(
                "cannot infer the type of stateful `{}`",
                decl.name.name
            ))
        })?,
    };
    // As above, the initializer precedes the binding. It is spliced in
    // after the state key.
    let mut init = Writer::new();
    expr::compile_expr_as(&decl.init, &ty, ctx, &mut init)?;
    let slot = ctx.declare_local(&decl.name.name, SymbolKind::StatefulVariable, ty.clone())?;

    w.instruction(&Instruction::I32Const(ctx.owner_id as i32));
    w.instruction(&Instruction::I32Const(slot as i32));
    w.append(init);
    let load = ctx.import(HostFn::StateLoad(ty))?;
    w.instruction(&Instruction::Call(load));
    w.instruction(&Instruction::LocalSet(slot));
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Assignment
// ══════════════════════════════════════════════════════════════════════════════

fn compile_assign(assign: &Assign, ctx: &mut FuncContext, w: &mut Writer) -> CodegenResult<()> {
    let sym = ctx.lookup(&assign.target.name)?;
    if let Some(index) = &assign.index {
        return compile_index_assign(assign, &sym, index, ctx, w);
    }

    match sym.kind {
        SymbolKind::Variable | SymbolKind::Parameter => {
            compile_assigned_value(assign, &sym.ty, ctx, w)?;
            w.instruction(&Instruction::LocalSet(sym.id));
        }
        SymbolKind::StatefulVariable => {
            compile_assigned_value(assign, &sym.ty, ctx, w)?;
            w.instruction(&Instruction::LocalSet(sym.id));
            w.instruction(&Instruction::I32Const(ctx.owner_id as i32));
            w.instruction(&Instruction::I32Const(sym.id as i32));
            w.instruction(&Instruction::LocalGet(sym.id));
            let store = ctx.import(HostFn::StateStore(sym.ty.clone()))?;
            w.instruction(&Instruction::Call(store));
        }
        SymbolKind::Channel => {
            // Key first, so the value lands in argument position.
            let elem = sym.ty.element().clone();
            w.instruction(&Instruction::I32Const(sym.id as i32));
            compile_assigned_value(assign, &elem, ctx, w)?;
            let write = ctx.import(HostFn::ChannelWrite(elem))?;
            w.instruction(&Instruction::Call(write));
        }
        SymbolKind::Output => {
            let (address, bitmap, bit) = {
                let (layout, slot) = ctx.output(&assign.target.name)?;
                (layout.address(slot), layout.bitmap_address(), slot.bit)
            };
            w.instruction(&Instruction::I32Const(address as i32));
            compile_assigned_value(assign, &sym.ty, ctx, w)?;
            w.instruction(&resolve::store(&sym.ty, 0));
            emit_mark_dirty(bitmap, bit, w);
        }
        SymbolKind::Config => {
            return Err(CodegenError::Unsupported(format!(
                "config value `{}` is read-only",
                sym.name
            )))
        }
        SymbolKind::Function | SymbolKind::Task => {
            return Err(CodegenError::Unsupported(format!(
                "cannot assign to `{}`",
                sym.name
            )))
        }
    }
    Ok(())
}

/// Push the value an assignment stores, converted to `ty`. Compound
/// operators read the target's current value first.
fn compile_assigned_value(
    assign: &Assign,
    ty: &Type,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<()> {
    let Some(op) = assign.op.binary() else {
        return expr::compile_expr_as(&assign.value, ty, ctx, w);
    };
    let current = expr::compile_ident(&assign.target.name, ctx, w)?;
    let right = expr::compile_expr(&assign.value, Some(&current), ctx, w)?;
    let result = expr::emit_binary_op(op, &current, right, ctx, w)?;
    resolve::emit_cast(&result, ty, w)
}

/// `s[i] = v` and `s[i] op= v` through `series_set_element`, discarding the
/// returned handle.
fn compile_index_assign(
    assign: &Assign,
    sym: &Symbol,
    index: &Expr,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<()> {
    let series = expr::compile_ident(&sym.name, ctx, w)?;
    let elem = match series {
        Type::Series(elem) => *elem,
        other => {
            return Err(CodegenError::Unsupported(format!(
                "indexed assignment to {other}"
            )))
        }
    };
    expr::compile_expr_as(index, &Type::I32, ctx, w)?;

    match assign.op.binary() {
        None => expr::compile_expr_as(&assign.value, &elem, ctx, w)?,
        Some(op) => {
            let idx = ctx.alloc_temp(&Type::I32)?;
            w.instruction(&Instruction::LocalTee(idx));
            expr::compile_ident(&sym.name, ctx, w)?;
            w.instruction(&Instruction::LocalGet(idx));
            let get = ctx.import(HostFn::SeriesIndex(elem.clone()))?;
            w.instruction(&Instruction::Call(get));
            let right = expr::compile_expr(&assign.value, Some(&elem), ctx, w)?;
            let result = expr::emit_binary_op(op, &elem, right, ctx, w)?;
            resolve::emit_cast(&result, &elem, w)?;
        }
    }

    let set = ctx.import(HostFn::SeriesSetElement(elem))?;
    w.instruction(&Instruction::Call(set));
    w.instruction(&Instruction::Drop);
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Output regions
// ══════════════════════════════════════════════════════════════════════════════

/// Clear the dirty bitmap. Emitted on entry to every multi-output function.
pub fn emit_output_reset(layout: &OutputLayout, w: &mut Writer) {
    w.instruction(&Instruction::I32Const(layout.bitmap_address() as i32));
    w.instruction(&Instruction::I64Const(0));
    w.instruction(&resolve::store(&Type::I64, 0));
}

/// `bitmap |= 1 << bit`
fn emit_mark_dirty(bitmap: u32, bit: u32, w: &mut Writer) {
    w.instruction(&Instruction::I32Const(bitmap as i32));
    w.instruction(&Instruction::I32Const(bitmap as i32));
    w.instruction(&resolve::load(&Type::I64, 0));
    w.instruction(&Instruction::I64Const((1u64 << bit) as i64));
    w.instruction(&Instruction::I64Or);
    w.instruction(&resolve::store(&Type::I64, 0));
}

// ══════════════════════════════════════════════════════════════════════════════
// Return and expression statements
// ══════════════════════════════════════════════════════════════════════════════

fn compile_return(ret: &ReturnStmt, ctx: &mut FuncContext, w: &mut Writer) -> CodegenResult<()> {
    let expected = match &ctx.returns {
        Returns::Value(ty) => Some(ty.clone()),
        Returns::Void | Returns::Outputs(_) => None,
    };
    match (expected, &ret.value) {
        (Some(ty), Some(value)) => expr::compile_expr_as(value, &ty, ctx, w)?,
        (Some(ty), None) => {
            return Err(CodegenError::Unsupported(format!(
                "bare return in a function returning {ty}"
            )))
        }
        (None, Some(_)) => {
            return Err(CodegenError::Unsupported(
                "return with a value in a function without a return type".into(),
            ))
        }
        (None, None) => {}
    }
    w.instruction(&Instruction::Return);
    Ok(())
}

/// The return emitted when control reaches the end of a body. Functions
/// with a return type hand back the zero value.
pub fn emit_fallthrough_return(returns: &Returns, w: &mut Writer) {
    if let Returns::Value(ty) = returns {
        w.instruction(&resolve::zero(ty));
    }
    w.instruction(&Instruction::Return);
}

fn compile_expr_stmt(e: &Expr, ctx: &mut FuncContext, w: &mut Writer) -> CodegenResult<()> {
    let produced = match &e.kind {
        ExprKind::Call { callee, args } => expr::compile_call(callee, args, ctx, w)?.is_some(),
        _ => {
            expr::compile_expr(e, None, ctx, w)?;
            true
        }
    };
    if produced {
        w.instruction(&Instruction::Drop);
    }
    Ok(())
}
