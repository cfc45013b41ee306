//! Expression code generation.
//!
//! Every expression leaves exactly one value on the WASM operand stack and
//! reports its semantic [`Type`]. Compilation is driven by an optional type
//! hint flowing down from the context (declared type, parameter type, cast
//! target, or the left operand of a binary operator); only literals consult
//! it, everything else has an intrinsic type.
//!
//! Literal typing priority: explicit hint, then the analyzer's [`TypeMap`]
//! entry for the node, then the default (`i64` for integers, `f64` for
//! floats).
//!
//! [`TypeMap`]: rill_types::TypeMap

use rill_types::ast::*;
use rill_types::{SymbolKind, Type};
use wasm_encoder::{BlockType, Instruction, ValType};

use crate::compiler::FuncContext;
use crate::error::{CodegenError, CodegenResult};
use crate::imports::{HostFn, SeriesOperands};
use crate::layout::{Returns, UnitKind};
use crate::resolve;
use crate::writer::Writer;

/// Emit instructions for an expression. Leaves one value on the stack.
pub fn compile_expr(
    expr: &Expr,
    hint: Option<&Type>,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Type> {
    match &expr.kind {
        ExprKind::Logical { op, operands } => compile_logical(*op, operands, ctx, w),
        ExprKind::Binary { lhs, rest } => compile_binary(lhs, rest, hint, ctx, w),
        ExprKind::Power { base, exponent } => compile_power(base, exponent, hint, ctx, w),
        ExprKind::Unary { op, operand } => compile_unary(*op, operand, hint, ctx, w),
        ExprKind::Call { callee, args } => match compile_call(callee, args, ctx, w)? {
            Some(ty) => Ok(ty),
            None => Err(CodegenError::Unsupported(format!(
                "`{}` produces no value",
                callee.name
            ))),
        },
        ExprKind::Index { target, index } => compile_index(target, index, ctx, w),
        ExprKind::Slice { target, start, end } => {
            compile_slice(target, start.as_deref(), end.as_deref(), ctx, w)
        }
        ExprKind::Literal(lit) => compile_literal(lit, expr.id, hint, ctx, w),
        ExprKind::Ident(name) => compile_ident(name, ctx, w),
        ExprKind::Paren(inner) => compile_expr(inner, hint, ctx, w),
        ExprKind::Cast { target, expr: inner } => {
            let from = compile_expr(inner, Some(target), ctx, w)?;
            resolve::emit_cast(&from, target, w)?;
            Ok(target.clone())
        }
        ExprKind::SeriesLit(elems) => compile_series_literal(expr.id, elems, hint, ctx, w),
    }
}

/// Compile `expr` and convert the result to `ty`.
pub fn compile_expr_as(
    expr: &Expr,
    ty: &Type,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<()> {
    let actual = compile_expr(expr, Some(ty), ctx, w)?;
    if actual.is_handle() && actual != *ty {
        return Err(CodegenError::TypeMismatch {
            context: "conversion",
            expected: ty.clone(),
            found: actual,
        });
    }
    resolve::emit_cast(&actual, ty, w)
}

// ══════════════════════════════════════════════════════════════════════════════
// Logical operators
// ══════════════════════════════════════════════════════════════════════════════

/// `a && b && ...` / `a || b || ...` with short-circuit evaluation.
///
/// Each operand is normalized to 0/1. For `&&` the next operand sits in the
/// `then` arm of the previous one's test, for `||` in the `else` arm, so a
/// chain nests one `if` per extra operand.
fn compile_logical(
    op: LogicalOp,
    operands: &[Expr],
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Type> {
    let (first, rest) = operands.split_first().ok_or(CodegenError::EmptyExpression(match op {
        LogicalOp::And => "logical and",
        LogicalOp::Or => "logical or",
    }))?;
    if rest.is_empty() {
        return compile_expr(first, None, ctx, w);
    }

    let ty = compile_expr(first, None, ctx, w)?;
    resolve::emit_ne_zero(&ty, w)?;
    emit_short_circuit(op, rest, ctx, w)?;
    Ok(Type::BOOL)
}

/// Combine the 0/1 on the stack with the remaining operands.
fn emit_short_circuit(
    op: LogicalOp,
    operands: &[Expr],
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<()> {
    let Some((next, rest)) = operands.split_first() else {
        return Ok(());
    };
    w.instruction(&Instruction::If(BlockType::Result(ValType::I32)));
    if op == LogicalOp::Or {
        w.instruction(&Instruction::I32Const(1));
        w.instruction(&Instruction::Else);
    }
    let ty = compile_expr(next, None, ctx, w)?;
    resolve::emit_ne_zero(&ty, w)?;
    emit_short_circuit(op, rest, ctx, w)?;
    if op == LogicalOp::And {
        w.instruction(&Instruction::Else);
        w.instruction(&Instruction::I32Const(0));
    }
    w.instruction(&Instruction::End);
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Binary operators
// ══════════════════════════════════════════════════════════════════════════════

/// A left-to-right chain of operators sharing one precedence level.
fn compile_binary(
    lhs: &Expr,
    rest: &[(BinOp, Expr)],
    hint: Option<&Type>,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Type> {
    let Some((first_op, first_rhs)) = rest.first() else {
        return compile_expr(lhs, hint, ctx, w);
    };
    let level = first_op.precedence();
    if let Some((op, _)) = rest.iter().find(|(op, _)| op.precedence() != level) {
        return Err(CodegenError::Internal(format!(
            "operator `{}` mixed into a {level:?} chain",
            op.as_str()
        )));
    }

    // Comparisons yield booleans, so the outer hint says nothing about the
    // operands.
    let mut lhs_hint = if first_op.is_comparison() { None } else { hint.cloned() };
    // A scalar in front of a series takes the element type.
    if let Some(Type::Series(elem)) = static_type(first_rhs, ctx) {
        if !static_type(lhs, ctx).is_some_and(|t| t.is_series()) {
            lhs_hint = Some(*elem);
        }
    }
    let mut acc = compile_expr(lhs, lhs_hint.as_ref(), ctx, w)?;
    for (op, rhs) in rest {
        let right = compile_expr(rhs, Some(&acc), ctx, w)?;
        acc = emit_binary_op(*op, &acc, right, ctx, w)?;
    }
    Ok(acc)
}

/// Combine the two values on the stack with `op`.
///
/// The right operand is converted to the left operand's type when both are
/// numeric. Strings and series dispatch to host imports.
pub fn emit_binary_op(
    op: BinOp,
    left: &Type,
    right: Type,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Type> {
    match (left, &right) {
        (Type::Series(_), _) | (_, Type::Series(_)) => emit_series_op(op, left, &right, ctx, w),
        (Type::Str, Type::Str) => emit_string_op(op, ctx, w),
        (Type::Str, other) | (other, Type::Str) => Err(CodegenError::TypeMismatch {
            context: "string operation",
            expected: Type::Str,
            found: other.clone(),
        }),
        _ => {
            resolve::emit_cast(&right, left, w)?;
            w.instruction(&resolve::binary(op, left)?);
            Ok(if op.is_comparison() {
                Type::BOOL
            } else {
                left.clone()
            })
        }
    }
}

fn emit_string_op(op: BinOp, ctx: &mut FuncContext, w: &mut Writer) -> CodegenResult<Type> {
    match op {
        BinOp::Add => {
            let f = ctx.import(HostFn::StringConcat)?;
            w.instruction(&Instruction::Call(f));
            Ok(Type::Str)
        }
        BinOp::Eq | BinOp::Ne => {
            let f = ctx.import(HostFn::StringEqual)?;
            w.instruction(&Instruction::Call(f));
            if op == BinOp::Ne {
                w.instruction(&Instruction::I32Eqz);
            }
            Ok(Type::BOOL)
        }
        _ => Err(CodegenError::UnknownOperator {
            op: op.as_str(),
            ty: Type::Str,
        }),
    }
}

/// Element-wise arithmetic or comparison where at least one side is a series.
fn emit_series_op(
    op: BinOp,
    left: &Type,
    right: &Type,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Type> {
    let (operands, elem) = match (left, right) {
        (Type::Series(a), Type::Series(b)) => {
            if a != b {
                return Err(CodegenError::TypeMismatch {
                    context: "series operation",
                    expected: left.clone(),
                    found: right.clone(),
                });
            }
            (SeriesOperands::SeriesSeries, a.as_ref().clone())
        }
        (Type::Series(a), scalar) => {
            resolve::emit_cast(scalar, a, w)?;
            (SeriesOperands::SeriesScalar, a.as_ref().clone())
        }
        (scalar, Type::Series(b)) => {
            if scalar != b.as_ref() {
                // The series is on top; park it while the scalar converts.
                let handle = ctx.alloc_temp(right)?;
                w.instruction(&Instruction::LocalSet(handle));
                resolve::emit_cast(scalar, b, w)?;
                w.instruction(&Instruction::LocalGet(handle));
            }
            (SeriesOperands::ScalarSeries, b.as_ref().clone())
        }
        _ => {
            return Err(CodegenError::Internal(
                "series operation without a series operand".into(),
            ))
        }
    };
    if !elem.is_numeric() {
        return Err(CodegenError::UnknownOperator {
            op: op.as_str(),
            ty: Type::series(elem),
        });
    }

    if op.is_comparison() {
        if operands == SeriesOperands::ScalarSeries {
            return Err(CodegenError::Unsupported(format!(
                "scalar on the left of series comparison `{}`",
                op.as_str()
            )));
        }
        let f = ctx.import(HostFn::SeriesCompare(op, operands, elem))?;
        w.instruction(&Instruction::Call(f));
        return Ok(Type::series(Type::BOOL));
    }

    if op == BinOp::Rem && elem.is_float() {
        return Err(CodegenError::FloatRemainder(elem));
    }
    let f = ctx.import(HostFn::SeriesArith(op, operands, elem.clone()))?;
    w.instruction(&Instruction::Call(f));
    Ok(Type::series(elem))
}

/// `base ^ exponent` through the host's power function for the base type.
fn compile_power(
    base: &Expr,
    exponent: &Expr,
    hint: Option<&Type>,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Type> {
    let ty = compile_expr(base, hint, ctx, w)?;
    if !ty.is_numeric() {
        return Err(CodegenError::UnknownOperator { op: "^", ty });
    }
    compile_expr_as(exponent, &ty, ctx, w)?;
    let f = ctx.import(HostFn::MathPow(ty.clone()))?;
    w.instruction(&Instruction::Call(f));
    Ok(ty)
}

// ══════════════════════════════════════════════════════════════════════════════
// Unary operators
// ══════════════════════════════════════════════════════════════════════════════

fn compile_unary(
    op: UnaryOp,
    operand: &Expr,
    hint: Option<&Type>,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Type> {
    match op {
        UnaryOp::Neg => {
            let ty = compile_expr(operand, hint, ctx, w)?;
            match &ty {
                Type::Series(elem) if elem.is_numeric() => {
                    let f = ctx.import(HostFn::SeriesNegate(elem.as_ref().clone()))?;
                    w.instruction(&Instruction::Call(f));
                }
                t if t.is_numeric() => {
                    w.instruction(&resolve::constant(t, -1));
                    w.instruction(&resolve::binary(BinOp::Mul, t)?);
                }
                _ => {
                    return Err(CodegenError::UnknownOperator {
                        op: "-",
                        ty: ty.clone(),
                    })
                }
            }
            Ok(ty)
        }
        UnaryOp::Not => {
            let ty = compile_expr(operand, None, ctx, w)?;
            match &ty {
                Type::Series(elem) if **elem == Type::BOOL => {
                    let f = ctx.import(HostFn::SeriesNot)?;
                    w.instruction(&Instruction::Call(f));
                    Ok(ty)
                }
                t if t.is_numeric() => {
                    resolve::emit_eqz(t, w)?;
                    Ok(Type::BOOL)
                }
                _ => Err(CodegenError::UnknownOperator {
                    op: "!",
                    ty: ty.clone(),
                }),
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Postfix: calls, indexing, slicing
// ══════════════════════════════════════════════════════════════════════════════

/// A call to a local function or builtin. Returns `None` when the callee
/// leaves nothing on the stack.
pub fn compile_call(
    callee: &Ident,
    args: &[Expr],
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Option<Type>> {
    let functions = ctx.functions;
    let Some(entry) = functions.get(&callee.name) else {
        return compile_builtin(callee, args, ctx, w).map(Some);
    };
    if entry.kind == UnitKind::Task {
        return Err(CodegenError::Unsupported(format!(
            "task `{}` cannot be called",
            callee.name
        )));
    }
    let params: Vec<&Param> = entry.all_params().collect();
    // Everything up to the last parameter without a default must be passed.
    let required = params
        .iter()
        .rposition(|p| p.default.is_none())
        .map_or(0, |i| i + 1);
    if args.len() < required || args.len() > params.len() {
        return Err(CodegenError::Unsupported(format!(
            "`{}` expects {} to {} arguments, found {}",
            callee.name,
            required,
            params.len(),
            args.len()
        )));
    }
    for (i, param) in params.iter().enumerate() {
        match (args.get(i), &param.default) {
            (Some(arg), _) => compile_expr_as(arg, &param.ty, ctx, w)?,
            (None, Some(value)) => emit_default(value, &param.ty, ctx, w)?,
            (None, None) => {
                return Err(CodegenError::Internal(format!(
                    "no value for parameter `{}`",
                    param.name.name
                )))
            }
        }
    }
    w.instruction(&Instruction::Call(ctx.function_index(entry)));
    Ok(match &entry.returns {
        Returns::Value(ty) => Some(ty.clone()),
        Returns::Void | Returns::Outputs(_) => None,
    })
}

fn compile_builtin(
    callee: &Ident,
    args: &[Expr],
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Type> {
    match (callee.name.as_str(), args) {
        ("len", [arg]) => {
            let ty = compile_expr(arg, None, ctx, w)?;
            let (f, result) = match ty {
                Type::Series(_) => (HostFn::SeriesLen, Type::I64),
                Type::Str => (HostFn::StringLen, Type::I32),
                other => {
                    return Err(CodegenError::Unsupported(format!("len of {other}")));
                }
            };
            let f = ctx.import(f)?;
            w.instruction(&Instruction::Call(f));
            Ok(result)
        }
        ("now", []) => {
            let f = ctx.import(HostFn::Now)?;
            w.instruction(&Instruction::Call(f));
            Ok(Type::TimeStamp)
        }
        ("len" | "now", _) => Err(CodegenError::Unsupported(format!(
            "wrong number of arguments to `{}`",
            callee.name
        ))),
        _ => Err(CodegenError::UnresolvedSymbol(callee.name.clone())),
    }
}

fn compile_index(
    target: &Expr,
    index: &Expr,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Type> {
    let ty = compile_expr(target, None, ctx, w)?;
    let elem = match ty {
        Type::Series(elem) => *elem,
        other => return Err(CodegenError::Unsupported(format!("indexing into {other}"))),
    };
    compile_expr_as(index, &Type::I32, ctx, w)?;
    let f = ctx.import(HostFn::SeriesIndex(elem.clone()))?;
    w.instruction(&Instruction::Call(f));
    Ok(elem)
}

fn compile_slice(
    target: &Expr,
    start: Option<&Expr>,
    end: Option<&Expr>,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Type> {
    let ty = compile_expr(target, None, ctx, w)?;
    if !ty.is_series() {
        return Err(CodegenError::Unsupported(format!("slicing {ty}")));
    }
    match start {
        Some(e) => compile_expr_as(e, &Type::I32, ctx, w)?,
        None => {
            w.instruction(&Instruction::I32Const(0));
        }
    }
    match end {
        Some(e) => compile_expr_as(e, &Type::I32, ctx, w)?,
        // Up to the last element.
        None => {
            w.instruction(&Instruction::I32Const(-1));
        }
    }
    let f = ctx.import(HostFn::SeriesSlice)?;
    w.instruction(&Instruction::Call(f));
    Ok(ty)
}

// ══════════════════════════════════════════════════════════════════════════════
// Primaries
// ══════════════════════════════════════════════════════════════════════════════

/// The type a literal takes: hint, then analyzer, then `default`.
fn literal_type(id: NodeId, hint: Option<&Type>, ctx: &FuncContext, default: Type) -> Type {
    hint.or_else(|| ctx.types.get(id))
        .map(|t| t.element().clone())
        .filter(Type::is_numeric)
        .unwrap_or(default)
}

fn compile_literal(
    lit: &Literal,
    id: NodeId,
    hint: Option<&Type>,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Type> {
    let ty = match lit {
        Literal::Int(_) => literal_type(id, hint, ctx, Type::I64),
        Literal::Float(_) => literal_type(id, hint, ctx, Type::F64),
        other => intrinsic_type(other),
    };
    emit_literal(lit, &ty, ctx, w)?;
    Ok(ty)
}

/// The type a literal has without any context.
fn intrinsic_type(lit: &Literal) -> Type {
    match lit {
        Literal::Int(_) => Type::I64,
        Literal::Float(_) => Type::F64,
        Literal::Str(_) => Type::Str,
        Literal::Bool(_) => Type::BOOL,
        Literal::Duration(_) => Type::TimeSpan,
    }
}

/// Push `lit`. Numbers are encoded at `ty`'s width.
fn emit_literal(
    lit: &Literal,
    ty: &Type,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<()> {
    match lit {
        Literal::Int(v) => {
            w.instruction(&numeric_const(*v as f64, *v, ty));
        }
        Literal::Float(v) => {
            w.instruction(&numeric_const(*v, *v as i64, ty));
        }
        Literal::Bool(b) => {
            w.instruction(&Instruction::I32Const(*b as i32));
        }
        Literal::Duration(nanos) => {
            w.instruction(&Instruction::I64Const(*nanos));
        }
        Literal::Str(s) => {
            let (ptr, len) = ctx.intern(s);
            w.instruction(&Instruction::I32Const(ptr as i32));
            w.instruction(&Instruction::I32Const(len as i32));
            let f = ctx.import(HostFn::StringFromLiteral)?;
            w.instruction(&Instruction::Call(f));
        }
    }
    Ok(())
}

/// A parameter's default value, converted to the parameter type.
fn emit_default(
    value: &Literal,
    ty: &Type,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<()> {
    let own = match value {
        Literal::Int(_) | Literal::Float(_) if !ty.is_handle() => ty.clone(),
        other => intrinsic_type(other),
    };
    if own.is_handle() != ty.is_handle() || (own.is_handle() && own != *ty) {
        return Err(CodegenError::TypeMismatch {
            context: "default value",
            expected: ty.clone(),
            found: own,
        });
    }
    emit_literal(value, &own, ctx, w)?;
    resolve::emit_cast(&own, ty, w)
}

/// A constant of `ty`: floats take `float`, integers take `int` truncated to
/// the type's width.
fn numeric_const(float: f64, int: i64, ty: &Type) -> Instruction<'static> {
    match ty {
        Type::F32 => Instruction::F32Const(float as f32),
        Type::F64 => Instruction::F64Const(float),
        Type::I8 => Instruction::I32Const(int as i8 as i32),
        Type::I16 => Instruction::I32Const(int as i16 as i32),
        Type::U8 => Instruction::I32Const(int as u8 as i32),
        Type::U16 => Instruction::I32Const(int as u16 as i32),
        Type::I32 | Type::U32 => Instruction::I32Const(int as i32),
        _ => Instruction::I64Const(int),
    }
}

pub fn compile_ident(name: &str, ctx: &mut FuncContext, w: &mut Writer) -> CodegenResult<Type> {
    let sym = ctx.lookup(name)?;
    match sym.kind {
        SymbolKind::Variable | SymbolKind::Parameter | SymbolKind::Config => {
            w.instruction(&Instruction::LocalGet(sym.id));
            Ok(sym.ty)
        }
        SymbolKind::StatefulVariable => {
            w.instruction(&Instruction::I32Const(ctx.owner_id as i32));
            w.instruction(&Instruction::I32Const(sym.id as i32));
            w.instruction(&resolve::zero(&sym.ty));
            let f = ctx.import(HostFn::StateLoad(sym.ty.clone()))?;
            w.instruction(&Instruction::Call(f));
            Ok(sym.ty)
        }
        SymbolKind::Channel => {
            let elem = sym.ty.element().clone();
            w.instruction(&Instruction::I32Const(sym.id as i32));
            let f = ctx.import(HostFn::ChannelRead(elem.clone()))?;
            w.instruction(&Instruction::Call(f));
            Ok(elem)
        }
        SymbolKind::Output => {
            let (layout, slot) = ctx.output(name)?;
            let address = layout.address(slot);
            w.instruction(&Instruction::I32Const(address as i32));
            w.instruction(&resolve::load(&sym.ty, 0));
            Ok(sym.ty)
        }
        SymbolKind::Function | SymbolKind::Task => Err(CodegenError::Unsupported(format!(
            "`{name}` used as a value"
        ))),
    }
}

/// `[a, b, c]`: create an empty series, then set each element in order. The
/// setter returns the handle, so the chain needs no temporaries.
fn compile_series_literal(
    id: NodeId,
    elems: &[Expr],
    hint: Option<&Type>,
    ctx: &mut FuncContext,
    w: &mut Writer,
) -> CodegenResult<Type> {
    let from_context = [hint, ctx.types.get(id)]
        .into_iter()
        .flatten()
        .find_map(|t| match t {
            Type::Series(elem) => Some(elem.as_ref().clone()),
            _ => None,
        });
    let elem = match from_context {
        Some(elem) => elem,
        None => literal_element_type(elems, ctx).ok_or_else(|| {
            CodegenError::Unsupported("cannot infer the element type of an empty series".into())
        })?,
    };

    w.instruction(&Instruction::I32Const(elems.len() as i32));
    let create = ctx.import(HostFn::SeriesCreateEmpty(elem.clone()))?;
    w.instruction(&Instruction::Call(create));
    for (i, e) in elems.iter().enumerate() {
        w.instruction(&Instruction::I32Const(i as i32));
        compile_expr_as(e, &elem, ctx, w)?;
        let set = ctx.import(HostFn::SeriesSetElement(elem.clone()))?;
        w.instruction(&Instruction::Call(set));
    }
    Ok(Type::series(elem))
}

/// Element type of a series literal from its elements alone: the first
/// element's type, widened to a float when an integer leads a float.
fn literal_element_type(elems: &[Expr], ctx: &FuncContext) -> Option<Type> {
    let first = static_type(elems.first()?, ctx)?;
    if !first.is_integer() {
        return Some(first);
    }
    let float = elems[1..]
        .iter()
        .filter_map(|e| static_type(e, ctx))
        .find(Type::is_float);
    Some(float.unwrap_or(first))
}

// ══════════════════════════════════════════════════════════════════════════════
// Static typing
// ══════════════════════════════════════════════════════════════════════════════

/// The type `expr` would compile to without a hint, when it can be told
/// without emitting code.
pub fn static_type(expr: &Expr, ctx: &FuncContext) -> Option<Type> {
    if let Some(ty) = ctx.types.get(expr.id) {
        return Some(ty.clone());
    }
    match &expr.kind {
        ExprKind::Literal(Literal::Int(_)) => Some(Type::I64),
        ExprKind::Literal(Literal::Float(_)) => Some(Type::F64),
        ExprKind::Literal(Literal::Str(_)) => Some(Type::Str),
        ExprKind::Literal(Literal::Bool(_)) => Some(Type::BOOL),
        ExprKind::Literal(Literal::Duration(_)) => Some(Type::TimeSpan),
        ExprKind::Ident(name) => {
            let sym = ctx.lookup(name).ok()?;
            match sym.kind {
                SymbolKind::Channel => Some(sym.ty.element().clone()),
                SymbolKind::Function | SymbolKind::Task => None,
                _ => Some(sym.ty),
            }
        }
        ExprKind::Paren(inner) => static_type(inner, ctx),
        ExprKind::Cast { target, .. } => Some(target.clone()),
        ExprKind::Unary { op: UnaryOp::Neg, operand } => static_type(operand, ctx),
        ExprKind::Unary { op: UnaryOp::Not, .. } | ExprKind::Logical { .. } => Some(Type::BOOL),
        ExprKind::Power { base, .. } => static_type(base, ctx),
        ExprKind::Binary { lhs, rest } => match rest.first() {
            Some((op, _)) if op.is_comparison() => Some(Type::BOOL),
            _ => static_type(lhs, ctx),
        },
        ExprKind::Call { callee, .. } => match ctx.functions.get(&callee.name) {
            Some(entry) => match &entry.returns {
                Returns::Value(ty) => Some(ty.clone()),
                _ => None,
            },
            None if callee.name == "now" => Some(Type::TimeStamp),
            None => None,
        },
        ExprKind::Index { target, .. } => match static_type(target, ctx)? {
            Type::Series(elem) => Some(*elem),
            _ => None,
        },
        ExprKind::Slice { target, .. } => static_type(target, ctx),
        ExprKind::SeriesLit(elems) => literal_element_type(elems, ctx).map(Type::series),
    }
}
