//! Opcode resolution.
//!
//! Maps (operator, operand type) to exactly one WASM instruction, and
//! (source type, target type) to at most one conversion instruction. The
//! tables are keyed by machine representation plus signedness; signedness
//! only matters for division, remainder, ordering comparisons and
//! conversions that cross the integer/float line or widen an integer.

use rill_types::ast::BinOp;
use rill_types::Type;
use wasm_encoder::{Instruction, MemArg};

use crate::error::{CodegenError, CodegenResult};
use crate::types::MachineType;
use crate::writer::Writer;

// ══════════════════════════════════════════════════════════════════════════════
// Binary operators
// ══════════════════════════════════════════════════════════════════════════════

/// The instruction implementing `op` on two operands of type `ty`.
pub fn binary(op: BinOp, ty: &Type) -> CodegenResult<Instruction<'static>> {
    use Instruction as I;
    use MachineType::*;

    if !ty.is_numeric() {
        return Err(CodegenError::UnknownOperator {
            op: op.as_str(),
            ty: ty.clone(),
        });
    }
    let unsigned = ty.is_unsigned();
    let insn = match (op, MachineType::of(ty)) {
        (BinOp::Add, I32) => I::I32Add,
        (BinOp::Add, I64) => I::I64Add,
        (BinOp::Add, F32) => I::F32Add,
        (BinOp::Add, F64) => I::F64Add,

        (BinOp::Sub, I32) => I::I32Sub,
        (BinOp::Sub, I64) => I::I64Sub,
        (BinOp::Sub, F32) => I::F32Sub,
        (BinOp::Sub, F64) => I::F64Sub,

        (BinOp::Mul, I32) => I::I32Mul,
        (BinOp::Mul, I64) => I::I64Mul,
        (BinOp::Mul, F32) => I::F32Mul,
        (BinOp::Mul, F64) => I::F64Mul,

        (BinOp::Div, I32) if unsigned => I::I32DivU,
        (BinOp::Div, I32) => I::I32DivS,
        (BinOp::Div, I64) if unsigned => I::I64DivU,
        (BinOp::Div, I64) => I::I64DivS,
        (BinOp::Div, F32) => I::F32Div,
        (BinOp::Div, F64) => I::F64Div,

        (BinOp::Rem, I32) if unsigned => I::I32RemU,
        (BinOp::Rem, I32) => I::I32RemS,
        (BinOp::Rem, I64) if unsigned => I::I64RemU,
        (BinOp::Rem, I64) => I::I64RemS,
        (BinOp::Rem, F32 | F64) => return Err(CodegenError::FloatRemainder(ty.clone())),

        (BinOp::Eq, I32) => I::I32Eq,
        (BinOp::Eq, I64) => I::I64Eq,
        (BinOp::Eq, F32) => I::F32Eq,
        (BinOp::Eq, F64) => I::F64Eq,

        (BinOp::Ne, I32) => I::I32Ne,
        (BinOp::Ne, I64) => I::I64Ne,
        (BinOp::Ne, F32) => I::F32Ne,
        (BinOp::Ne, F64) => I::F64Ne,

        (BinOp::Lt, I32) if unsigned => I::I32LtU,
        (BinOp::Lt, I32) => I::I32LtS,
        (BinOp::Lt, I64) if unsigned => I::I64LtU,
        (BinOp::Lt, I64) => I::I64LtS,
        (BinOp::Lt, F32) => I::F32Lt,
        (BinOp::Lt, F64) => I::F64Lt,

        (BinOp::Le, I32) if unsigned => I::I32LeU,
        (BinOp::Le, I32) => I::I32LeS,
        (BinOp::Le, I64) if unsigned => I::I64LeU,
        (BinOp::Le, I64) => I::I64LeS,
        (BinOp::Le, F32) => I::F32Le,
        (BinOp::Le, F64) => I::F64Le,

        (BinOp::Gt, I32) if unsigned => I::I32GtU,
        (BinOp::Gt, I32) => I::I32GtS,
        (BinOp::Gt, I64) if unsigned => I::I64GtU,
        (BinOp::Gt, I64) => I::I64GtS,
        (BinOp::Gt, F32) => I::F32Gt,
        (BinOp::Gt, F64) => I::F64Gt,

        (BinOp::Ge, I32) if unsigned => I::I32GeU,
        (BinOp::Ge, I32) => I::I32GeS,
        (BinOp::Ge, I64) if unsigned => I::I64GeU,
        (BinOp::Ge, I64) => I::I64GeS,
        (BinOp::Ge, F32) => I::F32Ge,
        (BinOp::Ge, F64) => I::F64Ge,
    };
    Ok(insn)
}

// ══════════════════════════════════════════════════════════════════════════════
// Casts
// ══════════════════════════════════════════════════════════════════════════════

/// The conversion from `from` to `to`, or `None` when both share a
/// representation.
///
/// Integer to float uses the source's signedness, float to integer the
/// target's, and widening zero-extends unsigned sources.
pub fn cast(from: &Type, to: &Type) -> CodegenResult<Option<Instruction<'static>>> {
    use Instruction as I;
    use MachineType::*;

    if !(from.is_numeric() && to.is_numeric()) {
        if from == to {
            return Ok(None);
        }
        return Err(CodegenError::InvalidCast {
            from: from.clone(),
            to: to.clone(),
        });
    }
    let src_unsigned = from.is_unsigned();
    let dst_unsigned = to.is_unsigned();
    let insn = match (MachineType::of(from), MachineType::of(to)) {
        (a, b) if a == b => return Ok(None),

        (I32, I64) if src_unsigned => I::I64ExtendI32U,
        (I32, I64) => I::I64ExtendI32S,
        (I64, I32) => I::I32WrapI64,

        (I32, F32) if src_unsigned => I::F32ConvertI32U,
        (I32, F32) => I::F32ConvertI32S,
        (I32, F64) if src_unsigned => I::F64ConvertI32U,
        (I32, F64) => I::F64ConvertI32S,
        (I64, F32) if src_unsigned => I::F32ConvertI64U,
        (I64, F32) => I::F32ConvertI64S,
        (I64, F64) if src_unsigned => I::F64ConvertI64U,
        (I64, F64) => I::F64ConvertI64S,

        (F32, I32) if dst_unsigned => I::I32TruncF32U,
        (F32, I32) => I::I32TruncF32S,
        (F64, I32) if dst_unsigned => I::I32TruncF64U,
        (F64, I32) => I::I32TruncF64S,
        (F32, I64) if dst_unsigned => I::I64TruncF32U,
        (F32, I64) => I::I64TruncF32S,
        (F64, I64) if dst_unsigned => I::I64TruncF64U,
        (F64, I64) => I::I64TruncF64S,

        (F32, F64) => I::F64PromoteF32,
        (F64, F32) => I::F32DemoteF64,

        (a, b) => {
            return Err(CodegenError::Internal(format!(
                "no conversion between {a:?} and {b:?}"
            )))
        }
    };
    Ok(Some(insn))
}

/// Emit the conversion from `from` to `to`, if any.
pub fn emit_cast(from: &Type, to: &Type, w: &mut Writer) -> CodegenResult<()> {
    if let Some(insn) = cast(from, to)? {
        w.instruction(&insn);
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Constants and tests against zero
// ══════════════════════════════════════════════════════════════════════════════

/// The zero value of `ty`'s representation.
pub fn zero(ty: &Type) -> Instruction<'static> {
    constant(ty, 0)
}

/// `value` as a constant of `ty`'s representation.
pub fn constant(ty: &Type, value: i64) -> Instruction<'static> {
    match MachineType::of(ty) {
        MachineType::I32 => Instruction::I32Const(value as i32),
        MachineType::I64 => Instruction::I64Const(value),
        MachineType::F32 => Instruction::F32Const(value as f32),
        MachineType::F64 => Instruction::F64Const(value as f64),
    }
}

/// Replace the value on the stack with 1 when it is zero, else 0.
pub fn emit_eqz(ty: &Type, w: &mut Writer) -> CodegenResult<()> {
    match MachineType::of(ty) {
        MachineType::I32 => w.instruction(&Instruction::I32Eqz),
        MachineType::I64 => w.instruction(&Instruction::I64Eqz),
        MachineType::F32 | MachineType::F64 => {
            w.instruction(&zero(ty));
            w.instruction(&binary(BinOp::Eq, ty)?)
        }
    };
    Ok(())
}

/// Replace the value on the stack with 1 when it is non-zero, else 0.
pub fn emit_ne_zero(ty: &Type, w: &mut Writer) -> CodegenResult<()> {
    w.instruction(&zero(ty));
    w.instruction(&binary(BinOp::Ne, ty)?);
    Ok(())
}

/// Make the value on the stack usable as an i32 branch condition.
pub fn emit_condition(ty: &Type, w: &mut Writer) -> CodegenResult<()> {
    if MachineType::of(ty) != MachineType::I32 {
        emit_ne_zero(ty, w)?;
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Memory access
// ══════════════════════════════════════════════════════════════════════════════

fn memarg(offset: u64, width: u32) -> MemArg {
    MemArg {
        offset,
        align: width.trailing_zeros(),
        memory_index: 0,
    }
}

pub fn load(ty: &Type, offset: u64) -> Instruction<'static> {
    let m = MachineType::of(ty);
    let arg = memarg(offset, m.width());
    match m {
        MachineType::I32 => Instruction::I32Load(arg),
        MachineType::I64 => Instruction::I64Load(arg),
        MachineType::F32 => Instruction::F32Load(arg),
        MachineType::F64 => Instruction::F64Load(arg),
    }
}

pub fn store(ty: &Type, offset: u64) -> Instruction<'static> {
    let m = MachineType::of(ty);
    let arg = memarg(offset, m.width());
    match m {
        MachineType::I32 => Instruction::I32Store(arg),
        MachineType::I64 => Instruction::I64Store(arg),
        MachineType::F32 => Instruction::F32Store(arg),
        MachineType::F64 => Instruction::F64Store(arg),
    }
}
