//! Instruction writer.
//!
//! Accumulates the encoded instruction stream of one function body. The
//! writer also counts open structured blocks (`block`, `loop`, `if`) so
//! branch targets can be computed as the distance between the current depth
//! and the depth recorded when a loop was entered.

use wasm_encoder::{Encode, Instruction};

#[derive(Debug, Default)]
pub struct Writer {
    bytes: Vec<u8>,
    depth: u32,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one instruction.
    pub fn instruction(&mut self, insn: &Instruction<'_>) -> &mut Self {
        match insn {
            Instruction::Block(_) | Instruction::Loop(_) | Instruction::If(_) => self.depth += 1,
            Instruction::End => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        insn.encode(&mut self.bytes);
        self
    }

    /// Number of structured blocks currently open.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Append a stream compiled separately. `other` must have closed every
    /// block it opened.
    pub fn append(&mut self, other: Writer) {
        debug_assert_eq!(other.depth, 0);
        self.bytes.extend(other.bytes);
    }
}
