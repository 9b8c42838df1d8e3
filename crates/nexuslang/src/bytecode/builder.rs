//! Builder for emitting bytecode during compilation.
//!
//! `CodeBuilder` encodes opcodes and operands into the raw code stream,
//! manages forward jumps that need patching once their target is known, and
//! records source locations for the optional debug-info section.

use crate::{
    bytecode::{module::DebugEntry, op::Opcode},
    token::CodeLoc,
};

/// Handle for a forward jump whose relative offset is patched later.
#[derive(Debug, Clone, Copy)]
pub struct JumpPatch {
    /// Byte offset of the i16 offset slot inside the code stream.
    operand_at: usize,
}

/// Emits the flat code stream.
///
/// Relative jump offsets are measured from the end of the jump instruction,
/// so `0` falls through and negative values loop backwards.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    code: Vec<u8>,
    locations: Vec<DebugEntry>,
    current_location: Option<CodeLoc>,
}

impl CodeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source location recorded for subsequently emitted
    /// instructions.
    pub fn set_location(&mut self, loc: CodeLoc) {
        self.current_location = Some(loc);
    }

    /// Current offset in the code stream; used as a backward jump target.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    fn start_instruction(&mut self, op: Opcode) {
        if let Some(loc) = self.current_location.take() {
            self.locations.push(DebugEntry {
                offset: self.code.len() as u32,
                line: loc.line,
                col: loc.col,
            });
        }
        self.code.push(op as u8);
    }

    /// Emits a no-operand instruction.
    pub fn emit(&mut self, op: Opcode) {
        self.start_instruction(op);
    }

    /// Emits an instruction with a u16 operand (little-endian).
    pub fn emit_u16(&mut self, op: Opcode, operand: u16) {
        self.start_instruction(op);
        self.code.extend_from_slice(&operand.to_le_bytes());
    }

    /// Emits an instruction with two u8 operands.
    pub fn emit_u8_u8(&mut self, op: Opcode, operand1: u8, operand2: u8) {
        self.start_instruction(op);
        self.code.push(operand1);
        self.code.push(operand2);
    }

    /// Emits an instruction with a u16 operand followed by a u8 operand.
    pub fn emit_u16_u8(&mut self, op: Opcode, operand1: u16, operand2: u8) {
        self.start_instruction(op);
        self.code.extend_from_slice(&operand1.to_le_bytes());
        self.code.push(operand2);
    }

    /// Emits an instruction with two u16 operands.
    pub fn emit_u16_u16(&mut self, op: Opcode, operand1: u16, operand2: u16) {
        self.start_instruction(op);
        self.code.extend_from_slice(&operand1.to_le_bytes());
        self.code.extend_from_slice(&operand2.to_le_bytes());
    }

    /// Emits a forward jump with a placeholder offset.
    pub fn emit_jump(&mut self, op: Opcode) -> JumpPatch {
        self.start_instruction(op);
        let operand_at = self.code.len();
        self.code.extend_from_slice(&0i16.to_le_bytes());
        JumpPatch { operand_at }
    }

    /// Emits `ITER_NEXT bound-sym <exhausted>` with a placeholder offset.
    pub fn emit_iter_next(&mut self, bound_sym: u16) -> JumpPatch {
        self.start_instruction(Opcode::IterNext);
        self.code.extend_from_slice(&bound_sym.to_le_bytes());
        let operand_at = self.code.len();
        self.code.extend_from_slice(&0i16.to_le_bytes());
        JumpPatch { operand_at }
    }

    /// Points a pending forward jump at the current offset.
    ///
    /// # Panics
    /// Panics when the jump distance exceeds i16 range; the nesting-depth
    /// guard in the parser keeps real programs far below that.
    pub fn patch_jump(&mut self, patch: JumpPatch) {
        let from = patch.operand_at + 2;
        let distance = self.code.len() - from;
        let distance = i16::try_from(distance).expect("forward jump distance exceeds i16 range");
        self.code[patch.operand_at..patch.operand_at + 2].copy_from_slice(&distance.to_le_bytes());
    }

    /// Emits a backward jump to an already-emitted offset.
    ///
    /// # Panics
    /// Panics when the jump distance exceeds i16 range.
    pub fn emit_jump_back(&mut self, op: Opcode, target: usize) {
        self.start_instruction(op);
        let from = self.code.len() + 2;
        let distance = i64::try_from(target).unwrap_or(0) - i64::try_from(from).unwrap_or(0);
        let distance = i16::try_from(distance).expect("backward jump distance exceeds i16 range");
        self.code.extend_from_slice(&distance.to_le_bytes());
    }

    /// Finishes the stream, returning the code bytes and location table.
    #[must_use]
    pub fn build(self) -> (Vec<u8>, Vec<DebugEntry>) {
        (self.code, self.locations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_jump_patching() {
        let mut builder = CodeBuilder::new();
        let jump = builder.emit_jump(Opcode::JumpIfFalse);
        builder.emit(Opcode::Pop);
        builder.patch_jump(jump);
        let (code, _) = builder.build();
        // JUMP_IF_FALSE skips the single POP byte.
        assert_eq!(code, vec![Opcode::JumpIfFalse as u8, 0x01, 0x00, Opcode::Pop as u8]);
    }

    #[test]
    fn backward_jump_targets_loop_head() {
        let mut builder = CodeBuilder::new();
        let head = builder.offset();
        builder.emit(Opcode::Pop);
        builder.emit_jump_back(Opcode::Jump, head);
        let (code, _) = builder.build();
        // Offset is relative to the end of the JUMP instruction: -4 bytes.
        assert_eq!(code, vec![Opcode::Pop as u8, Opcode::Jump as u8, 0xFC, 0xFF]);
    }

    #[test]
    fn locations_attach_to_the_next_instruction() {
        let mut builder = CodeBuilder::new();
        builder.set_location(CodeLoc::new(3, 7));
        builder.emit_u16(Opcode::LoadConst, 0);
        builder.emit(Opcode::Pop);
        let (_, locations) = builder.build();
        assert_eq!(locations.len(), 1);
        assert_eq!((locations[0].offset, locations[0].line, locations[0].col), (0, 3, 7));
    }
}
