use anyhow::{Result, bail, ensure};

use super::decode::EncodingWidths;
use super::opcode::{Opcode, OperandKind};

/// Pending jump whose target is patched once known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpLabel {
    instr: usize,
    operand_at: usize,
}

impl JumpLabel {
    #[inline]
    pub fn instr_offset(&self) -> usize {
        self.instr
    }
}

/// Emits instructions at fixed encoding widths.
///
/// Every operand is range-checked against its width, so any buffer produced
/// here decodes with the matching decoder.
#[derive(Debug, Clone)]
pub struct CodeBuilder {
    widths: EncodingWidths,
    code: Vec<u8>,
}

impl CodeBuilder {
    pub fn new(widths: EncodingWidths) -> Result<Self> {
        widths.validate()?;
        Ok(Self { widths, code: Vec::new() })
    }

    #[inline]
    pub fn widths(&self) -> EncodingWidths {
        self.widths
    }

    /// Offset the next instruction will be written at.
    #[inline]
    pub fn here(&self) -> usize {
        self.code.len()
    }

    /// Append one instruction, returning its offset.
    pub fn emit(&mut self, opcode: Opcode, operands: &[u32]) -> Result<usize> {
        let kinds = opcode.operands();
        ensure!(
            operands.len() == kinds.len(),
            "{} expects {} operands, got {}",
            opcode,
            kinds.len(),
            operands.len()
        );
        for (kind, value) in kinds.iter().zip(operands) {
            let max = self.widths.max_value(*kind);
            ensure!(
                *value <= max,
                "{} operand {}{} exceeds {}-byte width",
                opcode,
                kind.prefix(),
                value,
                self.widths.width_of(*kind)
            );
        }

        let at = self.code.len();
        self.code.push(opcode.byte());
        for (kind, value) in kinds.iter().zip(operands) {
            self.push_operand(*kind, *value);
        }
        Ok(at)
    }

    /// Emit a jump with a placeholder target. `operands` holds everything
    /// before the trailing ip operand (the condition slot, if any).
    pub fn emit_jump(&mut self, opcode: Opcode, operands: &[u32]) -> Result<JumpLabel> {
        let kinds = opcode.operands();
        if kinds.last() != Some(&OperandKind::Ip) {
            bail!("{} is not a jump", opcode);
        }
        let mut full = operands.to_vec();
        full.push(0);
        let instr = self.emit(opcode, &full)?;
        let operand_at = self.code.len() - self.widths.ip as usize;
        Ok(JumpLabel { instr, operand_at })
    }

    /// Point `label` at `target`.
    pub fn patch_jump(&mut self, label: JumpLabel, target: usize) -> Result<()> {
        let max = self.widths.max_value(OperandKind::Ip) as usize;
        ensure!(target <= max, "jump target {} exceeds {}-byte ip width", target, self.widths.ip);
        let width = self.widths.ip as usize;
        let bytes = (target as u32).to_le_bytes();
        self.code[label.operand_at..label.operand_at + width].copy_from_slice(&bytes[..width]);
        Ok(())
    }

    #[inline]
    fn push_operand(&mut self, kind: OperandKind, value: u32) {
        let width = self.widths.width_of(kind) as usize;
        self.code.extend_from_slice(&value.to_le_bytes()[..width]);
    }

    pub fn finish(self) -> Vec<u8> {
        self.code
    }
}
