//! Variable-width instruction decoding.
//!
//! Every compiled function picks three widths independently: slot indices
//! (1, 2 or 4 bytes), jump targets (2 or 4) and constant ids (2 or 4). A
//! decoder strategy is chosen once per function from its slot width; the ip
//! and constant widths are carried as parameters. All operands are
//! little-endian.

use std::fmt;

use anyhow::{Result, bail, ensure};

use super::opcode::{Opcode, OperandKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodingWidths {
    pub slot: u8,
    pub ip: u8,
    pub konst: u8,
}

impl Default for EncodingWidths {
    fn default() -> Self {
        Self::COMPACT
    }
}

impl EncodingWidths {
    pub const COMPACT: EncodingWidths = EncodingWidths { slot: 1, ip: 2, konst: 2 };
    pub const WIDE: EncodingWidths = EncodingWidths { slot: 4, ip: 4, konst: 4 };

    pub const fn new(slot: u8, ip: u8, konst: u8) -> Self {
        Self { slot, ip, konst }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            matches!(self.slot, 1 | 2 | 4),
            "invalid slot width {} (expected 1, 2 or 4)",
            self.slot
        );
        ensure!(matches!(self.ip, 2 | 4), "invalid ip width {} (expected 2 or 4)", self.ip);
        ensure!(
            matches!(self.konst, 2 | 4),
            "invalid constant width {} (expected 2 or 4)",
            self.konst
        );
        Ok(())
    }

    /// Narrowest widths able to address `slots` slots, `code_len` bytes of code
    /// and `consts` constants.
    pub fn fit(slots: usize, code_len: usize, consts: usize) -> Self {
        let slot = if slots <= 0x100 {
            1
        } else if slots <= 0x1_0000 {
            2
        } else {
            4
        };
        // a jump may target the end of the code
        let ip = if code_len <= 0xFFFF { 2 } else { 4 };
        let konst = if consts <= 0x1_0000 { 2 } else { 4 };
        Self { slot, ip, konst }
    }

    #[inline]
    pub fn width_of(&self, kind: OperandKind) -> u8 {
        match kind {
            OperandKind::Slot | OperandKind::Count => self.slot,
            OperandKind::Ip => self.ip,
            OperandKind::Const | OperandKind::Id => self.konst,
        }
    }

    /// Largest value an operand of `kind` may hold.
    pub fn max_value(&self, kind: OperandKind) -> u32 {
        match (kind, self.width_of(kind)) {
            (_, 1) => 0xFF,
            (_, 2) => 0xFFFF,
            // 4-byte slot space is capped at 2^31 - 1
            (OperandKind::Slot | OperandKind::Count, _) => i32::MAX as u32,
            _ => u32::MAX,
        }
    }

    /// Encoded size of an instruction, opcode byte included.
    pub fn instr_len(&self, opcode: Opcode) -> usize {
        1 + opcode
            .operands()
            .iter()
            .map(|kind| self.width_of(*kind) as usize)
            .sum::<usize>()
    }
}

impl fmt::Display for EncodingWidths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}/ip{}/k{}", self.slot, self.ip, self.konst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnknownOpcode { offset: usize, byte: u8 },
    Truncated { offset: usize, needed: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownOpcode { offset, byte } => {
                write!(f, "unknown opcode 0x{:02x} at offset {}", byte, offset)
            }
            DecodeError::Truncated { offset, needed } => {
                write!(f, "truncated operand at offset {} ({} bytes needed)", offset, needed)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

#[inline(always)]
fn read_le(code: &[u8], ip: &mut usize, width: u8) -> Result<u32, DecodeError> {
    let start = *ip;
    let end = start + width as usize;
    let bytes = code.get(start..end).ok_or(DecodeError::Truncated {
        offset: start,
        needed: width as usize,
    })?;
    let value = match *bytes {
        [b0] => b0 as u32,
        [b0, b1] => u16::from_le_bytes([b0, b1]) as u32,
        [b0, b1, b2, b3] => u32::from_le_bytes([b0, b1, b2, b3]),
        _ => bytes
            .iter()
            .rev()
            .fold(0u32, |acc, b| (acc << 8) | *b as u32),
    };
    *ip = end;
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Slot(u32),
    Const(u32),
    Ip(u32),
    Count(u32),
    Id(u32),
}

impl Operand {
    #[inline]
    pub fn new(kind: OperandKind, value: u32) -> Self {
        match kind {
            OperandKind::Slot => Operand::Slot(value),
            OperandKind::Const => Operand::Const(value),
            OperandKind::Ip => Operand::Ip(value),
            OperandKind::Count => Operand::Count(value),
            OperandKind::Id => Operand::Id(value),
        }
    }

    #[inline]
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Slot(_) => OperandKind::Slot,
            Operand::Const(_) => OperandKind::Const,
            Operand::Ip(_) => OperandKind::Ip,
            Operand::Count(_) => OperandKind::Count,
            Operand::Id(_) => OperandKind::Id,
        }
    }

    #[inline]
    pub fn value(&self) -> u32 {
        match *self {
            Operand::Slot(v) | Operand::Const(v) | Operand::Ip(v) | Operand::Count(v) | Operand::Id(v) => v,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind().prefix(), self.value())
    }
}

pub const MAX_OPERANDS: usize = 5;

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub offset: usize,
    pub opcode: Opcode,
    pub next: usize,
    operands: [Operand; MAX_OPERANDS],
    len: u8,
}

impl Instr {
    #[inline]
    pub fn operands(&self) -> &[Operand] {
        &self.operands[..self.len as usize]
    }

    #[inline]
    pub fn operand(&self, idx: usize) -> Option<u32> {
        self.operands().get(idx).map(Operand::value)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.next - self.offset
    }
}

/// Decoder strategy. Implementations differ in how they read slot indices.
pub trait Decode {
    fn widths(&self) -> EncodingWidths;

    fn read_slot(&self, code: &[u8], ip: &mut usize) -> Result<u32, DecodeError>;

    #[inline]
    fn read_opcode(&self, code: &[u8], ip: &mut usize) -> Result<Opcode, DecodeError> {
        let offset = *ip;
        let byte = *code.get(offset).ok_or(DecodeError::Truncated { offset, needed: 1 })?;
        let op = Opcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode { offset, byte })?;
        *ip = offset + 1;
        Ok(op)
    }

    #[inline]
    fn read_const_id(&self, code: &[u8], ip: &mut usize) -> Result<u32, DecodeError> {
        read_le(code, ip, self.widths().konst)
    }

    #[inline]
    fn read_ip(&self, code: &[u8], ip: &mut usize) -> Result<u32, DecodeError> {
        read_le(code, ip, self.widths().ip)
    }

    #[inline]
    fn read_count(&self, code: &[u8], ip: &mut usize) -> Result<u32, DecodeError> {
        self.read_slot(code, ip)
    }

    #[inline]
    fn read_operand(&self, kind: OperandKind, code: &[u8], ip: &mut usize) -> Result<Operand, DecodeError> {
        let value = match kind {
            OperandKind::Slot => self.read_slot(code, ip)?,
            OperandKind::Count => self.read_count(code, ip)?,
            OperandKind::Ip => self.read_ip(code, ip)?,
            OperandKind::Const | OperandKind::Id => self.read_const_id(code, ip)?,
        };
        Ok(Operand::new(kind, value))
    }

    fn decode_instr(&self, code: &[u8], offset: usize) -> Result<Instr, DecodeError> {
        let mut ip = offset;
        let opcode = self.read_opcode(code, &mut ip)?;
        let mut operands = [Operand::Slot(0); MAX_OPERANDS];
        let kinds = opcode.operands();
        for (slot, kind) in operands.iter_mut().zip(kinds) {
            *slot = self.read_operand(*kind, code, &mut ip)?;
        }
        Ok(Instr {
            offset,
            opcode,
            next: ip,
            operands,
            len: kinds.len() as u8,
        })
    }

    fn instrs<'a>(&'a self, code: &'a [u8]) -> Instrs<'a, Self>
    where
        Self: Sized,
    {
        Instrs {
            decoder: self,
            code,
            ip: 0,
            failed: false,
        }
    }
}

/// 1-byte slot indices: up to 255 locals + args.
#[derive(Debug, Clone, Copy)]
pub struct Slot8Decoder {
    ip: u8,
    konst: u8,
}

/// 2-byte slot indices: up to 65535 locals + args.
#[derive(Debug, Clone, Copy)]
pub struct Slot16Decoder {
    ip: u8,
    konst: u8,
}

/// 4-byte slot indices.
#[derive(Debug, Clone, Copy)]
pub struct Slot32Decoder {
    ip: u8,
    konst: u8,
}

impl Decode for Slot8Decoder {
    #[inline]
    fn widths(&self) -> EncodingWidths {
        EncodingWidths::new(1, self.ip, self.konst)
    }

    #[inline(always)]
    fn read_slot(&self, code: &[u8], ip: &mut usize) -> Result<u32, DecodeError> {
        let offset = *ip;
        let byte = *code.get(offset).ok_or(DecodeError::Truncated { offset, needed: 1 })?;
        *ip = offset + 1;
        Ok(byte as u32)
    }
}

impl Decode for Slot16Decoder {
    #[inline]
    fn widths(&self) -> EncodingWidths {
        EncodingWidths::new(2, self.ip, self.konst)
    }

    #[inline(always)]
    fn read_slot(&self, code: &[u8], ip: &mut usize) -> Result<u32, DecodeError> {
        let offset = *ip;
        match code.get(offset..offset + 2) {
            Some(&[lo, hi]) => {
                *ip = offset + 2;
                Ok(u16::from_le_bytes([lo, hi]) as u32)
            }
            _ => Err(DecodeError::Truncated { offset, needed: 2 }),
        }
    }
}

impl Decode for Slot32Decoder {
    #[inline]
    fn widths(&self) -> EncodingWidths {
        EncodingWidths::new(4, self.ip, self.konst)
    }

    #[inline(always)]
    fn read_slot(&self, code: &[u8], ip: &mut usize) -> Result<u32, DecodeError> {
        let offset = *ip;
        match code.get(offset..offset + 4) {
            Some(&[b0, b1, b2, b3]) => {
                *ip = offset + 4;
                Ok(u32::from_le_bytes([b0, b1, b2, b3]))
            }
            _ => Err(DecodeError::Truncated { offset, needed: 4 }),
        }
    }
}

/// Decoder selected at runtime from a function's widths.
#[derive(Debug, Clone, Copy)]
pub enum AnyDecoder {
    Slot8(Slot8Decoder),
    Slot16(Slot16Decoder),
    Slot32(Slot32Decoder),
}

impl AnyDecoder {
    /// Select the decoder for `widths`, rejecting widths outside the encoding.
    pub fn for_widths(widths: EncodingWidths) -> Result<Self> {
        let (ip, konst) = (widths.ip, widths.konst);
        let decoder = match widths.slot {
            1 => AnyDecoder::Slot8(Slot8Decoder { ip, konst }),
            2 => AnyDecoder::Slot16(Slot16Decoder { ip, konst }),
            4 => AnyDecoder::Slot32(Slot32Decoder { ip, konst }),
            other => bail!("no decoder for slot width {}", other),
        };
        widths.validate()?;
        Ok(decoder)
    }
}

impl Decode for AnyDecoder {
    #[inline]
    fn widths(&self) -> EncodingWidths {
        match self {
            AnyDecoder::Slot8(d) => d.widths(),
            AnyDecoder::Slot16(d) => d.widths(),
            AnyDecoder::Slot32(d) => d.widths(),
        }
    }

    #[inline]
    fn read_slot(&self, code: &[u8], ip: &mut usize) -> Result<u32, DecodeError> {
        match self {
            AnyDecoder::Slot8(d) => d.read_slot(code, ip),
            AnyDecoder::Slot16(d) => d.read_slot(code, ip),
            AnyDecoder::Slot32(d) => d.read_slot(code, ip),
        }
    }
}

/// Linear walk over a code buffer. Yields one error and then stops.
pub struct Instrs<'a, D: Decode> {
    decoder: &'a D,
    code: &'a [u8],
    ip: usize,
    failed: bool,
}

impl<D: Decode> Iterator for Instrs<'_, D> {
    type Item = Result<Instr, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.ip >= self.code.len() {
            return None;
        }
        match self.decoder.decode_instr(self.code, self.ip) {
            Ok(instr) => {
                self.ip = instr.next;
                Some(Ok(instr))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
