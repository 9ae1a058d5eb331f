//! Text rendering of compiled code, one instruction per line:
//!
//! ```text
//! 0: CONST_INT k0, s1
//! 4: CALL_VIRTUAL s1, #2, s2, n1, s0
//! ```

use std::fmt::Write as _;

use anyhow::{Context, Result};

use super::bytecode::CompiledFunction;
use super::decode::{AnyDecoder, Decode, EncodingWidths, Instr};

/// Disassemble `func` with the decoder matching its slot width.
pub fn disassemble(func: &CompiledFunction) -> Result<String> {
    render(&func.decoder(), func.code()).with_context(|| format!("disassembling '{}'", func.name()))
}

/// Disassemble a raw code buffer encoded with `widths`.
pub fn disassemble_code(code: &[u8], widths: EncodingWidths) -> Result<String> {
    let decoder = AnyDecoder::for_widths(widths).context("disassembler: inconsistent encoding")?;
    render(&decoder, code)
}

fn render<D: Decode>(decoder: &D, code: &[u8]) -> Result<String> {
    let mut out = String::with_capacity(code.len() * 8);
    let mut count = 0usize;
    for instr in decoder.instrs(code) {
        let instr = instr?;
        if count > 0 {
            out.push('\n');
        }
        write_instr(&mut out, &instr);
        count += 1;
    }
    tracing::trace!(target: "slotvm::disasm", bytes = code.len(), instrs = count, "disassembled");
    Ok(out)
}

/// Append `instr` in listing form, without a trailing newline.
pub fn write_instr(out: &mut String, instr: &Instr) {
    let mut buf = itoa::Buffer::new();
    out.push_str(buf.format(instr.offset));
    out.push_str(": ");
    out.push_str(instr.opcode.mnemonic());
    for (i, operand) in instr.operands().iter().enumerate() {
        out.push_str(if i == 0 { " " } else { ", " });
        out.push_str(operand.kind().prefix());
        out.push_str(buf.format(operand.value()));
    }
}

/// Full listing: header, constant pool, scope slots, then the code.
pub fn disassemble_listing(func: &CompiledFunction) -> Result<String> {
    let mut out = String::new();
    // writes into a String cannot fail
    let _ = writeln!(
        out,
        "fn {} locals={} args={} widths={}",
        func.name(),
        func.local_count(),
        func.arg_count(),
        func.widths()
    );
    if !func.consts().is_empty() {
        out.push_str("consts:\n");
        for (i, konst) in func.consts().iter().enumerate() {
            let _ = writeln!(out, "  k{} = {}", i, konst);
        }
    }
    if !func.scope_slots().is_empty() {
        out.push_str("scope slots:\n");
        for (i, slot) in func.scope_slots().iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}: depth={} index={} name={}",
                i,
                slot.depth,
                slot.index,
                slot.name.unwrap_or("_")
            );
        }
    }
    out.push_str("code:\n");
    out.push_str(&disassemble(func)?);
    Ok(out)
}
