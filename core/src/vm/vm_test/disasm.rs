use super::*;

fn sample_fn(widths: EncodingWidths) -> CompiledFunction {
    let mut b = CodeBuilder::new(widths).unwrap();
    b.emit(Opcode::ConstInt, &[0, 1]).unwrap();
    b.emit(Opcode::CallVirtual, &[1, 2, 2, 1, 0]).unwrap();
    let skip = b.emit_jump(Opcode::JmpIfFalse, &[0]).unwrap();
    b.emit(Opcode::IncInt, &[0]).unwrap();
    let end = b.here();
    b.patch_jump(skip, end).unwrap();
    b.emit(Opcode::Ret, &[0]).unwrap();
    CompiledFunction::new(FunctionParts {
        name: "sample".into(),
        local_count: 3,
        scope_slot_count: 1,
        scope_depths: vec![1],
        scope_indices: vec![4],
        scope_names: vec![Some("outer".into())],
        widths,
        consts: vec![Constant::Int(41), Constant::Real(0.25), Constant::str("describe")],
        code: b.finish(),
        ..FunctionParts::default()
    })
    .unwrap()
}

#[test]
fn test_disassemble_compact() {
    let func = sample_fn(EncodingWidths::COMPACT);
    let text = disassemble(&func).unwrap();
    assert_eq!(
        text,
        "0: CONST_INT k0, s1\n\
         4: CALL_VIRTUAL s1, #2, s2, n1, s0\n\
         11: JMP_IF_FALSE s0, ip17\n\
         15: INC_INT s0\n\
         17: RET s0"
    );
}

#[test]
fn test_disassembly_shape_matches_operand_table() {
    for widths in [EncodingWidths::COMPACT, EncodingWidths::new(2, 4, 2), EncodingWidths::WIDE] {
        let mut b = CodeBuilder::new(widths).unwrap();
        for op in Opcode::ALL {
            let operands: Vec<u32> = (0..op.shape().arity() as u32).collect();
            b.emit(*op, &operands).unwrap();
        }
        let code = b.finish();
        let text = disassemble_code(&code, widths).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), Opcode::ALL.len());

        let mut consumed = 0usize;
        for (line, op) in lines.iter().zip(Opcode::ALL) {
            let (offset, rest) = line.split_once(": ").unwrap();
            assert_eq!(offset.parse::<usize>().unwrap(), consumed);
            let mut parts = rest.splitn(2, ' ');
            assert_eq!(parts.next(), Some(op.mnemonic()));
            let tokens = parts.next().map(|ops| ops.split(", ").count()).unwrap_or(0);
            assert_eq!(tokens, op.shape().arity(), "{}", line);
            consumed += widths.instr_len(*op);
        }
        assert_eq!(consumed, code.len());
    }
}

#[test]
fn test_disassemble_operand_prefixes() {
    let widths = EncodingWidths::COMPACT;
    let mut b = CodeBuilder::new(widths).unwrap();
    b.emit(Opcode::CallDirect, &[3, 4, 2, 5]).unwrap();
    b.emit(Opcode::GetField, &[1, 7, 2]).unwrap();
    b.emit(Opcode::EvalFallback, &[0, 6]).unwrap();
    b.emit(Opcode::Jmp, &[0]).unwrap();
    let text = disassemble_code(&b.finish(), widths).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "0: CALL_DIRECT #3, s4, n2, s5");
    assert_eq!(lines[1], "6: GET_FIELD s1, #7, s2");
    assert_eq!(lines[2], "11: EVAL_FALLBACK #0, s6");
    assert_eq!(lines[3], "15: JMP ip0");
}

#[test]
fn test_disassemble_rejects_bad_slot_width() {
    let err = disassemble_code(&[Opcode::Nop.byte()], EncodingWidths::new(3, 2, 2)).unwrap_err();
    let chain = format!("{:#}", err);
    assert!(chain.contains("no decoder for slot width 3"), "{}", chain);
}

#[test]
fn test_disassemble_reports_decode_error_offset() {
    let err = disassemble_code(&[Opcode::Nop.byte(), Opcode::Nop.byte(), 0xFA], EncodingWidths::COMPACT).unwrap_err();
    assert!(err.to_string().contains("unknown opcode 0xfa at offset 2"));

    let err = disassemble_code(&[Opcode::ConstInt.byte(), 0x00], EncodingWidths::COMPACT).unwrap_err();
    assert!(err.to_string().contains("offset 1"));
}

#[test]
fn test_empty_code_disassembles_to_nothing() {
    assert_eq!(disassemble_code(&[], EncodingWidths::WIDE).unwrap(), "");
}

#[test]
fn test_listing_includes_pool_and_scope_slots() {
    let func = sample_fn(EncodingWidths::COMPACT);
    let listing = disassemble_listing(&func).unwrap();
    assert!(listing.starts_with("fn sample locals=3 args=0 widths=s1/ip2/k2\n"));
    assert!(listing.contains("  k0 = int 41\n"));
    assert!(listing.contains("  k1 = real 0.25\n"));
    assert!(listing.contains("  k2 = str \"describe\"\n"));
    assert!(listing.contains("  0: depth=1 index=4 name=outer\n"));
    assert!(listing.ends_with("17: RET s0"));
}
