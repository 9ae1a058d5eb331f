use super::*;

const ALL_WIDTHS: [(u8, u8, u8); 12] = [
    (1, 2, 2),
    (1, 2, 4),
    (1, 4, 2),
    (1, 4, 4),
    (2, 2, 2),
    (2, 2, 4),
    (2, 4, 2),
    (2, 4, 4),
    (4, 2, 2),
    (4, 2, 4),
    (4, 4, 2),
    (4, 4, 4),
];

/// Largest operand each kind can carry, so every byte of the field is used.
fn probe_operands(widths: EncodingWidths, op: Opcode) -> Vec<u32> {
    op.operands()
        .iter()
        .enumerate()
        .map(|(i, kind)| widths.max_value(*kind) - i as u32)
        .collect()
}

#[test]
fn test_builder_and_decoder_agree_for_every_width() {
    for (slot, ip, konst) in ALL_WIDTHS {
        let widths = EncodingWidths::new(slot, ip, konst);
        let mut b = CodeBuilder::new(widths).unwrap();
        let mut expected = Vec::new();
        for op in Opcode::ALL {
            let operands = probe_operands(widths, *op);
            let at = b.emit(*op, &operands).unwrap();
            expected.push((at, *op, operands));
        }
        let code = b.finish();

        let decoder = AnyDecoder::for_widths(widths).unwrap();
        assert_eq!(decoder.widths(), widths);
        let decoded: Vec<_> = decoder.instrs(&code).collect::<Result<_, _>>().unwrap();
        assert_eq!(decoded.len(), expected.len(), "{}", widths);
        for (instr, (at, op, operands)) in decoded.iter().zip(&expected) {
            assert_eq!(instr.offset, *at);
            assert_eq!(instr.opcode, *op);
            assert_eq!(instr.size(), widths.instr_len(*op), "{} at {}", op, widths);
            let values: Vec<u32> = instr.operands().iter().map(|o| o.value()).collect();
            assert_eq!(&values, operands, "{} at {}", op, widths);
            let kinds: Vec<OperandKind> = instr.operands().iter().map(|o| o.kind()).collect();
            assert_eq!(kinds, op.operands());
        }
        assert_eq!(decoded.last().map(|i| i.next), Some(code.len()));
    }
}

#[test]
fn test_slot_decoders_read_little_endian() {
    let code = [0x01, 0x02, 0x03, 0x04];
    let mut ip = 0;
    let d8 = AnyDecoder::for_widths(EncodingWidths::new(1, 2, 2)).unwrap();
    assert_eq!(d8.read_slot(&code, &mut ip).unwrap(), 0x01);
    assert_eq!(ip, 1);

    let mut ip = 0;
    let d16 = AnyDecoder::for_widths(EncodingWidths::new(2, 2, 2)).unwrap();
    assert_eq!(d16.read_slot(&code, &mut ip).unwrap(), 0x0201);
    assert_eq!(d16.read_ip(&code, &mut ip).unwrap(), 0x0403);

    let mut ip = 0;
    let d32 = AnyDecoder::for_widths(EncodingWidths::new(4, 4, 4)).unwrap();
    assert_eq!(d32.read_slot(&code, &mut ip).unwrap(), 0x0403_0201);
    assert_eq!(ip, 4);
    let mut ip = 0;
    assert_eq!(d32.read_const_id(&code, &mut ip).unwrap(), 0x0403_0201);
}

#[test]
fn test_count_uses_slot_width_and_id_uses_const_width() {
    let widths = EncodingWidths::new(2, 2, 4);
    let mut b = CodeBuilder::new(widths).unwrap();
    b.emit(Opcode::CallDirect, &[70_000, 1, 2, 3]).unwrap();
    let code = b.finish();
    // opcode + id(4) + slot(2) + count(2) + slot(2)
    assert_eq!(code.len(), 11);
    let instr = AnyDecoder::for_widths(widths).unwrap().decode_instr(&code, 0).unwrap();
    assert_eq!(instr.operand(0), Some(70_000));
    assert_eq!(instr.operand(2), Some(2));
}

#[test]
fn test_unknown_opcode_is_reported() {
    let decoder = AnyDecoder::for_widths(EncodingWidths::COMPACT).unwrap();
    let code = [Opcode::Nop.byte(), 0xEE];
    let results: Vec<_> = decoder.instrs(&code).collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert_eq!(results[1], Err(DecodeError::UnknownOpcode { offset: 1, byte: 0xEE }));
}

#[test]
fn test_truncated_operand_is_reported_once() {
    let decoder = AnyDecoder::for_widths(EncodingWidths::COMPACT).unwrap();
    // JMP wants a 2-byte ip, only one byte follows
    let code = [Opcode::Jmp.byte(), 0x05];
    let results: Vec<_> = decoder.instrs(&code).collect();
    assert_eq!(results, vec![Err(DecodeError::Truncated { offset: 1, needed: 2 })]);
}

#[test]
fn test_decoder_selection_rejects_bad_widths() {
    let err = AnyDecoder::for_widths(EncodingWidths::new(3, 2, 2)).unwrap_err();
    assert!(err.to_string().contains("no decoder for slot width 3"));
    assert!(AnyDecoder::for_widths(EncodingWidths::new(1, 1, 2)).is_err());
    assert!(AnyDecoder::for_widths(EncodingWidths::new(1, 2, 8)).is_err());
}

#[test]
fn test_fit_picks_narrowest_widths() {
    assert_eq!(EncodingWidths::fit(10, 100, 3), EncodingWidths::COMPACT);
    assert_eq!(EncodingWidths::fit(256, 100, 3), EncodingWidths::new(1, 2, 2));
    assert_eq!(EncodingWidths::fit(257, 70_000, 3), EncodingWidths::new(2, 4, 2));
    assert_eq!(EncodingWidths::fit(70_000, 10, 70_000), EncodingWidths::new(4, 2, 4));
}
