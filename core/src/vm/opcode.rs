//! Opcode set and fixed operand shapes.
//!
//! The encoding carries no length prefix: the shape of each opcode is the only
//! way to know how many operand bytes follow it. [`Opcode::shape`] is therefore
//! shared by the decoders, the builder and the disassembler.

use std::fmt;

/// Kind of one encoded operand. Its byte width comes from the function's
/// [`EncodingWidths`](super::EncodingWidths).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// Frame slot index (slot width).
    Slot,
    /// Constant-pool index (constant width).
    Const,
    /// Absolute jump target in bytes (ip width).
    Ip,
    /// Argument count (slot width).
    Count,
    /// Method/field id, a constant-pool index of the name (constant width).
    Id,
}

impl OperandKind {
    /// Disassembly prefix.
    pub const fn prefix(self) -> &'static str {
        match self {
            OperandKind::Slot => "s",
            OperandKind::Const => "k",
            OperandKind::Ip => "ip",
            OperandKind::Count => "n",
            OperandKind::Id => "#",
        }
    }
}

use OperandKind::{Const, Count, Id, Ip, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    None,
    Slot,
    SlotSlot,
    SlotSlotSlot,
    ConstSlot,
    Ip,
    SlotIp,
    /// method-id, arg-base, arg-count, result
    Call,
    /// receiver, method-id, arg-base, arg-count, result
    VirtualCall,
    /// object, field-id, value
    Field,
    /// statement id, result
    Eval,
}

impl Shape {
    pub const fn operands(self) -> &'static [OperandKind] {
        match self {
            Shape::None => &[],
            Shape::Slot => &[Slot],
            Shape::SlotSlot => &[Slot, Slot],
            Shape::SlotSlotSlot => &[Slot, Slot, Slot],
            Shape::ConstSlot => &[Const, Slot],
            Shape::Ip => &[Ip],
            Shape::SlotIp => &[Slot, Ip],
            Shape::Call => &[Id, Slot, Count, Slot],
            Shape::VirtualCall => &[Slot, Id, Slot, Count, Slot],
            Shape::Field => &[Slot, Id, Slot],
            Shape::Eval => &[Id, Slot],
        }
    }

    #[inline]
    pub const fn arity(self) -> usize {
        self.operands().len()
    }
}

macro_rules! opcodes {
    ($($(#[$doc:meta])* $variant:ident = $mnemonic:literal, $shape:ident;)*) => {
        /// One-byte opcode. Discriminants are dense from zero in declaration order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$doc])* $variant,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }

            pub const fn shape(self) -> Shape {
                match self {
                    $(Opcode::$variant => Shape::$shape,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = "NOP", None;
    RetVoid = "RET_VOID", None;

    MoveObj = "MOVE_OBJ", SlotSlot;
    MoveInt = "MOVE_INT", SlotSlot;
    MoveReal = "MOVE_REAL", SlotSlot;
    MoveBool = "MOVE_BOOL", SlotSlot;
    IntToReal = "INT_TO_REAL", SlotSlot;
    RealToInt = "REAL_TO_INT", SlotSlot;
    BoolToInt = "BOOL_TO_INT", SlotSlot;
    IntToBool = "INT_TO_BOOL", SlotSlot;
    NegInt = "NEG_INT", SlotSlot;
    NegReal = "NEG_REAL", SlotSlot;
    NotBool = "NOT_BOOL", SlotSlot;
    InvInt = "INV_INT", SlotSlot;

    ConstNull = "CONST_NULL", Slot;

    ConstInt = "CONST_INT", ConstSlot;
    ConstReal = "CONST_REAL", ConstSlot;
    ConstBool = "CONST_BOOL", ConstSlot;
    ConstObj = "CONST_OBJ", ConstSlot;

    AddInt = "ADD_INT", SlotSlotSlot;
    SubInt = "SUB_INT", SlotSlotSlot;
    MulInt = "MUL_INT", SlotSlotSlot;
    DivInt = "DIV_INT", SlotSlotSlot;
    ModInt = "MOD_INT", SlotSlotSlot;
    AddReal = "ADD_REAL", SlotSlotSlot;
    SubReal = "SUB_REAL", SlotSlotSlot;
    MulReal = "MUL_REAL", SlotSlotSlot;
    DivReal = "DIV_REAL", SlotSlotSlot;
    ModReal = "MOD_REAL", SlotSlotSlot;
    AndInt = "AND_INT", SlotSlotSlot;
    OrInt = "OR_INT", SlotSlotSlot;
    XorInt = "XOR_INT", SlotSlotSlot;
    ShlInt = "SHL_INT", SlotSlotSlot;
    ShrInt = "SHR_INT", SlotSlotSlot;
    UshrInt = "USHR_INT", SlotSlotSlot;

    CmpEqInt = "CMP_EQ_INT", SlotSlotSlot;
    CmpNeqInt = "CMP_NEQ_INT", SlotSlotSlot;
    CmpLtInt = "CMP_LT_INT", SlotSlotSlot;
    CmpLteInt = "CMP_LTE_INT", SlotSlotSlot;
    CmpGtInt = "CMP_GT_INT", SlotSlotSlot;
    CmpGteInt = "CMP_GTE_INT", SlotSlotSlot;
    CmpEqReal = "CMP_EQ_REAL", SlotSlotSlot;
    CmpNeqReal = "CMP_NEQ_REAL", SlotSlotSlot;
    CmpLtReal = "CMP_LT_REAL", SlotSlotSlot;
    CmpLteReal = "CMP_LTE_REAL", SlotSlotSlot;
    CmpGtReal = "CMP_GT_REAL", SlotSlotSlot;
    CmpGteReal = "CMP_GTE_REAL", SlotSlotSlot;
    CmpEqBool = "CMP_EQ_BOOL", SlotSlotSlot;
    CmpNeqBool = "CMP_NEQ_BOOL", SlotSlotSlot;
    CmpEqIntReal = "CMP_EQ_INT_REAL", SlotSlotSlot;
    CmpEqRealInt = "CMP_EQ_REAL_INT", SlotSlotSlot;
    CmpNeqIntReal = "CMP_NEQ_INT_REAL", SlotSlotSlot;
    CmpNeqRealInt = "CMP_NEQ_REAL_INT", SlotSlotSlot;
    CmpLtIntReal = "CMP_LT_INT_REAL", SlotSlotSlot;
    CmpLtRealInt = "CMP_LT_REAL_INT", SlotSlotSlot;
    CmpLteIntReal = "CMP_LTE_INT_REAL", SlotSlotSlot;
    CmpLteRealInt = "CMP_LTE_REAL_INT", SlotSlotSlot;
    CmpGtIntReal = "CMP_GT_INT_REAL", SlotSlotSlot;
    CmpGtRealInt = "CMP_GT_REAL_INT", SlotSlotSlot;
    CmpGteIntReal = "CMP_GTE_INT_REAL", SlotSlotSlot;
    CmpGteRealInt = "CMP_GTE_REAL_INT", SlotSlotSlot;
    AndBool = "AND_BOOL", SlotSlotSlot;
    OrBool = "OR_BOOL", SlotSlotSlot;

    IncInt = "INC_INT", Slot;
    DecInt = "DEC_INT", Slot;
    Ret = "RET", Slot;

    Jmp = "JMP", Ip;
    JmpIfTrue = "JMP_IF_TRUE", SlotIp;
    JmpIfFalse = "JMP_IF_FALSE", SlotIp;

    CallDirect = "CALL_DIRECT", Call;
    CallFallback = "CALL_FALLBACK", Call;
    CallVirtual = "CALL_VIRTUAL", VirtualCall;

    GetField = "GET_FIELD", Field;
    SetField = "SET_FIELD", Field;
    GetIndex = "GET_INDEX", SlotSlotSlot;
    SetIndex = "SET_INDEX", SlotSlotSlot;

    EvalFallback = "EVAL_FALLBACK", Eval;
}

impl Opcode {
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        Self::ALL.get(byte as usize).copied()
    }

    #[inline]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn operands(self) -> &'static [OperandKind] {
        self.shape().operands()
    }

    pub const fn is_jump(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::JmpIfTrue | Opcode::JmpIfFalse)
    }

    /// Instructions that dispatch through a method call site.
    pub const fn is_dynamic_call(self) -> bool {
        matches!(self, Opcode::CallVirtual)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
