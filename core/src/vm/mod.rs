//! Execution core: slot frames, the variable-width instruction encoding,
//! compiled functions, disassembly, and the method-dispatch call-site cache.

mod builder;
mod bytecode;
mod constant;
mod context;
mod decode;
mod disasm;
mod error;
mod frame;
mod opcode;
pub mod pic;

pub use builder::{CodeBuilder, JumpLabel};
pub use bytecode::{CompiledFunction, FunctionParts, ScopeSlot, ScopeSlots};
pub use constant::{
    ArgSpec, CallArgsPlan, Constant, DeferredValue, ExtensionPropertyDecl, FallbackStatement, ListSpreadPlan,
    LocalDecl, NamedSlotPlan, SourcePos, StmtRef, TypeRef,
};
pub use context::{AccessPolicy, CallContext, DefaultAccess, DispatchStats};
pub use decode::{
    AnyDecoder, Decode, DecodeError, EncodingWidths, Instr, Instrs, MAX_OPERANDS, Operand, Slot8Decoder,
    Slot16Decoder, Slot32Decoder,
};
pub use disasm::{disassemble, disassemble_code, disassemble_listing, write_instr};
pub use error::VmError;
pub use frame::{Frame, SlotType};
pub use opcode::{Opcode, OperandKind, Shape};
pub use pic::{CallSiteStats, MethodCallSite, PicConfig};
