//! Execution core of the slotvm register VM.
//!
//! [`vm`] holds the frame model, the instruction encoding with its decoders
//! and builder, compiled functions, the disassembler and the adaptive
//! call-site cache. [`val`] is the reference value and class model the
//! dispatch path runs against.

pub mod val;
pub mod vm;
