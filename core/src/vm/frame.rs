//! Typed per-call slot storage.
//!
//! Slots `[0, local_count)` are locals and `[local_count, local_count + arg_count)`
//! are arguments. Each slot has one live representation, recorded in its tag;
//! storage is split into parallel arrays so primitive slots never box.
//!
//! The unchecked readers trust the compiler: reading a slot under a tag other
//! than the one last written returns whatever the array holds. Use the
//! `checked_*` readers where that guarantee does not hold.

use anyhow::{Result, ensure};

use crate::val::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SlotType {
    #[default]
    Unknown,
    Object,
    Int,
    Real,
    Bool,
}

#[derive(Debug, Clone)]
pub struct Frame {
    tags: Box<[SlotType]>,
    objects: Box<[Value]>,
    ints: Box<[i64]>,
    reals: Box<[f64]>,
    bools: Box<[bool]>,
    local_count: usize,
    arg_count: usize,
}

impl Frame {
    pub fn new(local_count: usize, arg_count: usize) -> Self {
        let n = local_count + arg_count;
        Self {
            tags: vec![SlotType::Unknown; n].into_boxed_slice(),
            objects: vec![Value::Nil; n].into_boxed_slice(),
            ints: vec![0; n].into_boxed_slice(),
            reals: vec![0.0; n].into_boxed_slice(),
            bools: vec![false; n].into_boxed_slice(),
            local_count,
            arg_count,
        }
    }

    /// Frame sized for `func`.
    pub fn for_function(func: &super::CompiledFunction) -> Self {
        Self::new(func.local_count(), func.arg_count())
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn local_count(&self) -> usize {
        self.local_count
    }

    #[inline]
    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    #[inline]
    pub fn arg_base(&self) -> usize {
        self.local_count
    }

    #[inline]
    pub fn arg_slot(&self, i: usize) -> usize {
        self.local_count + i
    }

    #[inline]
    pub fn get_type(&self, slot: usize) -> SlotType {
        self.tags[slot]
    }

    #[inline]
    pub fn set_type(&mut self, slot: usize, ty: SlotType) {
        self.tags[slot] = ty;
    }

    #[inline]
    pub fn get_int(&self, slot: usize) -> i64 {
        self.ints[slot]
    }

    #[inline]
    pub fn set_int(&mut self, slot: usize, v: i64) {
        self.ints[slot] = v;
        self.tags[slot] = SlotType::Int;
    }

    #[inline]
    pub fn get_real(&self, slot: usize) -> f64 {
        self.reals[slot]
    }

    #[inline]
    pub fn set_real(&mut self, slot: usize, v: f64) {
        self.reals[slot] = v;
        self.tags[slot] = SlotType::Real;
    }

    #[inline]
    pub fn get_bool(&self, slot: usize) -> bool {
        self.bools[slot]
    }

    #[inline]
    pub fn set_bool(&mut self, slot: usize, v: bool) {
        self.bools[slot] = v;
        self.tags[slot] = SlotType::Bool;
    }

    #[inline]
    pub fn get_obj(&self, slot: usize) -> &Value {
        &self.objects[slot]
    }

    #[inline]
    pub fn set_obj(&mut self, slot: usize, v: Value) {
        self.objects[slot] = v;
        self.tags[slot] = SlotType::Object;
    }

    pub fn checked_int(&self, slot: usize) -> Option<i64> {
        (self.tags.get(slot) == Some(&SlotType::Int)).then(|| self.ints[slot])
    }

    pub fn checked_real(&self, slot: usize) -> Option<f64> {
        (self.tags.get(slot) == Some(&SlotType::Real)).then(|| self.reals[slot])
    }

    pub fn checked_bool(&self, slot: usize) -> Option<bool> {
        (self.tags.get(slot) == Some(&SlotType::Bool)).then(|| self.bools[slot])
    }

    pub fn checked_obj(&self, slot: usize) -> Option<&Value> {
        (self.tags.get(slot) == Some(&SlotType::Object)).then(|| &self.objects[slot])
    }

    /// Reset `slot` to `Unknown`, dropping any object it holds.
    #[inline]
    pub fn clear(&mut self, slot: usize) {
        self.tags[slot] = SlotType::Unknown;
        self.objects[slot] = Value::Nil;
        self.ints[slot] = 0;
        self.reals[slot] = 0.0;
        self.bools[slot] = false;
    }

    pub fn clear_all(&mut self) {
        self.tags.fill(SlotType::Unknown);
        self.objects.fill(Value::Nil);
        self.ints.fill(0);
        self.reals.fill(0.0);
        self.bools.fill(false);
    }

    /// Store `v` in its natural representation.
    pub fn store_value(&mut self, slot: usize, v: Value) {
        match v {
            Value::Int(i) => self.set_int(slot, i),
            Value::Real(r) => self.set_real(slot, r),
            Value::Bool(b) => self.set_bool(slot, b),
            other => self.set_obj(slot, other),
        }
    }

    /// Read `slot` back as a value according to its tag. `Unknown` reads as nil.
    pub fn load_value(&self, slot: usize) -> Value {
        match self.tags[slot] {
            SlotType::Unknown => Value::Nil,
            SlotType::Object => self.objects[slot].clone(),
            SlotType::Int => Value::Int(self.ints[slot]),
            SlotType::Real => Value::Real(self.reals[slot]),
            SlotType::Bool => Value::Bool(self.bools[slot]),
        }
    }

    /// Write call arguments into the argument area.
    pub fn bind_args(&mut self, args: &[Value]) -> Result<()> {
        ensure!(
            args.len() == self.arg_count,
            "expected {} arguments, got {}",
            self.arg_count,
            args.len()
        );
        let base = self.arg_base();
        for (i, arg) in args.iter().enumerate() {
            self.store_value(base + i, arg.clone());
        }
        Ok(())
    }

    /// Values of `count` consecutive slots starting at `base`, as passed to a call.
    pub fn collect_args(&self, base: usize, count: usize) -> Vec<Value> {
        (base..base + count).map(|slot| self.load_value(slot)).collect()
    }
}
