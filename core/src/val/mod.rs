//! Runtime values and the reference object model consumed by dispatch.

use std::fmt;
use std::sync::Arc;

mod class;
pub mod methods;

pub use class::{Callable, Class, ClassId, Instance, MethodRecord, NativeMethod, Resolved, VTable, Visibility};


/// Object-slot value. Cloning is cheap: heap variants are reference counted.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(Arc<str>),
    Instance(Arc<Instance>),
    Class(Arc<Class>),
    Func(Callable),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Real(_) => "Real",
            Value::Str(_) => "String",
            Value::Instance(_) => "Instance",
            Value::Class(_) => "Class",
            Value::Func(_) => "Function",
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn str(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => Callable::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => {
                let mut buf = itoa::Buffer::new();
                f.write_str(buf.format(*i))
            }
            Value::Real(r) => {
                let mut buf = ryu::Buffer::new();
                f.write_str(buf.format(*r))
            }
            Value::Str(s) => f.write_str(s),
            Value::Instance(inst) => write!(f, "<{} instance>", inst.class().name()),
            Value::Class(class) => write!(f, "<class {}>", class.name()),
            Value::Func(func) => write!(f, "<fn {}>", func.name()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}
