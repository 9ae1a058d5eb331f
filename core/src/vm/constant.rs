//! Constant-pool entries.
//!
//! Besides plain literals the pool carries the compile-time plans the
//! interpreter consults at runtime (call-argument shapes, named-slot maps,
//! spread masks, declarations) and hooks into the fallback evaluator for
//! constructs that were not lowered to bytecode.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use rustc_hash::FxHashMap;

use crate::val::{Value, Visibility};

use super::{CallContext, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: Arc<str>,
    pub nullable: bool,
}

/// Statement kept out of bytecode and run by the generic evaluator.
pub trait FallbackStatement: Send + Sync {
    fn describe(&self) -> String;

    fn eval(&self, ctx: &mut CallContext, frame: &mut Frame) -> Result<Value>;
}

pub type StmtRef = Arc<dyn FallbackStatement>;

/// Which elements of a list literal are `...spread`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListSpreadPlan {
    pub spreads: Vec<bool>,
}

impl ListSpreadPlan {
    #[inline]
    pub fn is_spread(&self, idx: usize) -> bool {
        self.spreads.get(idx).copied().unwrap_or(false)
    }

    pub fn spread_count(&self) -> usize {
        self.spreads.iter().filter(|s| **s).count()
    }
}

/// Lazily produced value (default arguments, lazy initializers).
#[derive(Clone)]
pub struct DeferredValue {
    label: Arc<str>,
    produce: Arc<dyn Fn(&mut CallContext) -> Result<Value> + Send + Sync>,
}

impl DeferredValue {
    pub fn new<F>(label: impl Into<Arc<str>>, produce: F) -> Self
    where
        F: Fn(&mut CallContext) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            produce: Arc::new(produce),
        }
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn produce(&self, ctx: &mut CallContext) -> Result<Value> {
        (self.produce)(ctx)
    }
}

impl fmt::Debug for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeferredValue({})", self.label)
    }
}

/// Name to slot mapping, e.g. for named arguments or capture maps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamedSlotPlan {
    slots: FxHashMap<Arc<str>, u32>,
}

impl NamedSlotPlan {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<Arc<str>>,
    {
        Self {
            slots: entries.into_iter().map(|(name, slot)| (name.into(), slot)).collect(),
        }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<u32> {
        self.slots.get(name).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Entries ordered by slot, then name.
    pub fn sorted(&self) -> Vec<(&str, u32)> {
        let mut entries: Vec<(&str, u32)> = self.slots.iter().map(|(n, s)| (n.as_ref(), *s)).collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPropertyDecl {
    pub receiver: TypeRef,
    pub name: Arc<str>,
    pub mutable: bool,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDecl {
    pub name: Arc<str>,
    pub mutable: bool,
    pub visibility: Visibility,
    pub transient: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgSpec {
    pub name: Option<Arc<str>>,
    pub spread: bool,
}

/// Shape of the arguments at one call site.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallArgsPlan {
    pub args: Vec<ArgSpec>,
    /// Last argument is a trailing block `f(a) { ... }`.
    pub trailing_block: bool,
}

impl CallArgsPlan {
    pub fn positional_count(&self) -> usize {
        self.args.iter().filter(|a| a.name.is_none() && !a.spread).count()
    }

    pub fn named(&self) -> impl Iterator<Item = (usize, &str)> {
        self.args
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.name.as_deref().map(|n| (i, n)))
    }

    pub fn has_spread(&self) -> bool {
        self.args.iter().any(|a| a.spread)
    }
}

#[derive(Clone)]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(Arc<str>),
    Pos(SourcePos),
    Object(Value),
    Type(TypeRef),
    Stmt(StmtRef),
    ListSpread(ListSpreadPlan),
    Deferred(DeferredValue),
    NamedSlots(NamedSlotPlan),
    ExtensionProperty(ExtensionPropertyDecl),
    Local(LocalDecl),
    CallArgs(CallArgsPlan),
}

impl Constant {
    pub fn str(s: &str) -> Constant {
        Constant::Str(Arc::from(s))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Constant::Null => "null",
            Constant::Bool(_) => "bool",
            Constant::Int(_) => "int",
            Constant::Real(_) => "real",
            Constant::Str(_) => "str",
            Constant::Pos(_) => "pos",
            Constant::Object(_) => "obj",
            Constant::Type(_) => "type",
            Constant::Stmt(_) => "stmt",
            Constant::ListSpread(_) => "spread",
            Constant::Deferred(_) => "deferred",
            Constant::NamedSlots(_) => "slots",
            Constant::ExtensionProperty(_) => "ext",
            Constant::Local(_) => "local",
            Constant::CallArgs(_) => "args",
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::Str(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    /// Materialize literal constants as runtime values.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Constant::Null => Some(Value::Nil),
            Constant::Bool(b) => Some(Value::Bool(*b)),
            Constant::Int(i) => Some(Value::Int(*i)),
            Constant::Real(r) => Some(Value::Real(*r)),
            Constant::Str(s) => Some(Value::Str(Arc::clone(s))),
            Constant::Object(v) => Some(v.clone()),
            _ => None,
        }
    }
}

fn write_flags(f: &mut fmt::Formatter<'_>, mutable: bool, visibility: Visibility) -> fmt::Result {
    write!(f, "{} {}", if mutable { "var" } else { "val" }, visibility)
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())?;
        f.write_str(" ")?;
        match self {
            Constant::Null => f.write_str("null"),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Int(i) => f.write_str(itoa::Buffer::new().format(*i)),
            Constant::Real(r) => f.write_str(ryu::Buffer::new().format(*r)),
            Constant::Str(s) => write!(f, "{:?}", s.as_ref()),
            Constant::Pos(p) => write!(f, "{}", p),
            Constant::Object(v) => write!(f, "{}", v),
            Constant::Type(t) => write!(f, "{}{}", t.name, if t.nullable { "?" } else { "" }),
            Constant::Stmt(s) => f.write_str(&s.describe()),
            Constant::ListSpread(plan) => {
                f.write_str("[")?;
                for (i, spread) in plan.spreads.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(if *spread { "..." } else { "_" })?;
                }
                f.write_str("]")
            }
            Constant::Deferred(d) => f.write_str(d.label()),
            Constant::NamedSlots(plan) => {
                f.write_str("{")?;
                for (i, (name, slot)) in plan.sorted().into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}=s{}", name, slot)?;
                }
                f.write_str("}")
            }
            Constant::ExtensionProperty(decl) => {
                write_flags(f, decl.mutable, decl.visibility)?;
                write!(f, " {}.{}", decl.receiver.name, decl.name)
            }
            Constant::Local(decl) => {
                write_flags(f, decl.mutable, decl.visibility)?;
                write!(f, " {}", decl.name)?;
                if decl.transient {
                    f.write_str(" transient")?;
                }
                Ok(())
            }
            Constant::CallArgs(plan) => {
                f.write_str("(")?;
                for (i, arg) in plan.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if arg.spread {
                        f.write_str("*")?;
                    }
                    match arg.name.as_deref() {
                        Some(name) => write!(f, "{}=", name)?,
                        None => {}
                    }
                    write!(f, "a{}", i)?;
                }
                f.write_str(")")?;
                if plan.trailing_block {
                    f.write_str(" +block")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constant({})", self)
    }
}
