//! Reference class model used by dynamic dispatch.
//!
//! Classes use single inheritance. Every mutation of a class's member tables
//! stamps the class with a fresh value from a process-wide epoch, and the
//! layout version of a class is the newest stamp found along its parent chain.
//! A change to any ancestor therefore shows up as a version change of every
//! descendant, which is all the call-site caches need to stay correct.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use rustc_hash::FxHashMap;

use crate::vm::CallContext;

use super::Value;

/// Stable class identity. `0` is never allocated.
pub type ClassId = u64;

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);
static LAYOUT_EPOCH: AtomicU64 = AtomicU64::new(1);

#[inline]
fn next_epoch() -> u64 {
    LAYOUT_EPOCH.fetch_add(1, Ordering::Relaxed) + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native method body: `(context, receiver, args) -> result`.
pub type NativeMethod = dyn Fn(&mut CallContext, &Value, &[Value]) -> anyhow::Result<Value> + Send + Sync;

#[derive(Clone)]
pub struct Callable {
    name: Arc<str>,
    func: Arc<NativeMethod>,
}

impl Callable {
    pub fn new<N, F>(name: N, func: F) -> Self
    where
        N: Into<Arc<str>>,
        F: Fn(&mut CallContext, &Value, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn call(&self, ctx: &mut CallContext, receiver: &Value, args: &[Value]) -> anyhow::Result<Value> {
        (self.func)(ctx, receiver, args)
    }

    #[inline]
    pub fn ptr_eq(a: &Callable, b: &Callable) -> bool {
        Arc::ptr_eq(&a.func, &b.func)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.name)
    }
}

/// A method as declared on a class. `body == None` marks an abstract method.
#[derive(Debug, Clone)]
pub struct MethodRecord {
    pub name: Arc<str>,
    pub visibility: Visibility,
    pub declaring: ClassId,
    pub body: Option<Callable>,
}

impl MethodRecord {
    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.body.is_none()
    }
}

/// Result of by-name member resolution.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub record: Arc<MethodRecord>,
    /// Fixed method-slot index when the member is virtually dispatched.
    pub slot: Option<usize>,
}

/// Method-slot array shared by all instances of a class at one layout version.
///
/// Parent slots come first; overrides keep the parent's index and new
/// non-private methods are appended in declaration order.
#[derive(Debug)]
pub struct VTable {
    version: u64,
    slots: Vec<Arc<MethodRecord>>,
    index: FxHashMap<Arc<str>, usize>,
}

impl VTable {
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<&Arc<MethodRecord>> {
        self.slots.get(slot)
    }

    #[inline]
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[derive(Default)]
struct Members {
    methods: FxHashMap<Arc<str>, Arc<MethodRecord>>,
    // declaration order, drives vtable layout
    order: Vec<Arc<str>>,
    statics: FxHashMap<Arc<str>, Callable>,
}

pub struct Class {
    id: ClassId,
    name: Arc<str>,
    parent: Option<Arc<Class>>,
    stamp: AtomicU64,
    members: RwLock<Members>,
    vtable: RwLock<Option<Arc<VTable>>>,
}

impl Class {
    pub fn new(name: impl Into<Arc<str>>) -> Arc<Class> {
        Self::build(name.into(), None)
    }

    pub fn with_parent(name: impl Into<Arc<str>>, parent: &Arc<Class>) -> Arc<Class> {
        Self::build(name.into(), Some(Arc::clone(parent)))
    }

    fn build(name: Arc<str>, parent: Option<Arc<Class>>) -> Arc<Class> {
        Arc::new(Class {
            id: NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed),
            name,
            parent,
            stamp: AtomicU64::new(next_epoch()),
            members: RwLock::new(Members::default()),
            vtable: RwLock::new(None),
        })
    }

    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parent(&self) -> Option<&Arc<Class>> {
        self.parent.as_ref()
    }

    /// Newest member-table stamp along the parent chain.
    pub fn layout_version(&self) -> u64 {
        let mut version = self.stamp.load(Ordering::Acquire);
        let mut cur = self.parent.as_deref();
        while let Some(class) = cur {
            version = version.max(class.stamp.load(Ordering::Acquire));
            cur = class.parent.as_deref();
        }
        version
    }

    pub fn is_subclass_of(&self, id: ClassId) -> bool {
        let mut cur = Some(self);
        while let Some(class) = cur {
            if class.id == id {
                return true;
            }
            cur = class.parent.as_deref();
        }
        false
    }

    pub fn define_method(&self, name: impl Into<Arc<str>>, visibility: Visibility, body: Callable) {
        self.insert_method(name.into(), visibility, Some(body));
    }

    pub fn define_abstract(&self, name: impl Into<Arc<str>>, visibility: Visibility) {
        self.insert_method(name.into(), visibility, None);
    }

    pub fn define_static(&self, name: impl Into<Arc<str>>, body: Callable) {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        members.statics.insert(name.into(), body);
        self.touch();
    }

    pub fn remove_method(&self, name: &str) -> bool {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        let removed = members.methods.remove(name).is_some();
        if removed {
            members.order.retain(|n| n.as_ref() != name);
            self.touch();
        }
        removed
    }

    fn insert_method(&self, name: Arc<str>, visibility: Visibility, body: Option<Callable>) {
        let record = Arc::new(MethodRecord {
            name: Arc::clone(&name),
            visibility,
            declaring: self.id,
            body,
        });
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        if members.methods.insert(Arc::clone(&name), record).is_none() {
            members.order.push(name);
        }
        self.touch();
    }

    #[inline]
    fn touch(&self) {
        self.stamp.store(next_epoch(), Ordering::Release);
    }

    /// Method-slot array for the current layout version, rebuilt lazily.
    pub fn vtable(&self) -> Arc<VTable> {
        let version = self.layout_version();
        {
            let cached = self.vtable.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(table) = cached.as_ref().filter(|t| t.version == version) {
                return Arc::clone(table);
            }
        }
        let table = Arc::new(self.build_vtable(version));
        let mut cached = self.vtable.write().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(Arc::clone(&table));
        table
    }

    fn build_vtable(&self, version: u64) -> VTable {
        let (mut slots, mut index) = match self.parent.as_ref() {
            Some(parent) => {
                let inherited = parent.vtable();
                (inherited.slots.clone(), inherited.index.clone())
            }
            None => (Vec::new(), FxHashMap::default()),
        };
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        for name in &members.order {
            let Some(record) = members.methods.get(name) else {
                continue;
            };
            if record.visibility == Visibility::Private {
                continue;
            }
            match index.get(name) {
                Some(&slot) => slots[slot] = Arc::clone(record),
                None => {
                    index.insert(Arc::clone(name), slots.len());
                    slots.push(Arc::clone(record));
                }
            }
        }
        VTable { version, slots, index }
    }

    /// Full by-name resolution: nearest declaration along the parent chain.
    pub fn resolve(&self, name: &str) -> Option<Resolved> {
        let mut cur = Some(self);
        while let Some(class) = cur {
            let found = {
                let members = class.members.read().unwrap_or_else(PoisonError::into_inner);
                members.methods.get(name).cloned()
            };
            if let Some(record) = found {
                let slot = match record.visibility {
                    Visibility::Private => None,
                    _ => self.vtable().slot_of(name),
                };
                return Some(Resolved { record, slot });
            }
            cur = class.parent.as_deref();
        }
        None
    }

    /// Class-scope (static) member lookup along the parent chain.
    pub fn resolve_static(&self, name: &str) -> Option<Callable> {
        let mut cur = Some(self);
        while let Some(class) = cur {
            let members = class.members.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(body) = members.statics.get(name) {
                return Some(body.clone());
            }
            cur = class.parent.as_deref();
        }
        None
    }

    pub fn instantiate(self: &Arc<Self>) -> Value {
        Value::Instance(Arc::new(Instance {
            class: Arc::clone(self),
        }))
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .finish()
    }
}

#[derive(Debug)]
pub struct Instance {
    class: Arc<Class>,
}

impl Instance {
    #[inline]
    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    /// The receiver's method-slot array.
    #[inline]
    pub fn method_slots(&self) -> Arc<VTable> {
        self.class.vtable()
    }
}
