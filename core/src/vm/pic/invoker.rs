use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::val::methods::{class_scope_owner, invoke_instance_method, invoke_method};
use crate::val::{Callable, Class, ClassId, Value, Visibility};
use crate::vm::{CallContext, VmError};

/// Memoized dispatch decision stored in a call-site entry.
///
/// Resolution happens once on a miss; every hit only re-applies the checks
/// that must hold per call (receiver shape, visibility) and invokes.
#[derive(Clone)]
pub enum Invoker {
    /// Virtual member at a fixed method-slot index of `class`.
    DirectSlot { class: Arc<Class>, slot: usize },
    /// Member without a slot (private), invoked directly after an access check.
    DirectCallable {
        callable: Callable,
        visibility: Visibility,
        declaring: ClassId,
    },
    /// Class-scope member of a class value.
    ClassScope { callable: Callable },
    /// Nothing worth memoizing; always runs full dispatch.
    Fallback,
    /// Resolution failed for this class layout; re-raise without resolving.
    CachedError(VmError),
}

impl Invoker {
    /// Cold path: resolve `name` against `receiver` and decide what to cache.
    pub fn resolve(ctx: &mut CallContext, receiver: &Value, name: &str) -> Invoker {
        match receiver {
            Value::Instance(inst) => {
                let class = inst.class();
                let Some(resolved) = ctx.resolve_instance(class, name) else {
                    return Invoker::CachedError(VmError::method_not_found(class.name(), name));
                };
                let record = resolved.record;
                match (record.body.as_ref(), resolved.slot) {
                    (None, _) => Invoker::Fallback,
                    (Some(_), Some(slot)) => Invoker::DirectSlot {
                        class: Arc::clone(class),
                        slot,
                    },
                    (Some(body), None) => Invoker::DirectCallable {
                        callable: body.clone(),
                        visibility: record.visibility,
                        declaring: record.declaring,
                    },
                }
            }
            Value::Class(class) => match ctx.resolve_static(class, name) {
                Some(callable) => Invoker::ClassScope { callable },
                None => Invoker::CachedError(VmError::method_not_found(&class_scope_owner(class.name()), name)),
            },
            _ => Invoker::Fallback,
        }
    }

    pub fn invoke(&self, ctx: &mut CallContext, receiver: &Value, name: &str, args: &[Value]) -> Result<Value> {
        match self {
            Invoker::DirectSlot { class, slot } => {
                let Value::Instance(inst) = receiver else {
                    return invoke_method(ctx, receiver, name, args);
                };
                // exact class, not just an equal key
                if !Arc::ptr_eq(inst.class(), class) {
                    return invoke_instance_method(ctx, inst, receiver, name, args);
                }
                let slots = inst.method_slots();
                let Some(record) = slots.get(*slot).filter(|r| r.name.as_ref() == name) else {
                    return invoke_instance_method(ctx, inst, receiver, name, args);
                };
                let Some(body) = record.body.as_ref() else {
                    return invoke_instance_method(ctx, inst, receiver, name, args);
                };
                ctx.check_access(record.visibility, record.declaring, name, class)?;
                body.call(ctx, receiver, args)
            }
            Invoker::DirectCallable {
                callable,
                visibility,
                declaring,
            } => {
                if let Value::Instance(inst) = receiver {
                    ctx.check_access(*visibility, *declaring, name, inst.class())?;
                }
                callable.call(ctx, receiver, args)
            }
            Invoker::ClassScope { callable } => callable.call(ctx, receiver, args),
            Invoker::Fallback => invoke_method(ctx, receiver, name, args),
            Invoker::CachedError(err) => Err(ctx.raise(err.clone())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Invoker::DirectSlot { .. } => "direct-slot",
            Invoker::DirectCallable { .. } => "direct-callable",
            Invoker::ClassScope { .. } => "class-scope",
            Invoker::Fallback => "fallback",
            Invoker::CachedError(_) => "cached-error",
        }
    }
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invoker::DirectSlot { class, slot } => write!(f, "DirectSlot({}#{})", class.name(), slot),
            Invoker::DirectCallable { callable, visibility, .. } => {
                write!(f, "DirectCallable({} {})", visibility, callable.name())
            }
            Invoker::ClassScope { callable } => write!(f, "ClassScope({})", callable.name()),
            Invoker::Fallback => f.write_str("Fallback"),
            Invoker::CachedError(err) => write!(f, "CachedError({})", err),
        }
    }
}
