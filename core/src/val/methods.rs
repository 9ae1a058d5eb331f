//! Generic (uncached) method dispatch.
//!
//! This is the cold path of every dynamic call: resolve by name against the
//! receiver, check visibility, invoke. Call sites fall back to it whenever a
//! memoized decision does not apply, and it is the reference the caches must
//! agree with.

use anyhow::Result;

use crate::vm::{CallContext, VmError};

use super::{Instance, Value};

/// Invoke `name` on `receiver` with full resolution.
pub fn invoke_method(ctx: &mut CallContext, receiver: &Value, name: &str, args: &[Value]) -> Result<Value> {
    match receiver {
        Value::Instance(inst) => invoke_instance_method(ctx, inst, receiver, name, args),
        Value::Class(class) => match ctx.resolve_static(class, name) {
            Some(body) => body.call(ctx, receiver, args),
            None => Err(VmError::method_not_found(&class_scope_owner(class.name()), name).into()),
        },
        other => Err(VmError::method_not_found(other.type_name(), name).into()),
    }
}

/// Instance half of [`invoke_method`]; `receiver` must wrap `inst`.
pub fn invoke_instance_method(
    ctx: &mut CallContext,
    inst: &Instance,
    receiver: &Value,
    name: &str,
    args: &[Value],
) -> Result<Value> {
    let class = inst.class();
    let resolved = ctx
        .resolve_instance(class, name)
        .ok_or_else(|| VmError::method_not_found(class.name(), name))?;
    let record = &resolved.record;
    let body = match record.body.as_ref() {
        Some(body) => body,
        None => return Err(VmError::abstract_method(class.name(), name).into()),
    };
    ctx.check_access(record.visibility, record.declaring, name, class)?;
    match resolved.slot {
        // Virtual members are read back from the receiver's slot array.
        Some(slot) => match inst.method_slots().get(slot).and_then(|r| r.body.clone()) {
            Some(slotted) => slotted.call(ctx, receiver, args),
            None => body.call(ctx, receiver, args),
        },
        None => body.call(ctx, receiver, args),
    }
}

/// Owner label used in errors for class-scope lookups.
pub fn class_scope_owner(class_name: &str) -> String {
    format!("class {}", class_name)
}
