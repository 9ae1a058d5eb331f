use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::val::{Callable, Class, ClassId, Resolved, Visibility};

use super::VmError;

/// Visibility rule consulted on every dispatch that reaches a member body.
pub trait AccessPolicy: Send + Sync {
    fn can_access(&self, visibility: Visibility, declaring: ClassId, caller: Option<&Class>, member: &str) -> bool;
}

/// Public: everyone. Protected: the declaring class and its subclasses.
/// Private: the declaring class only.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAccess;

impl AccessPolicy for DefaultAccess {
    fn can_access(&self, visibility: Visibility, declaring: ClassId, caller: Option<&Class>, _member: &str) -> bool {
        match visibility {
            Visibility::Public => true,
            Visibility::Protected => caller.is_some_and(|c| c.is_subclass_of(declaring)),
            Visibility::Private => caller.is_some_and(|c| c.id() == declaring),
        }
    }
}

/// Dispatch instrumentation, reset only by creating a new context.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Full by-name member resolutions (instance and class scope).
    pub resolutions: u64,
    pub access_checks: u64,
}

/// Calling context handed to every invocation.
///
/// Carries the caller's class context for visibility checks, the access
/// policy, and counters that make cold-path work observable.
pub struct CallContext {
    caller: Option<Arc<Class>>,
    access: Arc<dyn AccessPolicy>,
    stats: DispatchStats,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            caller: None,
            access: Arc::new(DefaultAccess),
            stats: DispatchStats::default(),
        }
    }

    pub fn with_caller(caller: &Arc<Class>) -> Self {
        let mut ctx = Self::new();
        ctx.caller = Some(Arc::clone(caller));
        ctx
    }

    pub fn with_access_policy(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }

    #[inline]
    pub fn caller(&self) -> Option<&Arc<Class>> {
        self.caller.as_ref()
    }

    /// Switch the caller class context, returning the previous one.
    pub fn set_caller(&mut self, caller: Option<Arc<Class>>) -> Option<Arc<Class>> {
        std::mem::replace(&mut self.caller, caller)
    }

    #[inline]
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn resolve_instance(&mut self, class: &Class, name: &str) -> Option<Resolved> {
        self.stats.resolutions += 1;
        class.resolve(name)
    }

    pub fn resolve_static(&mut self, class: &Class, name: &str) -> Option<Callable> {
        self.stats.resolutions += 1;
        class.resolve_static(name)
    }

    pub fn can_access(&mut self, visibility: Visibility, declaring: ClassId, member: &str) -> bool {
        self.stats.access_checks += 1;
        self.access
            .can_access(visibility, declaring, self.caller.as_deref(), member)
    }

    /// Raise `IllegalAccess` unless the caller may see the member.
    pub fn check_access(&mut self, visibility: Visibility, declaring: ClassId, member: &str, owner: &Class) -> Result<()> {
        if self.can_access(visibility, declaring, member) {
            Ok(())
        } else {
            Err(self.raise(VmError::illegal_access(visibility, owner.name(), member)))
        }
    }

    /// Turn a typed error into the error that aborts the current call chain.
    #[inline]
    pub fn raise(&self, err: VmError) -> anyhow::Error {
        anyhow::Error::new(err)
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("caller", &self.caller.as_ref().map(|c| c.name().to_string()))
            .field("stats", &self.stats)
            .finish()
    }
}
