use std::fmt;

use crate::val::Visibility;

/// Typed dispatch failures raised through the calling context.
///
/// Callers receive these wrapped in `anyhow::Error`; use
/// `err.downcast_ref::<VmError>()` to inspect the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Member exists but the caller may not see it.
    IllegalAccess { message: String },
    /// Member does not resolve to anything callable on the receiver.
    MethodNotFound { message: String },
}

impl VmError {
    pub fn method_not_found(owner: &str, name: &str) -> Self {
        VmError::MethodNotFound {
            message: format!("method '{}' not found on {}", name, owner),
        }
    }

    pub fn abstract_method(owner: &str, name: &str) -> Self {
        VmError::MethodNotFound {
            message: format!("method '{}' of {} is abstract", name, owner),
        }
    }

    pub fn illegal_access(visibility: Visibility, owner: &str, name: &str) -> Self {
        VmError::IllegalAccess {
            message: format!("cannot access {} method '{}' of {}", visibility, name, owner),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            VmError::IllegalAccess { message } | VmError::MethodNotFound { message } => message,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VmError::IllegalAccess { .. } => "IllegalAccess",
            VmError::MethodNotFound { .. } => "MethodNotFound",
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for VmError {}
