//! Bridge Error Types
//!
//! Every failure the bridge can report. Errors never cross the C boundary as
//! panics; the boundary degrades them to `None` results or silence and hands
//! them to the error hook.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::module::ParamType;

/// Errors produced by module loading, resolution and dispatch.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("Module not found: {}", .0.display())]
    ModuleNotFound(PathBuf),

    #[error("Type not found: {0}")]
    TypeNotFound(String),

    #[error("Member not found: {path} with {arity} args")]
    MemberNotFound { path: String, arity: usize },

    #[error("Failed to load module '{}': {reason}", path.display())]
    LoadFailed { path: PathBuf, reason: String },

    #[error("Malformed call '{call}': {reason}")]
    MalformedCall { call: String, reason: &'static str },

    #[error("Cannot convert argument {index} ('{literal}') to {expected}")]
    ArgumentConversion {
        index: usize,
        literal: String,
        expected: ParamType,
    },

    #[error("Failed to construct '{type_name}': {reason}")]
    Construction { type_name: String, reason: String },

    #[error("Invocation of '{member}' failed: {reason}")]
    InvocationFailure { member: String, reason: String },

    #[error("Instance handle not found: {0}")]
    HandleNotFound(u32),

    #[error("Module '{}' is busy: {live} live instance(s)", path.display())]
    ModuleBusy { path: PathBuf, live: usize },

    #[error("Bridge is not initialized")]
    NotInitialized,
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Coarse classification of a [`BridgeError`].
///
/// The discriminants are the codes handed to the C error callback.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound = 1,
    MalformedCall = 2,
    ArgumentConversion = 3,
    Construction = 4,
    InvocationFailure = 5,
    HandleNotFound = 6,
    ModuleBusy = 7,
    LoadFailed = 8,
    NotInitialized = 9,
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::ModuleNotFound(_)
            | BridgeError::TypeNotFound(_)
            | BridgeError::MemberNotFound { .. } => ErrorKind::NotFound,
            BridgeError::LoadFailed { .. } => ErrorKind::LoadFailed,
            BridgeError::MalformedCall { .. } => ErrorKind::MalformedCall,
            BridgeError::ArgumentConversion { .. } => ErrorKind::ArgumentConversion,
            BridgeError::Construction { .. } => ErrorKind::Construction,
            BridgeError::InvocationFailure { .. } => ErrorKind::InvocationFailure,
            BridgeError::HandleNotFound(_) => ErrorKind::HandleNotFound,
            BridgeError::ModuleBusy { .. } => ErrorKind::ModuleBusy,
            BridgeError::NotInitialized => ErrorKind::NotInitialized,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::MalformedCall => write!(f, "malformed-call"),
            ErrorKind::ArgumentConversion => write!(f, "argument-conversion"),
            ErrorKind::Construction => write!(f, "construction"),
            ErrorKind::InvocationFailure => write!(f, "invocation-failure"),
            ErrorKind::HandleNotFound => write!(f, "handle-not-found"),
            ErrorKind::ModuleBusy => write!(f, "module-busy"),
            ErrorKind::LoadFailed => write!(f, "load-failed"),
            ErrorKind::NotInitialized => write!(f, "not-initialized"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            BridgeError::TypeNotFound("A.B".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            BridgeError::MemberNotFound {
                path: "A.B.C".into(),
                arity: 2
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(BridgeError::HandleNotFound(7).kind(), ErrorKind::HandleNotFound);
        assert_eq!(ErrorKind::ModuleBusy as i32, 7);
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::ArgumentConversion {
            index: 1,
            literal: "abc".into(),
            expected: ParamType::I32,
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("i32"));

        let err = BridgeError::MemberNotFound {
            path: "Ns.Cls.Method".into(),
            arity: 3,
        };
        assert!(err.to_string().contains("3 args"));
    }
}
