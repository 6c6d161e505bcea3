//! Call Dispatcher
//!
//! Turns parsed call records into invocations:
//!
//! ```text
//! "Ns.Cls.Add(1, 2)"
//!       │ parse_static_call
//!       ▼
//! CallRecord { Ns, Cls, Add, ["1", "2"] }
//!       │ ModuleRegistry::find_method("Ns.Cls.Add", 2)
//!       ▼
//! StaticMethodDef { params: [i32, i32], thunk }
//!       │ coerce_args
//!       ▼
//! [I32(1), I32(2)] ──invoke_static──► Value::I32(3)
//! ```
//!
//! Failures and panics raised by module code never leave this layer as
//! unwinding; they come back as [`BridgeError::InvocationFailure`] or
//! [`BridgeError::Construction`].

mod parser;

pub use parser::{parse_instance_call, parse_static_call, CallRecord, InstanceCall};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{BridgeError, BridgeResult};
use crate::module::{Constructor, InstanceThunk, ParamType, StaticThunk, Value};

/// Convert argument literals to the declared parameter types.
///
/// The caller has already matched the arity.
pub fn coerce_args(params: &[ParamType], literals: &[String]) -> BridgeResult<Vec<Value>> {
    params
        .iter()
        .zip(literals)
        .enumerate()
        .map(|(index, (param, literal))| {
            param
                .coerce(literal)
                .ok_or_else(|| BridgeError::ArgumentConversion {
                    index,
                    literal: literal.clone(),
                    expected: *param,
                })
        })
        .collect()
}

/// Invoke a static thunk, containing failures and panics.
pub fn invoke_static(member: &str, thunk: &StaticThunk, args: Vec<Value>) -> BridgeResult<Value> {
    contain(|| thunk(args)).map_err(|reason| BridgeError::InvocationFailure {
        member: member.to_string(),
        reason,
    })
}

/// Invoke an instance thunk on `target`, containing failures and panics.
pub fn invoke_instance(
    member: &str,
    thunk: &InstanceThunk,
    target: &mut dyn Any,
    args: Vec<Value>,
) -> BridgeResult<Value> {
    contain(|| thunk(target, args)).map_err(|reason| BridgeError::InvocationFailure {
        member: member.to_string(),
        reason,
    })
}

/// Run a constructor, containing failures and panics.
pub fn construct(type_name: &str, constructor: &Constructor) -> BridgeResult<Box<dyn Any + Send>> {
    contain(|| constructor()).map_err(|reason| BridgeError::Construction {
        type_name: type_name.to_string(),
        reason,
    })
}

/// Run module code, turning a panic into a failure message.
pub(crate) fn contain<T>(f: impl FnOnce() -> Result<T, String>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
