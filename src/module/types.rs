//! Module Type System
//!
//! Parameter types a registered member can declare, the values that flow
//! through a call, and the conversions between closures' Rust types and those
//! values.

use std::fmt;

/// Declared type of a member parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// Owned UTF-8 text, passed through verbatim
    Str,
}

impl ParamType {
    /// Convert a call literal into a value of this type.
    ///
    /// Returns `None` if the literal does not parse.
    pub fn coerce(&self, literal: &str) -> Option<Value> {
        let value = match self {
            ParamType::Bool => {
                if literal.eq_ignore_ascii_case("true") {
                    Value::Bool(true)
                } else if literal.eq_ignore_ascii_case("false") {
                    Value::Bool(false)
                } else {
                    return None;
                }
            }
            ParamType::Char => {
                let mut chars = literal.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => return None,
                }
            }
            ParamType::I8 => Value::I8(literal.parse().ok()?),
            ParamType::I16 => Value::I16(literal.parse().ok()?),
            ParamType::I32 => Value::I32(literal.parse().ok()?),
            ParamType::I64 => Value::I64(literal.parse().ok()?),
            ParamType::U8 => Value::U8(literal.parse().ok()?),
            ParamType::U16 => Value::U16(literal.parse().ok()?),
            ParamType::U32 => Value::U32(literal.parse().ok()?),
            ParamType::U64 => Value::U64(literal.parse().ok()?),
            ParamType::F32 => Value::F32(literal.parse().ok()?),
            ParamType::F64 => Value::F64(literal.parse().ok()?),
            ParamType::Str => Value::Str(literal.to_string()),
        };
        Some(value)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Bool => write!(f, "bool"),
            ParamType::Char => write!(f, "char"),
            ParamType::I8 => write!(f, "i8"),
            ParamType::I16 => write!(f, "i16"),
            ParamType::I32 => write!(f, "i32"),
            ParamType::I64 => write!(f, "i64"),
            ParamType::U8 => write!(f, "u8"),
            ParamType::U16 => write!(f, "u16"),
            ParamType::U32 => write!(f, "u32"),
            ParamType::U64 => write!(f, "u64"),
            ParamType::F32 => write!(f, "f32"),
            ParamType::F64 => write!(f, "f64"),
            ParamType::Str => write!(f, "string"),
        }
    }
}

/// A value passed to or returned from a registered member.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value
    Unit,
    Bool(bool),
    Char(char),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
}

impl Value {
    /// Check if this is the unit value
    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => Ok(()),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
        }
    }
}

/// A Rust type usable as a registered member's parameter.
pub trait FromValue: Sized + 'static {
    const PARAM_TYPE: ParamType;

    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! impl_from_value {
    ($($ty:ty => $param:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const PARAM_TYPE: ParamType = ParamType::$param;

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$param(v) => Some(v),
                        _ => None,
                    }
                }
            }

            impl IntoReturn for $ty {
                fn into_return(self) -> Result<Value, String> {
                    Ok(Value::$param(self))
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Str,
}

/// A Rust type usable as a registered member's return value.
///
/// `Err` carries the failure text reported as an invocation failure.
pub trait IntoReturn {
    fn into_return(self) -> Result<Value, String>;
}

impl IntoReturn for () {
    fn into_return(self) -> Result<Value, String> {
        Ok(Value::Unit)
    }
}

impl IntoReturn for &'static str {
    fn into_return(self) -> Result<Value, String> {
        Ok(Value::Str(self.to_string()))
    }
}

impl IntoReturn for Value {
    fn into_return(self) -> Result<Value, String> {
        Ok(self)
    }
}

impl<T: IntoReturn> IntoReturn for Option<T> {
    fn into_return(self) -> Result<Value, String> {
        match self {
            Some(v) => v.into_return(),
            None => Ok(Value::Unit),
        }
    }
}

impl<T: IntoReturn, E: fmt::Display> IntoReturn for Result<T, E> {
    fn into_return(self) -> Result<Value, String> {
        match self {
            Ok(v) => v.into_return(),
            Err(e) => Err(e.to_string()),
        }
    }
}
