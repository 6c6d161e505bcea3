//! Result Encoder
//!
//! Converts a call's return value into the fixed-shape record the host reads:
//!
//! | Return value      | Kind     | Payload                  |
//! |-------------------|----------|--------------------------|
//! | none / `()`       | `None`   | -                        |
//! | `String`, `&str`  | `String` | host string              |
//! | `f32`             | `Float`  | `float`                  |
//! | `u32`             | `UInt`   | `uint`                   |
//! | `i32`             | `Int`    | `int`                    |
//! | anything else     | `String` | `Display` text           |
//!
//! String payloads are allocated here and owned by the host until it passes
//! them back to `FreeResultString`.

use std::fmt;
use std::ptr;

use crate::module::Value;

/// Character unit of host strings: UTF-16 on Windows, bytes elsewhere.
#[cfg(windows)]
pub type HostChar = u16;

/// Character unit of host strings: UTF-16 on Windows, bytes elsewhere.
#[cfg(not(windows))]
pub type HostChar = std::os::raw::c_char;

/// Discriminant of [`MethodResult`].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    None = 0,
    String = 1,
    Float = 2,
    UInt = 3,
    Int = 4,
}

/// Result record written into host memory.
///
/// Exactly the payload named by `kind` is meaningful; the others are zero.
#[repr(C)]
#[derive(Debug)]
pub struct MethodResult {
    pub string: *mut HostChar,
    pub float: f32,
    pub uint: u32,
    pub int: i32,
    pub kind: ResultKind,
}

impl MethodResult {
    /// The zeroed `None` record
    pub fn none() -> Self {
        Self {
            string: ptr::null_mut(),
            float: 0.0,
            uint: 0,
            int: 0,
            kind: ResultKind::None,
        }
    }
}

impl Default for MethodResult {
    fn default() -> Self {
        Self::none()
    }
}

/// Encoded return value, before it is written across the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    None,
    String(String),
    Float(f32),
    UInt(u32),
    Int(i32),
}

impl ResultValue {
    pub fn kind(&self) -> ResultKind {
        match self {
            ResultValue::None => ResultKind::None,
            ResultValue::String(_) => ResultKind::String,
            ResultValue::Float(_) => ResultKind::Float,
            ResultValue::UInt(_) => ResultKind::UInt,
            ResultValue::Int(_) => ResultKind::Int,
        }
    }

    /// Build the host record, allocating the string payload if any.
    pub fn into_raw(self) -> MethodResult {
        let mut record = MethodResult::none();
        record.kind = self.kind();
        match self {
            ResultValue::None => {}
            ResultValue::String(s) => record.string = alloc_host_string(&s),
            ResultValue::Float(v) => record.float = v,
            ResultValue::UInt(v) => record.uint = v,
            ResultValue::Int(v) => record.int = v,
        }
        record
    }
}

impl From<Value> for ResultValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Unit => ResultValue::None,
            Value::Str(s) => ResultValue::String(s),
            Value::F32(v) => ResultValue::Float(v),
            Value::U32(v) => ResultValue::UInt(v),
            Value::I32(v) => ResultValue::Int(v),
            other => ResultValue::String(other.to_string()),
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::None => write!(f, "none"),
            ResultValue::String(s) => write!(f, "string: {}", s),
            ResultValue::Float(v) => write!(f, "float: {}", v),
            ResultValue::UInt(v) => write!(f, "uint: {}", v),
            ResultValue::Int(v) => write!(f, "int: {}", v),
        }
    }
}

/// Write `value` into `out`. A null `out` discards the value.
///
/// # Safety
///
/// `out` must be null or valid for writing a [`MethodResult`].
pub unsafe fn write_result(out: *mut MethodResult, value: ResultValue) {
    if out.is_null() {
        return;
    }
    ptr::write(out, value.into_raw());
}

fn until_nul(s: &str) -> &str {
    match s.find('\0') {
        Some(end) => &s[..end],
        None => s,
    }
}

// =============================================================================
// Host strings
// =============================================================================

/// Allocate a NUL-terminated host string, truncated at the first interior NUL.
#[cfg(not(windows))]
pub fn alloc_host_string(s: &str) -> *mut HostChar {
    std::ffi::CString::new(until_nul(s))
        .map(std::ffi::CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

/// Allocate a NUL-terminated host string, truncated at the first interior NUL.
#[cfg(windows)]
pub fn alloc_host_string(s: &str) -> *mut HostChar {
    let mut wide: Vec<u16> = until_nul(s).encode_utf16().collect();
    wide.push(0);
    Box::into_raw(wide.into_boxed_slice()) as *mut u16
}

/// Release a string produced by [`alloc_host_string`].
///
/// # Safety
///
/// `ptr` must be null or a pointer returned by [`alloc_host_string`] that has
/// not been freed yet.
#[cfg(not(windows))]
pub unsafe fn free_host_string(ptr: *mut HostChar) {
    if !ptr.is_null() {
        drop(std::ffi::CString::from_raw(ptr));
    }
}

/// Release a string produced by [`alloc_host_string`].
///
/// # Safety
///
/// `ptr` must be null or a pointer returned by [`alloc_host_string`] that has
/// not been freed yet.
#[cfg(windows)]
pub unsafe fn free_host_string(ptr: *mut HostChar) {
    if ptr.is_null() {
        return;
    }
    let len = wide_len(ptr);
    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len + 1)));
}

/// Read a NUL-terminated host string. Invalid sequences are replaced.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated host string.
#[cfg(not(windows))]
pub unsafe fn read_host_string(ptr: *const HostChar) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// Read a NUL-terminated host string. Invalid sequences are replaced.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated host string.
#[cfg(windows)]
pub unsafe fn read_host_string(ptr: *const HostChar) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let units = std::slice::from_raw_parts(ptr, wide_len(ptr));
    Some(String::from_utf16_lossy(units))
}

#[cfg(windows)]
unsafe fn wide_len(ptr: *const u16) -> usize {
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_rules() {
        assert_eq!(ResultValue::from(Value::Unit), ResultValue::None);
        assert_eq!(ResultValue::from(Value::I32(3)), ResultValue::Int(3));
        assert_eq!(ResultValue::from(Value::U32(9)), ResultValue::UInt(9));
        assert_eq!(ResultValue::from(Value::F32(1.5)), ResultValue::Float(1.5));
        assert_eq!(
            ResultValue::from(Value::Str("hi".into())),
            ResultValue::String("hi".into())
        );
        // Everything else travels as its display text.
        assert_eq!(
            ResultValue::from(Value::I64(-12)),
            ResultValue::String("-12".into())
        );
        assert_eq!(
            ResultValue::from(Value::Bool(true)),
            ResultValue::String("true".into())
        );
        assert_eq!(
            ResultValue::from(Value::F64(0.25)),
            ResultValue::String("0.25".into())
        );
    }

    #[test]
    fn test_record_payloads() {
        let record = ResultValue::Int(-5).into_raw();
        assert_eq!(record.kind, ResultKind::Int);
        assert_eq!(record.int, -5);
        assert_eq!(record.uint, 0);
        assert!(record.string.is_null());

        let record = ResultValue::None.into_raw();
        assert_eq!(record.kind, ResultKind::None);
        assert_eq!(record.float, 0.0);
    }

    #[test]
    fn test_string_payload_round_trip() {
        let record = ResultValue::String("hello".into()).into_raw();
        assert_eq!(record.kind, ResultKind::String);
        unsafe {
            assert_eq!(read_host_string(record.string).as_deref(), Some("hello"));
            free_host_string(record.string);
        }
    }

    #[test]
    fn test_string_truncated_at_interior_nul() {
        let ptr = alloc_host_string("abc\0def");
        unsafe {
            assert_eq!(read_host_string(ptr).as_deref(), Some("abc"));
            free_host_string(ptr);
        }
    }

    #[test]
    fn test_write_result_null_discards() {
        unsafe { write_result(ptr::null_mut(), ResultValue::String("lost".into())) };

        let mut record = MethodResult::none();
        unsafe { write_result(&mut record, ResultValue::UInt(11)) };
        assert_eq!(record.kind, ResultKind::UInt);
        assert_eq!(record.uint, 11);
    }

    #[test]
    fn test_display() {
        assert_eq!(ResultValue::Int(3).to_string(), "int: 3");
        assert_eq!(ResultValue::None.to_string(), "none");
    }
}
