//! C ABI boundary
//!
//! Exposes one process-wide [`Bridge`] to a native host through fixed
//! `extern "C"` entry points:
//!
//! ```text
//! Host (C / C++)
//!       │  BridgeInitialize("plugbridge.toml")
//!       │  LoadAssembly("calc.so")
//!       │  RunMethod("Calc.Math.Add(1, 2)", &result)
//!       ▼
//! ffi (this module) ── catch_unwind around every entry point
//!       │
//!       ▼
//! Bridge ── registry / instance table / dispatcher
//! ```
//!
//! Strings are NUL-terminated in the host encoding (UTF-16 on Windows, UTF-8
//! elsewhere). Nothing here unwinds into the host: failures degrade to a
//! `None` result, a `0` handle or silence, and are reported through the
//! callback installed with `SetErrorCallback`.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::result::{self, HostChar, MethodResult, ResultValue};

/// Host error callback: error kind code, message, user data.
///
/// `message` is a NUL-terminated host string owned by the bridge and freed as
/// soon as the callback returns. Hosts that need it later must copy it.
pub type ErrorCallback = extern "C" fn(kind: i32, message: *const HostChar, user_data: *mut c_void);

#[derive(Clone, Copy)]
struct HostCallback {
    callback: ErrorCallback,
    user_data: usize,
}

lazy_static::lazy_static! {
    static ref BRIDGE: RwLock<Option<Arc<Bridge>>> = RwLock::new(None);
    static ref CALLBACK: RwLock<Option<HostCallback>> = RwLock::new(None);
}

/// Install `bridge` as the process-wide bridge used by the entry points.
///
/// Replaces the bridge's error hook with one that forwards to the host
/// callback. Returns the previously installed bridge, if any.
pub fn install(bridge: Arc<Bridge>) -> Option<Arc<Bridge>> {
    bridge.set_error_hook(notify_host);
    BRIDGE.write().replace(bridge)
}

/// Remove the process-wide bridge.
pub fn uninstall() -> Option<Arc<Bridge>> {
    BRIDGE.write().take()
}

/// The currently installed bridge
pub fn installed() -> Option<Arc<Bridge>> {
    BRIDGE.read().clone()
}

fn notify_host(error: &BridgeError) {
    let callback = *CALLBACK.read();
    if let Some(host) = callback {
        let message = result::alloc_host_string(&error.to_string());
        (host.callback)(error.kind() as i32, message, host.user_data as *mut c_void);
        // Safety: allocated just above and not handed out.
        unsafe { result::free_host_string(message) };
    }
}

/// Run an entry point, turning a panic into `fallback`.
fn boundary<T>(entry: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            log::error!("{} panicked; the call was abandoned", entry);
            fallback
        }
    }
}

/// Run `f` against the installed bridge, or report `NotInitialized`.
fn with_bridge<T>(fallback: T, f: impl FnOnce(&Bridge) -> T) -> T {
    match installed() {
        Some(bridge) => f(&bridge),
        None => {
            notify_host(&BridgeError::NotInitialized);
            fallback
        }
    }
}

unsafe fn host_arg(ptr: *const HostChar, what: &'static str) -> Result<String, BridgeError> {
    result::read_host_string(ptr).ok_or(BridgeError::MalformedCall {
        call: String::new(),
        reason: what,
    })
}

/// Report a boundary-level failure that never reached the bridge.
fn reject(error: BridgeError) {
    log::debug!("{}", error);
    notify_host(&error);
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Create and install the process-wide bridge.
///
/// `config_path` may be null, in which case `plugbridge.toml` is searched for
/// from the current directory upward. An existing bridge is shut down and
/// replaced.
///
/// # Safety
///
/// `config_path` must be null or a NUL-terminated host string.
#[export_name = "BridgeInitialize"]
pub unsafe extern "C" fn bridge_initialize(config_path: *const HostChar) -> bool {
    boundary("BridgeInitialize", false, || {
        let _ = env_logger::try_init();

        let loaded = match result::read_host_string(config_path) {
            Some(path) => BridgeConfig::load(&PathBuf::from(path)),
            None => BridgeConfig::load_from_cwd(),
        };
        let config = match loaded {
            Ok(config) => config,
            Err(e) => {
                log::error!("Bridge configuration failed: {}", e);
                return false;
            }
        };

        // Hooked up before preload so preload failures reach the host.
        let bridge = Bridge::builder()
            .config(config)
            .error_hook(notify_host)
            .build_shared();
        if let Some(previous) = install(bridge) {
            previous.shutdown();
        }
        log::info!("Bridge initialized");
        true
    })
}

/// Shut down and remove the process-wide bridge.
#[export_name = "BridgeShutdown"]
pub extern "C" fn bridge_shutdown() {
    boundary("BridgeShutdown", (), || {
        if let Some(bridge) = uninstall() {
            bridge.shutdown();
        }
    })
}

/// Install (or with a null callback, clear) the host error callback.
#[export_name = "SetErrorCallback"]
pub extern "C" fn set_error_callback(callback: Option<ErrorCallback>, user_data: *mut c_void) {
    boundary("SetErrorCallback", (), || {
        *CALLBACK.write() = callback.map(|callback| HostCallback {
            callback,
            user_data: user_data as usize,
        });
    })
}

// =============================================================================
// Modules
// =============================================================================

/// Load a module.
///
/// # Safety
///
/// `path` must be null or a NUL-terminated host string.
#[export_name = "LoadAssembly"]
pub unsafe extern "C" fn load_assembly(path: *const HostChar) {
    boundary("LoadAssembly", (), || {
        let path = match host_arg(path, "null module path") {
            Ok(path) => path,
            Err(e) => return reject(e),
        };
        with_bridge((), |bridge| {
            let _ = bridge.load_module(&path);
        })
    })
}

/// Unload a module. Unknown paths are ignored.
///
/// # Safety
///
/// `path` must be null or a NUL-terminated host string.
#[export_name = "UnloadAssembly"]
pub unsafe extern "C" fn unload_assembly(path: *const HostChar) {
    boundary("UnloadAssembly", (), || {
        let path = match host_arg(path, "null module path") {
            Ok(path) => path,
            Err(e) => return reject(e),
        };
        with_bridge((), |bridge| {
            let _ = bridge.unload_module(&path);
        })
    })
}

// =============================================================================
// Instances
// =============================================================================

/// Create an instance; returns its handle, or `0` on failure.
///
/// # Safety
///
/// `type_name` must be null or a NUL-terminated host string.
#[export_name = "CreateInstance"]
pub unsafe extern "C" fn create_instance(type_name: *const HostChar) -> u32 {
    let mut handle = 0;
    if create_instance_ex(type_name, &mut handle) {
        handle
    } else {
        0
    }
}

/// Create an instance, writing its handle to `handle_out`.
///
/// Returns `false` on failure, leaving `handle_out` untouched.
///
/// # Safety
///
/// `type_name` must be null or a NUL-terminated host string; `handle_out`
/// must be null or valid for writing a `u32`.
#[export_name = "CreateInstanceEx"]
pub unsafe extern "C" fn create_instance_ex(type_name: *const HostChar, handle_out: *mut u32) -> bool {
    boundary("CreateInstanceEx", false, || {
        let type_name = match host_arg(type_name, "null type name") {
            Ok(type_name) => type_name,
            Err(e) => {
                reject(e);
                return false;
            }
        };
        with_bridge(false, |bridge| match bridge.create_instance(&type_name) {
            Ok(handle) => {
                if !handle_out.is_null() {
                    *handle_out = handle;
                }
                true
            }
            Err(_) => false,
        })
    })
}

/// Destroy an instance. Unknown handles are ignored.
#[export_name = "DeleteInstance"]
pub extern "C" fn delete_instance(handle: u32) {
    boundary("DeleteInstance", (), || {
        with_bridge((), |bridge| {
            bridge.destroy_instance(handle);
        })
    })
}

/// Invoke `Method(args)` on an instance, discarding the outcome.
///
/// # Safety
///
/// `call` must be null or a NUL-terminated host string.
#[export_name = "RunInstanceMethod"]
pub unsafe extern "C" fn run_instance_method(handle: u32, call: *const HostChar) {
    boundary("RunInstanceMethod", (), || {
        let call = match host_arg(call, "null call string") {
            Ok(call) => call,
            Err(e) => return reject(e),
        };
        with_bridge((), |bridge| bridge.run_instance_method(handle, &call))
    })
}

// =============================================================================
// Static calls
// =============================================================================

/// Invoke `Ns.Class.Method(args)` and write the encoded result to `out`.
///
/// A `None` record is written on failure; a null `out` discards the result.
///
/// # Safety
///
/// `call` must be null or a NUL-terminated host string; `out` must be null or
/// valid for writing a [`MethodResult`].
#[export_name = "RunMethod"]
pub unsafe extern "C" fn run_method(call: *const HostChar, out: *mut MethodResult) {
    let value = boundary("RunMethod", ResultValue::None, || {
        let call = match host_arg(call, "null call string") {
            Ok(call) => call,
            Err(e) => {
                reject(e);
                return ResultValue::None;
            }
        };
        with_bridge(ResultValue::None, |bridge| bridge.run_method(&call))
    });
    result::write_result(out, value);
}

/// Release a string payload returned in a [`MethodResult`].
///
/// # Safety
///
/// `ptr` must be null or a string payload from `RunMethod` that has not been
/// freed yet.
#[export_name = "FreeResultString"]
pub unsafe extern "C" fn free_result_string(ptr: *mut HostChar) {
    result::free_host_string(ptr);
}
