//! Integration Tests for the C Boundary
//!
//! Drives the exported entry points the way a native host would:
//! - BridgeInitialize from a config file
//! - Lifecycle through the PlugBridge.* management types
//! - Error codes delivered to the host callback
//! - Behavior after BridgeShutdown

use plugbridge::ffi::{self, ErrorCallback};
use plugbridge::result::{read_host_string, HostChar};
use plugbridge::{ErrorKind, MethodResult, ResultKind};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::ptr;
use tempfile::TempDir;

type Sink = Mutex<Vec<i32>>;

lazy_static::lazy_static! {
    static ref SERIAL: Mutex<()> = Mutex::new(());
}

fn host(s: &str) -> Vec<HostChar> {
    #[cfg(windows)]
    {
        s.encode_utf16().chain(Some(0)).collect()
    }
    #[cfg(not(windows))]
    {
        s.bytes().map(|b| b as HostChar).chain(Some(0)).collect()
    }
}

extern "C" fn record(kind: i32, _message: *const HostChar, user_data: *mut c_void) {
    let sink = unsafe { &*(user_data as *const Sink) };
    sink.lock().push(kind);
}

fn install_sink() -> &'static Sink {
    let sink: &'static Sink = Box::leak(Box::new(Mutex::new(Vec::new())));
    ffi::set_error_callback(Some(record as ErrorCallback), sink as *const Sink as *mut c_void);
    sink
}

fn run(call: &str) -> MethodResult {
    let call = host(call);
    let mut out = MethodResult::none();
    unsafe { ffi::run_method(call.as_ptr(), &mut out) };
    out
}

fn write_config(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("plugbridge.toml");
    std::fs::write(&path, body).unwrap();
    path.display().to_string()
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_initialize_and_drive_through_management_types() {
    let _serial = SERIAL.lock();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("junk.so"), b"definitely not a library").unwrap();
    let config = write_config(
        &dir,
        &format!("module_dir = {:?}\n", dir.path().display().to_string()),
    );
    let sink = install_sink();

    assert!(unsafe { ffi::bridge_initialize(host(&config).as_ptr()) });

    let out = run("PlugBridge.Modules.Count()");
    assert_eq!(out.kind, ResultKind::UInt);
    assert_eq!(out.uint, 0);

    unsafe { ffi::load_assembly(host("missing.so").as_ptr()) };
    unsafe { ffi::load_assembly(host("junk.so").as_ptr()) };
    assert_eq!(
        *sink.lock(),
        vec![ErrorKind::NotFound as i32, ErrorKind::LoadFailed as i32]
    );

    let out = run("PlugBridge.Modules.Load(junk.so)");
    assert_eq!(out.kind, ResultKind::None);
    assert!(sink.lock().contains(&(ErrorKind::InvocationFailure as i32)));

    let mut handle = 0;
    let created =
        unsafe { ffi::create_instance_ex(host("PlugBridge.Modules").as_ptr(), &mut handle) };
    assert!(!created);
    assert_eq!(sink.lock().last(), Some(&(ErrorKind::Construction as i32)));

    let out = run("PlugBridge.Instances.Count()");
    assert_eq!(out.kind, ResultKind::UInt);
    assert_eq!(out.uint, 0);

    ffi::bridge_shutdown();
    let out = run("PlugBridge.Modules.Count()");
    assert_eq!(out.kind, ResultKind::None);
    assert_eq!(sink.lock().last(), Some(&(ErrorKind::NotInitialized as i32)));

    ffi::set_error_callback(None, ptr::null_mut());
}

#[test]
fn test_initialize_rejects_bad_config() {
    let _serial = SERIAL.lock();
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "unload_policy = \"sometimes\"\n");

    assert!(!unsafe { ffi::bridge_initialize(host(&config).as_ptr()) });
    assert!(ffi::installed().is_none());

    let missing = dir.path().join("absent.toml").display().to_string();
    assert!(!unsafe { ffi::bridge_initialize(host(&missing).as_ptr()) });
    assert!(ffi::installed().is_none());
}

#[test]
fn test_reinitialize_replaces_bridge() {
    let _serial = SERIAL.lock();
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "management_types = false\n");

    assert!(unsafe { ffi::bridge_initialize(host(&config).as_ptr()) });
    let first = ffi::installed().unwrap();
    assert_eq!(run("PlugBridge.Modules.Count()").kind, ResultKind::None);

    let config = write_config(&dir, "management_types = true\n");
    assert!(unsafe { ffi::bridge_initialize(host(&config).as_ptr()) });
    let second = ffi::installed().unwrap();
    assert!(!std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(run("PlugBridge.Modules.Count()").kind, ResultKind::UInt);

    ffi::bridge_shutdown();
    assert!(ffi::installed().is_none());
}

#[test]
fn test_string_results_are_freed_by_host() {
    let _serial = SERIAL.lock();
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "");
    assert!(unsafe { ffi::bridge_initialize(host(&config).as_ptr()) });

    // Delete returns a bool, which travels as text.
    let out = run("PlugBridge.Instances.Delete(77)");
    assert_eq!(out.kind, ResultKind::String);
    unsafe {
        assert_eq!(read_host_string(out.string).as_deref(), Some("false"));
        ffi::free_result_string(out.string);
        ffi::free_result_string(ptr::null_mut());
    }

    ffi::bridge_shutdown();
}

#[test]
fn test_preload_failures_reach_host_callback() {
    let _serial = SERIAL.lock();
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        &format!(
            "module_dir = {:?}\npreload = [\"absent.so\"]\n",
            dir.path().display().to_string()
        ),
    );
    let sink = install_sink();

    assert!(unsafe { ffi::bridge_initialize(host(&config).as_ptr()) });
    assert_eq!(*sink.lock(), vec![ErrorKind::NotFound as i32]);
    assert_eq!(run("PlugBridge.Modules.Count()").uint, 0);

    ffi::bridge_shutdown();
    ffi::set_error_callback(None, ptr::null_mut());
}
