//! Management types
//!
//! Ambient types that expose the bridge's own lifecycle to callers, so a host
//! limited to `RunMethod` can still load modules and manage instances:
//!
//! ```text
//! PlugBridge.Modules.Load(plugins/calc.so)
//! PlugBridge.Modules.Unload(plugins/calc.so)
//! PlugBridge.Modules.Count()
//! PlugBridge.Instances.Create(Calc.Accumulator)   -> uint handle
//! PlugBridge.Instances.Delete(7)
//! PlugBridge.Instances.Count()
//! ```

use std::sync::{Arc, Weak};

use crate::bridge::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::module::ModuleBuilder;

pub const MODULES_TYPE: &str = "PlugBridge.Modules";
pub const INSTANCES_TYPE: &str = "PlugBridge.Instances";

fn upgrade(bridge: &Weak<Bridge>) -> BridgeResult<Arc<Bridge>> {
    bridge.upgrade().ok_or(BridgeError::NotInitialized)
}

/// Register the management types, bound to `bridge`.
pub(crate) fn register(module: &mut ModuleBuilder, bridge: Weak<Bridge>) {
    let load = bridge.clone();
    let unload = bridge.clone();
    let module_count = bridge.clone();
    module
        .static_class(MODULES_TYPE)
        .static_method("Load", move |path: String| -> BridgeResult<()> {
            upgrade(&load)?.load_module(&path).map(|_| ())
        })
        .static_method("Unload", move |path: String| -> BridgeResult<bool> {
            upgrade(&unload)?.unload_module(&path)
        })
        .static_method("Count", move || -> BridgeResult<u32> {
            Ok(upgrade(&module_count)?.module_count() as u32)
        });

    let create = bridge.clone();
    let delete = bridge.clone();
    let instance_count = bridge;
    module
        .static_class(INSTANCES_TYPE)
        .static_method("Create", move |type_name: String| -> BridgeResult<u32> {
            upgrade(&create)?.create_instance(&type_name)
        })
        .static_method("Delete", move |handle: u32| -> BridgeResult<bool> {
            Ok(upgrade(&delete)?.destroy_instance(handle))
        })
        .static_method("Count", move || -> BridgeResult<u32> {
            Ok(upgrade(&instance_count)?.instance_count() as u32)
        });
}
