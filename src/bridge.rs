//! Bridge
//!
//! Ties the module registry, instance table and dispatcher together. A
//! [`Bridge`] is an explicit object: hosts construct one with
//! [`BridgeBuilder`], and the C boundary installs one through
//! `BridgeInitialize`.
//!
//! # Locking
//!
//! The registry sits behind an `RwLock` and the instance table behind a
//! `Mutex`; when both are needed the registry is taken first. Both are
//! released before any module code runs. Calls hold the target module's gate
//! shared, and unloading takes it exclusively after retiring the module, so
//! an unload waits for in-flight calls to drain.
//!
//! Module code must not unload its own module from inside a call: the unload
//! would wait on the very call that requested it.

use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::config::{BridgeConfig, UnloadPolicy};
use crate::dispatch::{self, parse_instance_call, parse_static_call};
use crate::error::{BridgeError, BridgeResult};
use crate::instance::{Handle, InstanceEntry, InstanceTable};
use crate::management;
use crate::module::{
    ModuleBuilder, ModuleInfo, ModuleKey, ModuleLoader, ModuleRegistry, NativeLoader,
    StaticMethodDef, TypeDef, Value,
};
use crate::result::ResultValue;

/// Observer for every failed bridge operation
pub type ErrorHook = Arc<dyn Fn(&BridgeError) + Send + Sync>;

/// Builder for [`Bridge`].
pub struct BridgeBuilder {
    config: BridgeConfig,
    loader: Box<dyn ModuleLoader>,
    ambient: ModuleBuilder,
    error_hook: Option<ErrorHook>,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeBuilder {
    /// Builder with the default configuration and the native module loader.
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            loader: Box::new(NativeLoader),
            ambient: ModuleBuilder::new(),
            error_hook: None,
        }
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn loader<L: ModuleLoader + 'static>(mut self, loader: L) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Register types in the ambient space, searched after every loaded
    /// module.
    pub fn ambient<F: FnOnce(&mut ModuleBuilder)>(mut self, register: F) -> Self {
        register(&mut self.ambient);
        self
    }

    /// Install the error hook before anything runs, so preload failures
    /// reach it too.
    pub fn error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&BridgeError) + Send + Sync + 'static,
    {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    /// Build a bridge without the management types, which need a shared
    /// bridge to refer back to.
    pub fn build(self) -> Bridge {
        if self.config.management_types {
            log::debug!("Management types require a shared bridge; skipping them");
        }
        let bridge = Bridge::from_parts(self.config, self.loader, self.ambient, self.error_hook);
        bridge.preload();
        bridge
    }

    /// Build a shared bridge, registering the management types if enabled.
    pub fn build_shared(self) -> Arc<Bridge> {
        let BridgeBuilder {
            config,
            loader,
            mut ambient,
            error_hook,
        } = self;

        let bridge = Arc::new_cyclic(|weak: &Weak<Bridge>| {
            if config.management_types {
                management::register(&mut ambient, weak.clone());
            }
            Bridge::from_parts(config, loader, ambient, error_hook)
        });
        bridge.preload();
        bridge
    }
}

/// Module host: loads modules, creates instances and dispatches calls.
pub struct Bridge {
    config: BridgeConfig,
    registry: RwLock<ModuleRegistry>,
    instances: Mutex<InstanceTable>,
    error_hook: RwLock<Option<ErrorHook>>,
}

impl Bridge {
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    fn from_parts(
        config: BridgeConfig,
        loader: Box<dyn ModuleLoader>,
        ambient: ModuleBuilder,
        error_hook: Option<ErrorHook>,
    ) -> Self {
        let registry = ModuleRegistry::new(loader, config.base_dir(), ambient.build());
        Self {
            config,
            registry: RwLock::new(registry),
            instances: Mutex::new(InstanceTable::new()),
            error_hook: RwLock::new(error_hook),
        }
    }

    fn preload(&self) {
        for path in &self.config.preload {
            if let Err(e) = self.load_module(path) {
                log::error!("Failed to preload {}: {}", path.display(), e);
            }
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // =========================================================================
    // Error hook
    // =========================================================================

    /// Observe every failed operation, including the ones the C boundary
    /// degrades to silence.
    pub fn set_error_hook<F>(&self, hook: F)
    where
        F: Fn(&BridgeError) + Send + Sync + 'static,
    {
        *self.error_hook.write() = Some(Arc::new(hook));
    }

    pub fn clear_error_hook(&self) {
        *self.error_hook.write() = None;
    }

    fn observe<T>(&self, result: BridgeResult<T>) -> BridgeResult<T> {
        if let Err(e) = &result {
            let hook = self.error_hook.read().clone();
            if let Some(hook) = hook {
                hook(e);
            }
        }
        result
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Load a module. Relative paths resolve against the module directory.
    pub fn load_module<P: AsRef<Path>>(&self, path: P) -> BridgeResult<ModuleKey> {
        let result = self.registry.write().load(path.as_ref());
        self.observe(result)
    }

    /// Unload a module, invalidating every instance created from it.
    ///
    /// Returns `Ok(false)` if nothing is loaded at `path`. Under
    /// [`UnloadPolicy::RejectBusy`] fails with `ModuleBusy` while instances
    /// from the module are live; under [`UnloadPolicy::Drain`] waits for
    /// in-flight calls and destroys those instances.
    ///
    /// Must not be called from inside a call into the same module: the
    /// drain would wait on the caller itself.
    pub fn unload_module<P: AsRef<Path>>(&self, path: P) -> BridgeResult<bool> {
        let result = self.unload_inner(path.as_ref());
        self.observe(result)
    }

    fn unload_inner(&self, path: &Path) -> BridgeResult<bool> {
        let (module, purged) = {
            let mut registry = self.registry.write();
            let full_path = registry.resolve_path(path);
            let key = match registry.find_loaded(&full_path) {
                Some(key) => key,
                None => {
                    log::warn!("Unload of a module that is not loaded: {}", full_path.display());
                    return Ok(false);
                }
            };

            let mut instances = self.instances.lock();
            if self.config.unload_policy == UnloadPolicy::RejectBusy {
                let live = instances.count_from(key);
                if live > 0 {
                    return Err(BridgeError::ModuleBusy {
                        path: full_path,
                        live,
                    });
                }
            }

            let purged = instances.purge_module(key);
            (registry.detach(&full_path), purged)
        };

        if let Some(module) = module {
            module.retire();
            log::info!(
                "Module unloaded: {} ({} instance(s) destroyed)",
                module.path().display(),
                purged.len()
            );
        }
        drop(purged);
        Ok(true)
    }

    /// Loaded modules in load order
    pub fn modules(&self) -> Vec<ModuleInfo> {
        self.registry.read().module_infos()
    }

    pub fn module_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Run `f` against the registry under its read lock.
    ///
    /// `f` must not call back into the bridge's module lifecycle.
    pub fn with_registry<R>(&self, f: impl FnOnce(&ModuleRegistry) -> R) -> R {
        f(&self.registry.read())
    }

    pub fn find_type(&self, type_name: &str) -> BridgeResult<Arc<TypeDef>> {
        let result = self
            .registry
            .read()
            .find_type(type_name)
            .map(|resolved| resolved.type_def);
        self.observe(result)
    }

    pub fn find_method(&self, member_path: &str, arity: usize) -> BridgeResult<StaticMethodDef> {
        let result = self
            .registry
            .read()
            .find_method(member_path, arity)
            .map(|resolved| resolved.method);
        self.observe(result)
    }

    // =========================================================================
    // Instances
    // =========================================================================

    /// Create an instance of `type_name` through its zero-argument
    /// constructor.
    ///
    /// The handle counter advances even when creation fails.
    pub fn create_instance(&self, type_name: &str) -> BridgeResult<Handle> {
        let result = self.create_inner(type_name);
        self.observe(result)
    }

    fn create_inner(&self, type_name: &str) -> BridgeResult<Handle> {
        let handle = self.instances.lock().reserve();

        let resolved = self.registry.read().find_type(type_name)?;
        let constructor = resolved
            .type_def
            .constructor()
            .cloned()
            .ok_or_else(|| BridgeError::Construction {
                type_name: type_name.to_string(),
                reason: "no zero-argument constructor".to_string(),
            })?;

        let object = {
            let _gate = resolved.module.enter()?;
            dispatch::construct(type_name, &constructor)?
        };

        let registry = self.registry.read();
        if let Some(key) = resolved.module.key() {
            if !registry.is_current(key) {
                return Err(BridgeError::TypeNotFound(type_name.to_string()));
            }
        }
        self.instances.lock().insert(
            handle,
            InstanceEntry::new(object, resolved.type_def, resolved.module),
        );

        log::debug!("Created instance {} of {}", handle, type_name);
        Ok(handle)
    }

    /// Create an instance that is destroyed when the guard drops.
    pub fn instance(&self, type_name: &str) -> BridgeResult<Instance<'_>> {
        let handle = self.create_instance(type_name)?;
        Ok(Instance {
            bridge: self,
            handle,
        })
    }

    /// Destroy an instance. Unknown handles are ignored.
    ///
    /// Returns whether an instance was removed.
    pub fn destroy_instance(&self, handle: Handle) -> bool {
        let entry = self.instances.lock().remove(handle);
        match entry {
            Some(entry) => {
                log::debug!("Destroyed instance {} of {}", handle, entry.type_def().name());
                true
            }
            None => {
                log::debug!("Destroy of unknown instance {}", handle);
                false
            }
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    /// Invoke `Method(args)` on a live instance.
    pub fn invoke_on(&self, handle: Handle, call: &str) -> BridgeResult<Value> {
        let result = self.invoke_inner(handle, call);
        self.observe(result)
    }

    fn invoke_inner(&self, handle: Handle, call: &str) -> BridgeResult<Value> {
        let entry = {
            let registry = self.registry.read();
            let entry = self
                .instances
                .lock()
                .get(handle)
                .ok_or(BridgeError::HandleNotFound(handle))?;
            if let Some(key) = entry.origin() {
                if !registry.is_current(key) {
                    return Err(BridgeError::HandleNotFound(handle));
                }
            }
            entry
        };

        let parsed = parse_instance_call(call)?;
        let member = format!("{}.{}", entry.type_def().name(), parsed.method);
        let not_found = || BridgeError::MemberNotFound {
            path: member.clone(),
            arity: parsed.arity(),
        };

        let method = entry
            .type_def()
            .find_method(&parsed.method, parsed.arity())
            .ok_or_else(not_found)?;
        let args = dispatch::coerce_args(&method.params, &parsed.args)?;

        let _gate = entry
            .module()
            .enter()
            .map_err(|_| BridgeError::HandleNotFound(handle))?;
        let mut object = entry.object().lock();
        dispatch::invoke_instance(&member, &method.thunk, &mut **object, args)
    }

    /// Invoke on an instance, discarding the outcome.
    ///
    /// Failures are logged at debug level and passed to the error hook.
    pub fn run_instance_method(&self, handle: Handle, call: &str) {
        if let Err(e) = self.invoke_on(handle, call) {
            log::debug!("Instance call on {} dropped: {}", handle, e);
        }
    }

    // =========================================================================
    // Static calls
    // =========================================================================

    /// Dispatch `Ns.Class.Method(args)`.
    pub fn call(&self, call: &str) -> BridgeResult<Value> {
        let result = self.call_inner(call);
        self.observe(result)
    }

    fn call_inner(&self, call: &str) -> BridgeResult<Value> {
        let record = parse_static_call(call)?;
        let member = record.member_path();

        let resolved = self.registry.read().find_method(&member, record.arity())?;
        let args = dispatch::coerce_args(&resolved.method.params, &record.args)?;

        let _gate = resolved.module.enter()?;
        dispatch::invoke_static(&member, &resolved.method.thunk, args)
    }

    /// Dispatch a static call and encode its result.
    ///
    /// Failures produce [`ResultValue::None`], are logged as errors and are
    /// passed to the error hook.
    pub fn run_method(&self, call: &str) -> ResultValue {
        match self.call(call) {
            Ok(value) => ResultValue::from(value),
            Err(e) => {
                log::error!("{}", e);
                ResultValue::None
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Destroy every instance and unload every module, most recent first.
    pub fn shutdown(&self) {
        let (modules, instances) = {
            let mut registry = self.registry.write();
            let instances = self.instances.lock().drain();
            (registry.detach_all(), instances)
        };
        drop(instances);
        for module in &modules {
            module.retire();
        }
        if !modules.is_empty() {
            log::info!("Bridge shut down, {} module(s) unloaded", modules.len());
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// An instance destroyed when dropped.
pub struct Instance<'b> {
    bridge: &'b Bridge,
    handle: Handle,
}

impl<'b> Instance<'b> {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Invoke `Method(args)` on the instance.
    pub fn call(&self, call: &str) -> BridgeResult<Value> {
        self.bridge.invoke_on(self.handle, call)
    }

    /// Give up ownership; the instance stays in the table.
    pub fn into_handle(self) -> Handle {
        let handle = self.handle;
        std::mem::forget(self);
        handle
    }
}

impl Drop for Instance<'_> {
    fn drop(&mut self) {
        self.bridge.destroy_instance(self.handle);
    }
}
