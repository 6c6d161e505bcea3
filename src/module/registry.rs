//! Module Registry
//!
//! Owns the loaded modules in a slot arena. Each slot carries a generation
//! counter that is bumped on unload, so a [`ModuleKey`] held by an instance
//! goes stale the moment its module is retired.
//!
//! # Resolution order
//!
//! ```text
//! loaded modules (load order) ──► ambient space
//! ```
//!
//! The first scope that defines a matching member wins.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use libloading::Library;
use parking_lot::{RwLock, RwLockReadGuard};

use super::loader::{resolve_module_path, ModuleImage, ModuleLoader};
use super::{ModuleDefinition, StaticMethodDef, TypeDef};
use crate::error::{BridgeError, BridgeResult};

/// Arena key of a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    index: u32,
    generation: u32,
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// A loaded module (or the ambient space).
pub struct Module {
    key: Option<ModuleKey>,
    path: PathBuf,
    live: AtomicBool,
    /// Held shared by every call into the module, exclusively by unload
    gate: RwLock<()>,
    definition: ModuleDefinition,
    // The definition's callables pin the library themselves; this keeps it
    // mapped for the module's own lifetime.
    _library: Option<Arc<Library>>,
}

impl Module {
    fn new(key: Option<ModuleKey>, path: PathBuf, image: ModuleImage) -> Self {
        Self {
            key,
            path,
            live: AtomicBool::new(true),
            gate: RwLock::new(()),
            definition: image.definition,
            _library: image.library,
        }
    }

    /// Arena key; `None` for the ambient space
    pub fn key(&self) -> Option<ModuleKey> {
        self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn definition(&self) -> &ModuleDefinition {
        &self.definition
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Enter the module for a call.
    ///
    /// Fails once the module has been retired. Recursive so that module code
    /// calling back into its own module cannot deadlock behind a pending
    /// unload.
    pub fn enter(&self) -> BridgeResult<RwLockReadGuard<'_, ()>> {
        let guard = self.gate.read_recursive();
        if !self.is_live() {
            return Err(BridgeError::ModuleNotFound(self.path.clone()));
        }
        Ok(guard)
    }

    /// Mark the module dead and wait for in-flight calls to leave it.
    pub fn retire(&self) {
        self.live.store(false, Ordering::Release);
        drop(self.gate.write());
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("live", &self.is_live())
            .field("types", &self.definition)
            .finish()
    }
}

/// Summary of a loaded module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub key: ModuleKey,
    pub path: PathBuf,
    pub types: Vec<String>,
}

/// A resolved type together with the module that owns it.
#[derive(Clone)]
pub struct ResolvedType {
    pub module: Arc<Module>,
    pub type_def: Arc<TypeDef>,
}

/// A resolved static method together with the module that owns it.
#[derive(Clone)]
pub struct ResolvedMethod {
    pub module: Arc<Module>,
    pub type_def: Arc<TypeDef>,
    pub method: StaticMethodDef,
}

struct Slot {
    generation: u32,
    module: Option<Arc<Module>>,
}

/// The set of loaded modules plus the ambient space.
pub struct ModuleRegistry {
    loader: Box<dyn ModuleLoader>,
    base_dir: PathBuf,
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Live keys in load order
    order: Vec<ModuleKey>,
    ambient: Arc<Module>,
}

impl ModuleRegistry {
    /// Create a registry resolving relative module paths against `base_dir`.
    pub fn new(loader: Box<dyn ModuleLoader>, base_dir: PathBuf, ambient: ModuleDefinition) -> Self {
        Self {
            loader,
            base_dir,
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
            ambient: Arc::new(Module::new(
                None,
                PathBuf::from("<ambient>"),
                ModuleImage::in_process(ambient),
            )),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        resolve_module_path(path, &self.base_dir)
    }

    /// Load the module at `path`.
    ///
    /// Loading a path that is already loaded is a no-op returning the
    /// existing key.
    pub fn load(&mut self, path: &Path) -> BridgeResult<ModuleKey> {
        let full_path = self.resolve_path(path);

        if let Some(existing) = self.find_loaded(&full_path) {
            log::warn!("Module already loaded: {}", full_path.display());
            return Ok(existing);
        }

        if !full_path.is_file() {
            return Err(BridgeError::ModuleNotFound(full_path));
        }

        let image = self.loader.load(&full_path)?;
        let key = self.allocate_key();
        let module = Arc::new(Module::new(Some(key), full_path.clone(), image));
        self.slots[key.index as usize].module = Some(module);
        self.order.push(key);

        log::info!("Module loaded: {} ({})", full_path.display(), key);
        Ok(key)
    }

    /// Detach the module at `path` from the registry.
    ///
    /// The slot's generation advances, so every key into it goes stale. The
    /// returned module still has to be retired by the caller. Returns `None`
    /// if no module is loaded at `path`.
    pub fn detach(&mut self, path: &Path) -> Option<Arc<Module>> {
        let full_path = self.resolve_path(path);
        let key = self.find_loaded(&full_path)?;

        self.order.retain(|k| *k != key);
        let slot = &mut self.slots[key.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        let module = slot.module.take();
        self.free.push(key.index);

        log::info!("Module detached: {} ({})", full_path.display(), key);
        module
    }

    /// Detach every loaded module, most recently loaded first.
    pub fn detach_all(&mut self) -> Vec<Arc<Module>> {
        let paths: Vec<PathBuf> = self
            .modules()
            .iter()
            .rev()
            .map(|m| m.path().to_path_buf())
            .collect();
        paths.iter().filter_map(|p| self.detach(p)).collect()
    }

    /// Key of the loaded module at a resolved path
    pub fn find_loaded(&self, full_path: &Path) -> Option<ModuleKey> {
        self.order
            .iter()
            .copied()
            .find(|key| self.get(*key).map_or(false, |m| m.path() == full_path))
    }

    /// Check that a key still refers to a loaded module
    pub fn is_current(&self, key: ModuleKey) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: ModuleKey) -> Option<&Arc<Module>> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.module.as_ref()
    }

    /// Loaded modules in load order
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.order
            .iter()
            .filter_map(|key| self.get(*key).cloned())
            .collect()
    }

    pub fn module_infos(&self) -> Vec<ModuleInfo> {
        self.order
            .iter()
            .filter_map(|key| self.get(*key))
            .filter_map(|m| {
                Some(ModuleInfo {
                    key: m.key()?,
                    path: m.path().to_path_buf(),
                    types: m.definition().types().map(|t| t.name().to_string()).collect(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ambient(&self) -> &Arc<Module> {
        &self.ambient
    }

    /// Searchable scopes in fallback order
    fn scopes(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.order
            .iter()
            .filter_map(|key| self.get(*key))
            .chain(std::iter::once(&self.ambient))
    }

    /// Resolve a type by fully qualified name.
    pub fn find_type(&self, type_name: &str) -> BridgeResult<ResolvedType> {
        self.scopes()
            .find_map(|module| {
                module
                    .definition()
                    .find_type(type_name)
                    .map(|type_def| ResolvedType {
                        module: Arc::clone(module),
                        type_def: Arc::clone(type_def),
                    })
            })
            .ok_or_else(|| BridgeError::TypeNotFound(type_name.to_string()))
    }

    /// Resolve a static method from `Type.Path.Member` and its arity.
    pub fn find_method(&self, member_path: &str, arity: usize) -> BridgeResult<ResolvedMethod> {
        let not_found = || BridgeError::MemberNotFound {
            path: member_path.to_string(),
            arity,
        };
        let (type_path, member) = member_path.rsplit_once('.').ok_or_else(not_found)?;

        self.scopes()
            .find_map(|module| {
                let type_def = module.definition().find_type(type_path)?;
                let method = type_def.find_static(member, arity)?;
                Some(ResolvedMethod {
                    module: Arc::clone(module),
                    type_def: Arc::clone(type_def),
                    method: method.clone(),
                })
            })
            .ok_or_else(not_found)
    }

    fn allocate_key(&mut self) -> ModuleKey {
        if let Some(index) = self.free.pop() {
            let generation = self.slots[index as usize].generation;
            return ModuleKey { index, generation };
        }
        self.slots.push(Slot {
            generation: 0,
            module: None,
        });
        ModuleKey {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("base_dir", &self.base_dir)
            .field("modules", &self.modules())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleBuilder, StaticLoader, Value};
    use tempfile::TempDir;

    fn register_first(module: &mut ModuleBuilder) {
        module
            .static_class("Shared.Greeter")
            .static_method("Hello", || "first");
    }

    fn register_second(module: &mut ModuleBuilder) {
        module
            .static_class("Shared.Greeter")
            .static_method("Hello", || "second")
            .static_method("Bye", || "second-bye");
    }

    fn ambient() -> ModuleDefinition {
        let mut module = ModuleBuilder::new();
        module
            .static_class("Shared.Greeter")
            .static_method("Hello", || "ambient")
            .static_method("Ambient", || "only-ambient");
        module.build()
    }

    fn registry(dir: &TempDir) -> ModuleRegistry {
        for name in ["first.mod", "second.mod"] {
            std::fs::write(dir.path().join(name), b"module").unwrap();
        }
        let loader = StaticLoader::new()
            .with_module("first.mod", register_first)
            .with_module("second.mod", register_second);
        ModuleRegistry::new(Box::new(loader), dir.path().to_path_buf(), ambient())
    }

    fn call(resolved: &ResolvedMethod) -> Value {
        (resolved.method.thunk)(vec![]).unwrap()
    }

    #[test]
    fn test_fallback_order() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);

        let hello = registry.find_method("Shared.Greeter.Hello", 0).unwrap();
        assert_eq!(call(&hello), Value::Str("ambient".into()));

        registry.load(Path::new("second.mod")).unwrap();
        registry.load(Path::new("first.mod")).unwrap();

        let hello = registry.find_method("Shared.Greeter.Hello", 0).unwrap();
        assert_eq!(call(&hello), Value::Str("second".into()));

        // Type found in an earlier scope without the member falls through.
        let ambient_only = registry.find_method("Shared.Greeter.Ambient", 0).unwrap();
        assert_eq!(call(&ambient_only), Value::Str("only-ambient".into()));
        assert!(ambient_only.module.key().is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);
        let err = registry.load(Path::new("missing.mod")).err().unwrap();
        assert!(matches!(err, BridgeError::ModuleNotFound(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_load_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);
        let a = registry.load(Path::new("first.mod")).unwrap();
        let b = registry.load(&dir.path().join("first.mod")).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_detach_bumps_generation() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);

        let key = registry.load(Path::new("first.mod")).unwrap();
        assert!(registry.is_current(key));

        let module = registry.detach(Path::new("first.mod")).unwrap();
        module.retire();
        assert!(!module.is_live());
        assert!(module.enter().is_err());
        assert!(!registry.is_current(key));
        assert!(registry.detach(Path::new("first.mod")).is_none());

        // The slot is reused with a new generation.
        let again = registry.load(Path::new("first.mod")).unwrap();
        assert_ne!(again, key);
        assert!(!registry.is_current(key));
        assert!(registry.is_current(again));
    }

    #[test]
    fn test_enumeration_order_and_types() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);
        registry.load(Path::new("second.mod")).unwrap();
        registry.load(Path::new("first.mod")).unwrap();

        let infos = registry.module_infos();
        assert_eq!(infos.len(), 2);
        assert!(infos[0].path.ends_with("second.mod"));
        assert!(infos[1].path.ends_with("first.mod"));
        assert_eq!(infos[0].types, vec!["Shared.Greeter".to_string()]);

        let detached = registry.detach_all();
        assert_eq!(detached.len(), 2);
        assert!(detached[0].path().ends_with("first.mod"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_type_and_missing_members() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        assert!(registry.find_type("Shared.Greeter").is_ok());
        assert!(matches!(
            registry.find_type("Nope.Type"),
            Err(BridgeError::TypeNotFound(_))
        ));
        assert!(matches!(
            registry.find_method("Shared.Greeter.Hello", 1),
            Err(BridgeError::MemberNotFound { arity: 1, .. })
        ));
        assert!(registry.find_method("NoDot", 0).is_err());
    }
}
