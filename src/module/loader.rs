//! Module Loader
//!
//! Turns a resolved module path into a [`ModuleImage`]: the module's type
//! table plus, for native modules, the library that owns the code behind it.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};

use super::{ModuleBuilder, ModuleDeclaration, ModuleDefinition, ABI_VERSION, DECLARATION_SYMBOL, RUSTC_VERSION};
use crate::dispatch::contain;
use crate::error::{BridgeError, BridgeResult};

/// A module ready to be registered.
pub struct ModuleImage {
    pub definition: ModuleDefinition,
    /// Library backing the definition's thunks, if any
    pub library: Option<Arc<Library>>,
}

impl ModuleImage {
    pub fn in_process(definition: ModuleDefinition) -> Self {
        Self {
            definition,
            library: None,
        }
    }
}

/// Produces module images from files.
///
/// The registry resolves the path and checks that the file exists before
/// calling the loader.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path) -> BridgeResult<ModuleImage>;
}

/// Resolve a module path: absolute paths are kept, relative ones are joined
/// onto `base_dir`.
pub fn resolve_module_path(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Run a module's registration function. A panic fails the load.
fn run_register(path: &Path, register: RegisterFn) -> BridgeResult<ModuleBuilder> {
    let mut builder = ModuleBuilder::new();
    contain(|| {
        register(&mut builder);
        Ok(())
    })
    .map_err(|reason| BridgeError::LoadFailed {
        path: path.to_path_buf(),
        reason: format!("registration {}", reason),
    })?;
    Ok(builder)
}

// =============================================================================
// Native modules
// =============================================================================

/// Loads `cdylib` modules exporting a [`ModuleDeclaration`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl ModuleLoader for NativeLoader {
    fn load(&self, path: &Path) -> BridgeResult<ModuleImage> {
        let load_failed = |reason: String| BridgeError::LoadFailed {
            path: path.to_path_buf(),
            reason,
        };

        // Safety: loading a library runs its initializers. The host trusts
        // the module paths it hands to the bridge.
        let library = unsafe { Library::new(path) }.map_err(|e| load_failed(e.to_string()))?;

        let register = {
            // Safety: the symbol is read as a pointer to the declaration; the
            // ABI and compiler checks below guard the layout of the rest.
            let declaration: Symbol<*const ModuleDeclaration> =
                unsafe { library.get(DECLARATION_SYMBOL) }
                    .map_err(|_| load_failed("missing PLUGBRIDGE_MODULE declaration".to_string()))?;
            let declaration = unsafe { &**declaration };

            if declaration.abi_version != ABI_VERSION {
                return Err(load_failed(format!(
                    "ABI version mismatch: expected {}, found {}",
                    ABI_VERSION, declaration.abi_version
                )));
            }
            if declaration.rustc_version != RUSTC_VERSION {
                return Err(load_failed(format!(
                    "compiler mismatch: host built with '{}', module with '{}'",
                    RUSTC_VERSION, declaration.rustc_version
                )));
            }
            declaration.register
        };

        let library = Arc::new(library);
        let definition = run_register(path, register)?.build_pinned(&library);

        log::debug!(
            "Module {} registered {} type(s)",
            path.display(),
            definition.type_count()
        );

        Ok(ModuleImage {
            definition,
            library: Some(library),
        })
    }
}

// =============================================================================
// In-process modules
// =============================================================================

/// Registration function of a statically linked module
pub type RegisterFn = fn(&mut ModuleBuilder);

/// Serves modules linked into the host, keyed by file name.
///
/// The file still has to exist at the resolved path, so statically linked
/// modules keep the same load/unload contract as native ones.
#[derive(Debug, Default, Clone)]
pub struct StaticLoader {
    modules: HashMap<OsString, RegisterFn>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `register` for any module path whose file name is `file_name`.
    pub fn with_module(mut self, file_name: &str, register: RegisterFn) -> Self {
        self.modules.insert(OsString::from(file_name), register);
        self
    }

    pub fn insert(&mut self, file_name: &str, register: RegisterFn) {
        self.modules.insert(OsString::from(file_name), register);
    }
}

impl ModuleLoader for StaticLoader {
    fn load(&self, path: &Path) -> BridgeResult<ModuleImage> {
        let register = path
            .file_name()
            .and_then(|name| self.modules.get(name))
            .ok_or_else(|| BridgeError::LoadFailed {
                path: path.to_path_buf(),
                reason: "no statically linked module with this file name".to_string(),
            })?;

        Ok(ModuleImage::in_process(run_register(path, *register)?.build()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn register_math(module: &mut ModuleBuilder) {
        module
            .static_class("Math.Ops")
            .static_method("Add", |a: i32, b: i32| a + b);
    }

    #[test]
    fn test_resolve_module_path() {
        let base = Path::new("/opt/host/bin");
        assert_eq!(
            resolve_module_path(Path::new("mods/a.so"), base),
            PathBuf::from("/opt/host/bin/mods/a.so")
        );
        let absolute = std::env::temp_dir().join("b.so");
        assert_eq!(resolve_module_path(&absolute, base), absolute);
    }

    #[test]
    fn test_static_loader() {
        let loader = StaticLoader::new().with_module("math.mod", register_math);
        let image = loader.load(Path::new("/somewhere/math.mod")).unwrap();
        assert!(image.library.is_none());
        assert!(image.definition.find_type("Math.Ops").is_some());

        let err = loader.load(Path::new("/somewhere/other.mod")).err().unwrap();
        assert!(matches!(err, BridgeError::LoadFailed { .. }));
    }

    fn register_panicking(module: &mut ModuleBuilder) {
        module.static_class("Math.Half").static_method("Two", || 2);
        panic!("registration exploded");
    }

    #[test]
    fn test_panicking_registration_fails_load() {
        let loader = StaticLoader::new().with_module("bad.mod", register_panicking);
        let err = loader.load(Path::new("/somewhere/bad.mod")).err().unwrap();
        match err {
            BridgeError::LoadFailed { reason, .. } => {
                assert!(reason.contains("registration exploded"), "{}", reason)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_native_loader_rejects_non_library() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not a shared library").unwrap();

        let err = NativeLoader.load(file.path()).err().unwrap();
        assert!(matches!(err, BridgeError::LoadFailed { .. }));
    }
}
