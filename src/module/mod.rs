//! Module definitions
//!
//! A module publishes its types to the bridge by filling a [`ModuleBuilder`]
//! at load time. Every member is registered as a thunk keyed by
//! `(typeName, memberName, arity)`, so the bridge resolves calls by name
//! without any runtime type introspection.
//!
//! # Example
//!
//! ```rust
//! use plugbridge::module::ModuleBuilder;
//!
//! #[derive(Default)]
//! struct Counter {
//!     total: i64,
//! }
//!
//! let mut module = ModuleBuilder::new();
//! module
//!     .static_class("Demo.Math")
//!     .static_method("Add", |a: i32, b: i32| a + b);
//! module
//!     .class::<Counter>("Demo.Counter")
//!     .constructor(Counter::default)
//!     .method("Add", |c: &mut Counter, n: i64| c.total += n)
//!     .method("Total", |c: &mut Counter| c.total);
//!
//! let definition = module.build();
//! assert!(definition.find_type("Demo.Math").is_some());
//! ```
//!
//! # Native modules
//!
//! A `cdylib` exports its registration function with [`export_module!`]:
//!
//! ```ignore
//! fn register(module: &mut plugbridge::module::ModuleBuilder) {
//!     module.static_class("Calc.Ops").static_method("Mul", |a: i32, b: i32| a * b);
//! }
//!
//! plugbridge::export_module!(register);
//! ```

mod loader;
pub mod registry;
mod types;

pub use loader::{resolve_module_path, ModuleImage, ModuleLoader, NativeLoader, StaticLoader};
pub use registry::{ModuleInfo, ModuleKey, ModuleRegistry, ResolvedMethod, ResolvedType};
pub use types::{FromValue, IntoReturn, ParamType, Value};

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use libloading::Library;

/// Static member thunk: coerced arguments in, value or failure text out.
pub type StaticThunk = Arc<dyn Fn(Vec<Value>) -> Result<Value, String> + Send + Sync>;

/// Instance member thunk: receives the live object as `&mut dyn Any`.
pub type InstanceThunk =
    Arc<dyn Fn(&mut dyn Any, Vec<Value>) -> Result<Value, String> + Send + Sync>;

/// Zero-argument constructor producing a new instance object.
pub type Constructor = Arc<dyn Fn() -> Result<Box<dyn Any + Send>, String> + Send + Sync>;

/// Version of the module declaration layout.
pub const ABI_VERSION: u32 = 1;

/// Compiler that built this crate; native modules must match it.
pub const RUSTC_VERSION: &str = env!("PLUGBRIDGE_RUSTC_VERSION");

/// Name of the exported declaration symbol.
pub const DECLARATION_SYMBOL: &[u8] = b"PLUGBRIDGE_MODULE\0";

/// Declaration exported by a native module under [`DECLARATION_SYMBOL`].
#[repr(C)]
pub struct ModuleDeclaration {
    pub abi_version: u32,
    pub rustc_version: &'static str,
    pub register: fn(&mut ModuleBuilder),
}

/// Export a registration function from a native module.
#[macro_export]
macro_rules! export_module {
    ($register:path) => {
        #[no_mangle]
        pub static PLUGBRIDGE_MODULE: $crate::module::ModuleDeclaration =
            $crate::module::ModuleDeclaration {
                abi_version: $crate::module::ABI_VERSION,
                rustc_version: $crate::module::RUSTC_VERSION,
                register: $register,
            };
    };
}

// =============================================================================
// Definitions
// =============================================================================

/// A registered method.
///
/// Static and instance methods differ only in the thunk they carry, so a
/// static lookup can never yield an instance thunk and vice versa.
#[derive(Clone)]
pub struct MethodDef<F> {
    pub name: String,
    pub params: Vec<ParamType>,
    pub thunk: F,
}

pub type StaticMethodDef = MethodDef<StaticThunk>;
pub type InstanceMethodDef = MethodDef<InstanceThunk>;

impl<F> MethodDef<F> {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl<F> fmt::Debug for MethodDef<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

impl<F> fmt::Display for MethodDef<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")
    }
}

// =============================================================================
// Library pinning
// =============================================================================

/// A callable that keeps the library holding its code mapped.
struct Pinned<T> {
    // Field order is drop order: the callable's drop glue lives in the library.
    inner: T,
    _library: Arc<Library>,
}

impl<T> Pinned<T> {
    fn new(inner: T, library: &Arc<Library>) -> Self {
        Self {
            inner,
            _library: Arc::clone(library),
        }
    }

    fn inner(&self) -> &T {
        &self.inner
    }
}

fn pin_static(thunk: StaticThunk, library: &Arc<Library>) -> StaticThunk {
    let pinned = Pinned::new(thunk, library);
    Arc::new(move |args: Vec<Value>| (pinned.inner())(args))
}

fn pin_instance(thunk: InstanceThunk, library: &Arc<Library>) -> InstanceThunk {
    let pinned = Pinned::new(thunk, library);
    Arc::new(move |target: &mut dyn Any, args: Vec<Value>| (pinned.inner())(target, args))
}

fn pin_constructor(constructor: Constructor, library: &Arc<Library>) -> Constructor {
    let pinned = Pinned::new(constructor, library);
    Arc::new(move || (pinned.inner())())
}

/// A registered type: its constructor and members in registration order.
pub struct TypeDef {
    name: String,
    constructor: Option<Constructor>,
    statics: Vec<StaticMethodDef>,
    methods: Vec<InstanceMethodDef>,
}

impl TypeDef {
    fn new(name: String) -> Self {
        Self {
            name,
            constructor: None,
            statics: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Fully qualified type name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    pub fn static_methods(&self) -> &[StaticMethodDef] {
        &self.statics
    }

    pub fn methods(&self) -> &[InstanceMethodDef] {
        &self.methods
    }

    /// First static method with this name and parameter count
    pub fn find_static(&self, name: &str, arity: usize) -> Option<&StaticMethodDef> {
        self.statics
            .iter()
            .find(|m| m.name == name && m.arity() == arity)
    }

    /// Wrap every callable so it keeps `library` mapped.
    fn pin(&mut self, library: &Arc<Library>) {
        self.constructor = self.constructor.take().map(|c| pin_constructor(c, library));
        for method in &mut self.statics {
            method.thunk = pin_static(Arc::clone(&method.thunk), library);
        }
        for method in &mut self.methods {
            method.thunk = pin_instance(Arc::clone(&method.thunk), library);
        }
    }

    /// First instance method with this name and parameter count
    pub fn find_method(&self, name: &str, arity: usize) -> Option<&InstanceMethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.arity() == arity)
    }
}

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDef")
            .field("name", &self.name)
            .field("constructor", &self.has_constructor())
            .field("statics", &self.statics)
            .field("methods", &self.methods)
            .finish()
    }
}

/// The complete type table of one module.
#[derive(Default)]
pub struct ModuleDefinition {
    types: HashMap<String, Arc<TypeDef>>,
    order: Vec<String>,
}

impl ModuleDefinition {
    pub fn find_type(&self, name: &str) -> Option<&Arc<TypeDef>> {
        self.types.get(name)
    }

    /// Types in registration order
    pub fn types(&self) -> impl Iterator<Item = &Arc<TypeDef>> {
        self.order.iter().filter_map(|name| self.types.get(name))
    }

    pub fn type_count(&self) -> usize {
        self.order.len()
    }
}

impl fmt::Debug for ModuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.order.iter()).finish()
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Collects a module's types during registration.
#[derive(Default)]
pub struct ModuleBuilder {
    types: Vec<TypeDef>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or extend) a type whose instances are `T`.
    pub fn class<T: Any + Send>(&mut self, name: &str) -> ClassBuilder<'_, T> {
        let index = match self.types.iter().position(|t| t.name == name) {
            Some(index) => index,
            None => {
                self.types.push(TypeDef::new(name.to_string()));
                self.types.len() - 1
            }
        };
        ClassBuilder {
            def: &mut self.types[index],
            _instance: PhantomData,
        }
    }

    /// Register (or extend) a type that only carries static methods.
    pub fn static_class(&mut self, name: &str) -> ClassBuilder<'_, ()> {
        self.class::<()>(name)
    }

    /// Build a definition whose callables keep `library` mapped for as long
    /// as any of them, or any clone of them, is alive.
    pub fn build_pinned(mut self, library: &Arc<Library>) -> ModuleDefinition {
        for def in &mut self.types {
            def.pin(library);
        }
        self.build()
    }

    pub fn build(self) -> ModuleDefinition {
        let mut definition = ModuleDefinition::default();
        for def in self.types {
            definition.order.push(def.name.clone());
            definition.types.insert(def.name.clone(), Arc::new(def));
        }
        definition
    }
}

/// Registers the members of one type.
pub struct ClassBuilder<'m, T> {
    def: &'m mut TypeDef,
    _instance: PhantomData<fn() -> T>,
}

impl<'m, T: Any + Send> ClassBuilder<'m, T> {
    /// Set the zero-argument constructor.
    pub fn constructor<F>(self, f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.def.constructor = Some(Arc::new(move || Ok(Box::new(f()) as Box<dyn Any + Send>)));
        self
    }

    /// Set a zero-argument constructor that can fail.
    pub fn try_constructor<F, E>(self, f: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        self.def.constructor = Some(Arc::new(move || {
            f().map(|v| Box::new(v) as Box<dyn Any + Send>)
                .map_err(|e| e.to_string())
        }));
        self
    }

    pub fn static_method<Args, F>(self, name: &str, f: F) -> Self
    where
        F: StaticMethod<Args>,
    {
        self.def.statics.push(MethodDef {
            name: name.to_string(),
            params: F::params(),
            thunk: f.into_thunk(),
        });
        self
    }

    pub fn method<Args, F>(self, name: &str, f: F) -> Self
    where
        F: InstanceMethod<T, Args>,
    {
        self.def.methods.push(MethodDef {
            name: name.to_string(),
            params: F::params(),
            thunk: f.into_thunk(),
        });
        self
    }
}

// =============================================================================
// Closure adapters
// =============================================================================

/// A closure registrable as a static method.
pub trait StaticMethod<Args>: Send + Sync + 'static {
    fn params() -> Vec<ParamType>;
    fn into_thunk(self) -> StaticThunk;
}

/// A closure registrable as an instance method on `T`.
pub trait InstanceMethod<T, Args>: Send + Sync + 'static {
    fn params() -> Vec<ParamType>;
    fn into_thunk(self) -> InstanceThunk;
}

fn next_arg<A: FromValue>(args: &mut std::vec::IntoIter<Value>) -> Result<A, String> {
    let value = args
        .next()
        .ok_or_else(|| "missing argument".to_string())?;
    A::from_value(value).ok_or_else(|| format!("expected {} argument", A::PARAM_TYPE))
}

// Arity 0..=6, one impl per arity
macro_rules! impl_method_adapters {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> StaticMethod<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: IntoReturn,
            $($arg: FromValue,)*
        {
            fn params() -> Vec<ParamType> {
                vec![$($arg::PARAM_TYPE),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_thunk(self) -> StaticThunk {
                Arc::new(move |args: Vec<Value>| {
                    let mut args = args.into_iter();
                    $(let $arg = next_arg::<$arg>(&mut args)?;)*
                    (self)($($arg),*).into_return()
                })
            }
        }

        impl<F, T, R, $($arg,)*> InstanceMethod<T, ($($arg,)*)> for F
        where
            F: Fn(&mut T, $($arg),*) -> R + Send + Sync + 'static,
            T: Any,
            R: IntoReturn,
            $($arg: FromValue,)*
        {
            fn params() -> Vec<ParamType> {
                vec![$($arg::PARAM_TYPE),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_thunk(self) -> InstanceThunk {
                Arc::new(move |target: &mut dyn Any, args: Vec<Value>| {
                    let target = target
                        .downcast_mut::<T>()
                        .ok_or_else(|| "receiver has the wrong type".to_string())?;
                    let mut args = args.into_iter();
                    $(let $arg = next_arg::<$arg>(&mut args)?;)*
                    (self)(target, $($arg),*).into_return()
                })
            }
        }
    };
}

impl_method_adapters!();
impl_method_adapters!(A1);
impl_method_adapters!(A1, A2);
impl_method_adapters!(A1, A2, A3);
impl_method_adapters!(A1, A2, A3, A4);
impl_method_adapters!(A1, A2, A3, A4, A5);
impl_method_adapters!(A1, A2, A3, A4, A5, A6);
