//! Plugbridge - runtime module host with string-encoded dispatch
//!
//! Loads code modules at runtime, creates objects from them by type name and
//! invokes their methods from call strings such as `Calc.Math.Add(1, 2)`,
//! returning a tagged result that can cross a C ABI boundary.
//!
//! # Features
//!
//! - **Module lifecycle**: load, enumerate and unload modules; unloading
//!   invalidates every type and instance that came from the module
//! - **Name resolution**: members resolve by `(type, member, arity)` across
//!   loaded modules in load order, then an ambient space
//! - **Instance table**: opaque `u32` handles to live objects
//! - **Containment**: failures and panics in module code never unwind into
//!   the host
//! - **C boundary**: `LoadAssembly`, `RunMethod`, `CreateInstance` and
//!   friends, see [`ffi`]
//!
//! # Example
//!
//! ```rust
//! use plugbridge::{Bridge, ResultValue};
//!
//! #[derive(Default)]
//! struct Accumulator {
//!     total: i64,
//! }
//!
//! let bridge = Bridge::builder()
//!     .ambient(|module| {
//!         module
//!             .static_class("Demo.Math")
//!             .static_method("Add", |a: i32, b: i32| a + b);
//!         module
//!             .class::<Accumulator>("Demo.Accumulator")
//!             .constructor(Accumulator::default)
//!             .method("Add", |acc: &mut Accumulator, n: i64| acc.total += n)
//!             .method("Total", |acc: &mut Accumulator| acc.total);
//!     })
//!     .build();
//!
//! assert_eq!(bridge.run_method("Demo.Math.Add(1, 2)"), ResultValue::Int(3));
//!
//! let acc = bridge.instance("Demo.Accumulator").unwrap();
//! acc.call("Add(40)").unwrap();
//! acc.call("Add(2)").unwrap();
//! assert_eq!(acc.call("Total()").unwrap().to_string(), "42");
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  Host (C ABI / Rust) │
//! └──────────┬───────────┘
//!            │ "Ns.Class.Method(args)"
//!            ▼
//! ┌──────────────────────┐      ┌───────────────────┐
//! │   Call Dispatcher    │─────►│  Instance Table   │
//! └──────────┬───────────┘      └───────────────────┘
//!            │ (type, member, arity)
//!            ▼
//! ┌──────────────────────┐      ┌───────────────────┐
//! │   Module Registry    │─────►│  Module Loader    │
//! │ loaded ─► ambient    │      │ native / static   │
//! └──────────┬───────────┘      └───────────────────┘
//!            │ Value
//!            ▼
//! ┌──────────────────────┐
//! │   Result Encoder     │  None | String | Float | UInt | Int
//! └──────────────────────┘
//! ```

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
#[cfg(feature = "boundary")]
pub mod ffi;
pub mod instance;
mod management;
pub mod module;
pub mod result;

pub use bridge::{Bridge, BridgeBuilder, ErrorHook, Instance};
pub use config::{BridgeConfig, ConfigError, UnloadPolicy};
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use instance::Handle;
pub use management::{INSTANCES_TYPE, MODULES_TYPE};
pub use module::{ModuleBuilder, ModuleInfo, ModuleKey, NativeLoader, StaticLoader, Value};
pub use result::{MethodResult, ResultKind, ResultValue};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
