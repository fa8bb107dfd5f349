//! muestreo - runtime argument sampling for dynamically typed code
//!
//! This library intercepts calls to functions defined inside a workspace,
//! records the values passed to each parameter, and persists a bounded set of
//! JSON samples per parameter for later offline type inference.
//!
//! The host program describes its code through a small dynamic model:
//! [`value::Value`] for runtime values, [`callable::Callable`] for functions,
//! [`module::Module`] for namespaces and [`importer::Importer`] as the load
//! path. [`instrumentation::Instrumentation::install`] hooks an importer so
//! every eligible module has its functions swapped for recording
//! [`interceptor::Interceptor`]s.
//!
//! ```no_run
//! use muestreo::{CallArgs, Importer, InstrumentConfig, Instrumentation, Module, Value};
//!
//! let importer = Importer::new();
//! importer.register(
//!     Module::new("utils")
//!         .with_file("/ws/utils.py")
//!         .define("add", &["a", "b"], |args| {
//!             let a = args.get(0, "a").and_then(Value::as_int).unwrap_or(0);
//!             let b = args.get(1, "b").and_then(Value::as_int).unwrap_or(0);
//!             Ok(Value::Int(a + b))
//!         }),
//! );
//!
//! let guard = Instrumentation::install(
//!     &importer,
//!     InstrumentConfig::new("/ws/.muestreo/cache.json", "/ws"),
//! );
//! let utils = importer.import("utils")?;
//! utils.call("add", CallArgs::new().arg(2).arg(3))?;
//! drop(guard); // writes the cache
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod callable;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod importer;
pub mod instrumentation;
pub mod instrumentor;
pub mod interceptor;
pub mod module;
pub mod sample_cache;
pub mod serializer;
pub mod summary;
pub mod value;

pub use callable::{CallArgs, Callable, NativeFunction};
pub use config::InstrumentConfig;
pub use importer::{ImportError, Importer, LoadHook};
pub use instrumentation::{InstallGuard, Instrumentation};
pub use module::Module;
pub use sample_cache::{FunctionRecord, SampleCache};
pub use value::{Inspect, Instance, Value};
