//! Module registry and load path
//!
//! The host program registers its modules (eagerly, or as deferred loaders)
//! and obtains them through [`Importer::import`]. The first import loads and
//! caches the module; later imports return the cached `Arc<Module>`. After
//! every successful import, first load or cache hit, each installed
//! [`LoadHook`] sees the module. Hooks must be idempotent.

use crate::module::Module;
use crate::value::lock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Import failures
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("No module named '{0}'")]
    ModuleNotFound(String),

    #[error("Failed to load module '{name}': {source}")]
    LoadFailed {
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Observer of module loads
pub trait LoadHook: Send + Sync {
    /// Stable identifier; an importer holds at most one hook per id
    fn id(&self) -> &str;

    /// Called after each successful import of `module`
    fn on_load(&self, module: &Arc<Module>);

    fn as_any(&self) -> &dyn Any;
}

type Loader = dyn Fn() -> anyhow::Result<Module> + Send + Sync;

enum ModuleSource {
    Ready(Module),
    Deferred(Box<Loader>),
}

/// Registry of loadable modules plus the cache of loaded ones
#[derive(Default)]
pub struct Importer {
    sources: Mutex<HashMap<String, ModuleSource>>,
    loaded: Mutex<HashMap<String, Arc<Module>>>,
    hooks: Mutex<Vec<Arc<dyn LoadHook>>>,
}

impl Importer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a module available for import under its own name
    pub fn register(&self, module: Module) {
        let name = module.name().to_string();
        lock(&self.sources).insert(name, ModuleSource::Ready(module));
    }

    /// Make a module available whose construction runs on first import
    ///
    /// A failing loader leaves the module importable, so a later import retries.
    pub fn register_source<F>(&self, name: &str, loader: F)
    where
        F: Fn() -> anyhow::Result<Module> + Send + Sync + 'static,
    {
        lock(&self.sources).insert(name.to_string(), ModuleSource::Deferred(Box::new(loader)));
    }

    /// Import a module by name, loading it on first use
    pub fn import(&self, name: &str) -> Result<Arc<Module>, ImportError> {
        let module = match self.cached(name) {
            Some(module) => module,
            None => self.load(name)?,
        };

        let hooks: Vec<Arc<dyn LoadHook>> = lock(&self.hooks).clone();
        for hook in hooks {
            hook.on_load(&module);
        }

        Ok(module)
    }

    fn cached(&self, name: &str) -> Option<Arc<Module>> {
        lock(&self.loaded).get(name).cloned()
    }

    fn load(&self, name: &str) -> Result<Arc<Module>, ImportError> {
        // Taken out of the map so loaders can import other modules without deadlocking
        let source = lock(&self.sources)
            .remove(name)
            .ok_or_else(|| ImportError::ModuleNotFound(name.to_string()))?;

        let module = match source {
            ModuleSource::Ready(module) => module,
            ModuleSource::Deferred(loader) => match loader() {
                Ok(module) => module,
                Err(source) => {
                    lock(&self.sources).insert(name.to_string(), ModuleSource::Deferred(loader));
                    return Err(ImportError::LoadFailed {
                        name: name.to_string(),
                        source: source.into(),
                    });
                }
            },
        };

        tracing::debug!("Loaded module {}", name);
        let module = Arc::new(module);
        lock(&self.loaded).insert(name.to_string(), Arc::clone(&module));
        Ok(module)
    }

    /// Whether the module has been loaded
    pub fn is_loaded(&self, name: &str) -> bool {
        lock(&self.loaded).contains_key(name)
    }

    /// Names of loaded modules, sorted
    pub fn loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.loaded).keys().cloned().collect();
        names.sort();
        names
    }

    /// Install a hook unless one with the same id is present
    ///
    /// Returns false when a hook with that id was already installed.
    pub fn install_hook(&self, hook: Arc<dyn LoadHook>) -> bool {
        let mut hooks = lock(&self.hooks);
        if hooks.iter().any(|h| h.id() == hook.id()) {
            return false;
        }
        hooks.push(hook);
        true
    }

    pub fn has_hook(&self, id: &str) -> bool {
        lock(&self.hooks).iter().any(|h| h.id() == id)
    }

    /// Installed hook with the given id
    pub fn hook(&self, id: &str) -> Option<Arc<dyn LoadHook>> {
        lock(&self.hooks).iter().find(|h| h.id() == id).cloned()
    }
}
