//! Instrumentation context: one cache, one workspace, one processed set
//!
//! [`Instrumentation::install`] builds the sample cache (loading any previous
//! run), hooks the importer so every imported module is offered to the
//! [`ModuleInstrumentor`], and hands back an [`InstallGuard`]. The cache is
//! written when the guard drops or when [`Instrumentation::shutdown`] runs,
//! whichever comes first; later shutdowns do nothing.

use crate::config::InstrumentConfig;
use crate::diagnostics;
use crate::importer::{Importer, LoadHook};
use crate::instrumentor::{EligibilityRules, Evaluation, ModuleInstrumentor, ModuleState};
use crate::module::Module;
use crate::sample_cache::{lock_cache, FunctionRecord, SampleCache, SharedCache};
use crate::value::lock;
use std::any::Any;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Hook id under which the context registers with an importer
pub const HOOK_ID: &str = "muestreo.instrumentation";

/// Shared state of one instrumentation run
pub struct Instrumentation {
    config: InstrumentConfig,
    cache: SharedCache,
    instrumentor: Mutex<ModuleInstrumentor>,
    shut_down: AtomicBool,
}

impl Instrumentation {
    /// Build a context without attaching it to an importer
    pub fn new(config: InstrumentConfig) -> Self {
        let cache = SampleCache::from_config(&config).shared();
        let rules = EligibilityRules::from_config(&config);
        let instrumentor = ModuleInstrumentor::new(rules, Arc::clone(&cache));

        Self {
            config,
            cache,
            instrumentor: Mutex::new(instrumentor),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Attach instrumentation to `importer`
    ///
    /// Installing twice on the same importer returns the context that is
    /// already in place; `config` is ignored in that case and the returned
    /// guard does not persist on drop, leaving that to the first guard.
    pub fn install(importer: &Importer, config: InstrumentConfig) -> InstallGuard {
        if let Some(existing) = Self::installed(importer) {
            diagnostics::report("Instrumentation already installed, reusing existing context");
            return InstallGuard {
                context: existing,
                persist_on_drop: false,
            };
        }

        let context = Arc::new(Self::new(config));
        let hook = Arc::new(InstrumentationHook {
            context: Arc::clone(&context),
        });

        if !importer.install_hook(hook) {
            // Lost a race against another install; defer to the winner
            if let Some(existing) = Self::installed(importer) {
                return InstallGuard {
                    context: existing,
                    persist_on_drop: false,
                };
            }
        }

        diagnostics::notice(startup_line(&context.config));
        tracing::debug!(
            "Instrumenting workspace {}",
            context.config.workspace_root.display()
        );
        InstallGuard {
            context,
            persist_on_drop: true,
        }
    }

    /// Context currently installed on `importer`
    pub fn installed(importer: &Importer) -> Option<Arc<Instrumentation>> {
        let hook = importer.hook(HOOK_ID)?;
        hook.as_any()
            .downcast_ref::<InstrumentationHook>()
            .map(|h| Arc::clone(&h.context))
    }

    /// Offer a module to the instrumentor
    pub fn instrument(&self, module: &Module) -> Evaluation {
        lock(&self.instrumentor).instrument_module(module)
    }

    /// State reached by a processed module
    pub fn module_state(&self, module_name: &str) -> Option<ModuleState> {
        lock(&self.instrumentor).state(module_name).cloned()
    }

    /// Number of modules evaluated so far
    pub fn processed_count(&self) -> usize {
        lock(&self.instrumentor).processed_count()
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    /// Shared cache handle
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Copy of every record gathered so far
    pub fn snapshot(&self) -> BTreeMap<String, FunctionRecord> {
        lock_cache(&self.cache).snapshot()
    }

    /// Persist the cache once
    ///
    /// Returns true when this call performed the save.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        lock_cache(&self.cache).save();
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

/// Status line printed once a context is installed
fn startup_line(config: &InstrumentConfig) -> String {
    format!("Instrumentation installed. Cache: {}", config.cache_file.display())
}

struct InstrumentationHook {
    context: Arc<Instrumentation>,
}

impl LoadHook for InstrumentationHook {
    fn id(&self) -> &str {
        HOOK_ID
    }

    fn on_load(&self, module: &Arc<Module>) {
        if let Evaluation::Evaluated(ModuleState::Instrumented { wrapped, failed }) =
            self.context.instrument(module)
        {
            tracing::debug!(
                "Module {}: {} wrapped, {} failed",
                module.name(),
                wrapped.len(),
                failed.len()
            );
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Handle returned by [`Instrumentation::install`]
///
/// Dereferences to the context. Dropping the guard persists the cache.
pub struct InstallGuard {
    context: Arc<Instrumentation>,
    persist_on_drop: bool,
}

impl InstallGuard {
    /// Shared handle to the context, independent of the guard's lifetime
    pub fn context(&self) -> Arc<Instrumentation> {
        Arc::clone(&self.context)
    }

    /// Whether dropping this guard writes the cache
    pub fn persists_on_drop(&self) -> bool {
        self.persist_on_drop
    }
}

impl Deref for InstallGuard {
    type Target = Instrumentation;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

impl Drop for InstallGuard {
    fn drop(&mut self) {
        if self.persist_on_drop {
            self.context.shutdown();
        }
    }
}
