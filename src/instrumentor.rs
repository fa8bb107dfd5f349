//! Per-module instrumentation decisions
//!
//! Each module passes through `Unseen → Evaluated → {Skipped, Instrumented}`
//! exactly once. Modules outside the workspace, without a source file, or
//! living in artifact caches, test trees or third-party package directories
//! are skipped. In an instrumented module every public top-level function
//! defined by that module is swapped for an [`Interceptor`].

use crate::config::InstrumentConfig;
use crate::diagnostics;
use crate::interceptor::Interceptor;
use crate::module::Module;
use crate::sample_cache::SharedCache;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Why a module was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Built-in or synthetic module without a file on disk
    NoSourceFile,
    /// File is not under the workspace root
    OutsideWorkspace,
    /// File sits in a compiled-artifact cache directory
    CompiledArtifact,
    /// File belongs to test code
    TestCode,
    /// File belongs to an installed third-party package
    ThirdParty,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NoSourceFile => "no source file",
            SkipReason::OutsideWorkspace => "outside workspace root",
            SkipReason::CompiledArtifact => "compiled artifact cache",
            SkipReason::TestCode => "test code",
            SkipReason::ThirdParty => "third-party package",
        };
        f.write_str(text)
    }
}

/// Terminal state of an evaluated module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleState {
    Skipped(SkipReason),
    Instrumented {
        /// Fully-qualified names now routed through interceptors
        wrapped: Vec<String>,
        /// Fully-qualified names whose binding could not be replaced
        failed: Vec<String>,
    },
}

/// Outcome of offering a module to the instrumentor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Module was seen before; nothing happened
    AlreadyProcessed,
    /// Module was evaluated now and reached this state
    Evaluated(ModuleState),
}

/// Path-based module eligibility
#[derive(Debug, Clone)]
pub struct EligibilityRules {
    workspace_root: PathBuf,
    artifact_dirs: Vec<String>,
    test_prefixes: Vec<String>,
    third_party_markers: Vec<String>,
}

impl EligibilityRules {
    pub fn from_config(config: &InstrumentConfig) -> Self {
        Self {
            workspace_root: normalize_path(&config.workspace_root),
            artifact_dirs: config.artifact_dirs.clone(),
            test_prefixes: config.test_prefixes.clone(),
            third_party_markers: config.third_party_markers.clone(),
        }
    }

    /// Normalized absolute workspace root
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Decide whether a module file may be instrumented
    ///
    /// Returns the first reason to skip, or `None` when the file is eligible.
    pub fn classify(&self, file: Option<&Path>) -> Option<SkipReason> {
        let Some(file) = file else {
            return Some(SkipReason::NoSourceFile);
        };

        let path = normalize_path(file);
        let Ok(relative) = path.strip_prefix(&self.workspace_root) else {
            return Some(SkipReason::OutsideWorkspace);
        };

        // Markers only count below the root, so a root like /home/testuser stays usable
        let components: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if components
            .iter()
            .any(|c| self.artifact_dirs.iter().any(|d| c == d))
        {
            return Some(SkipReason::CompiledArtifact);
        }

        if components
            .iter()
            .any(|c| self.test_prefixes.iter().any(|p| c.starts_with(p.as_str())))
        {
            return Some(SkipReason::TestCode);
        }

        if components
            .iter()
            .any(|c| self.third_party_markers.iter().any(|m| c.contains(m.as_str())))
        {
            return Some(SkipReason::ThirdParty);
        }

        None
    }
}

/// Absolute, lexically normalized form of a path (`.` and `..` resolved
/// without touching the filesystem)
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Wraps the functions of eligible modules and remembers every decision
pub struct ModuleInstrumentor {
    rules: EligibilityRules,
    cache: SharedCache,
    processed: HashMap<String, ModuleState>,
}

impl ModuleInstrumentor {
    pub fn new(rules: EligibilityRules, cache: SharedCache) -> Self {
        Self {
            rules,
            cache,
            processed: HashMap::new(),
        }
    }

    pub fn rules(&self) -> &EligibilityRules {
        &self.rules
    }

    /// Evaluate a module once; later calls for the same name do nothing
    pub fn instrument_module(&mut self, module: &Module) -> Evaluation {
        if self.processed.contains_key(module.name()) {
            return Evaluation::AlreadyProcessed;
        }

        let state = match self.rules.classify(module.file()) {
            Some(reason) => {
                tracing::debug!("Skipping module {}: {}", module.name(), reason);
                ModuleState::Skipped(reason)
            }
            None => self.wrap_functions(module),
        };

        self.processed
            .insert(module.name().to_string(), state.clone());
        Evaluation::Evaluated(state)
    }

    fn wrap_functions(&self, module: &Module) -> ModuleState {
        let module_name = module.name();
        let mut wrapped = Vec::new();
        let mut failed = Vec::new();

        for (name, value) in module.bindings() {
            let Value::Function(func) = value else {
                continue;
            };
            if name.starts_with('_') || func.is_interceptor() {
                continue;
            }
            // Re-exported symbols belong to the module that defines them
            if func.owner_module() != Some(module_name) {
                continue;
            }

            let qualified_name = format!("{}.{}", module_name, name);
            let interceptor = Interceptor::new(func, &qualified_name, Arc::clone(&self.cache));
            match module.set(&name, Value::Function(Arc::new(interceptor))) {
                Ok(()) => {
                    tracing::debug!("Instrumented {}", qualified_name);
                    wrapped.push(qualified_name);
                }
                Err(e) => {
                    diagnostics::report(format!("Failed to wrap {}: {}", qualified_name, e));
                    failed.push(qualified_name);
                }
            }
        }

        ModuleState::Instrumented { wrapped, failed }
    }

    /// State of a processed module
    pub fn state(&self, module_name: &str) -> Option<&ModuleState> {
        self.processed.get(module_name)
    }

    pub fn is_processed(&self, module_name: &str) -> bool {
        self.processed.contains_key(module_name)
    }

    /// Number of modules evaluated so far
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }
}
