//! Loadable units of code and their top-level namespaces
//!
//! A module has a name, an optional source file, and a mutable namespace of
//! top-level bindings. The instrumentor replaces function bindings in place,
//! so every holder of the module sees the wrapped functions afterwards.

use crate::callable::{call_value, CallArgs, NativeFunction};
use crate::value::{lock, Value};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Namespace mutation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("Cannot assign read-only binding {module}.{name}")]
    ReadOnly { module: String, name: String },
}

/// A named unit of code with a top-level namespace
pub struct Module {
    name: String,
    file: Option<PathBuf>,
    namespace: Mutex<BTreeMap<String, Value>>,
    read_only: HashSet<String>,
}

impl Module {
    /// Create an empty module with no source file
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: None,
            namespace: Mutex::new(BTreeMap::new()),
            read_only: HashSet::new(),
        }
    }

    /// Set the source file the module was loaded from
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Add a binding
    pub fn with_binding(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        lock(&self.namespace).insert(name.into(), value.into());
        self
    }

    /// Define a function owned by this module and bind it under its own name
    pub fn define<F>(self, name: &str, params: &[&str], body: F) -> Self
    where
        F: Fn(CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        let function = NativeFunction::new(&self.name, name, params, body);
        self.with_binding(name, function.into_value())
    }

    /// Mark a binding as read-only; later assignments to it fail
    pub fn read_only(mut self, name: impl Into<String>) -> Self {
        self.read_only.insert(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Current value of a binding
    pub fn get(&self, name: &str) -> Option<Value> {
        lock(&self.namespace).get(name).cloned()
    }

    /// Replace (or create) a binding
    pub fn set(&self, name: &str, value: Value) -> Result<(), ModuleError> {
        if self.read_only.contains(name) {
            return Err(ModuleError::ReadOnly {
                module: self.name.clone(),
                name: name.to_string(),
            });
        }
        lock(&self.namespace).insert(name.to_string(), value);
        Ok(())
    }

    /// Binding names, sorted
    pub fn names(&self) -> Vec<String> {
        lock(&self.namespace).keys().cloned().collect()
    }

    /// Snapshot of all bindings, safe to iterate while the namespace changes
    pub fn bindings(&self) -> Vec<(String, Value)> {
        lock(&self.namespace)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether a binding currently records its calls
    pub fn is_instrumented(&self, name: &str) -> bool {
        matches!(self.get(name), Some(Value::Function(f)) if f.is_interceptor())
    }

    /// Call a top-level function by name
    pub fn call(&self, name: &str, args: CallArgs) -> Result<Value> {
        let value = self
            .get(name)
            .ok_or_else(|| anyhow!("module '{}' has no attribute '{}'", self.name, name))?;
        call_value(&value, args)
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("file", &self.file)
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utils() -> Module {
        Module::new("utils")
            .with_file("/ws/src/utils.py")
            .define("double", &["x"], |args| {
                let x = args.get(0, "x").and_then(Value::as_int).unwrap_or(0);
                Ok(Value::Int(x * 2))
            })
            .with_binding("VERSION", "1.0")
    }

    #[test]
    fn test_define_binds_function_owned_by_module() {
        let module = utils();
        let Some(Value::Function(f)) = module.get("double") else {
            panic!("double must be a function");
        };
        assert_eq!(f.owner_module(), Some("utils"));
        assert_eq!(module.file(), Some(Path::new("/ws/src/utils.py")));
    }

    #[test]
    fn test_call_by_name() {
        let module = utils();
        let out = module.call("double", CallArgs::new().arg(21)).unwrap();
        assert_eq!(out.as_int(), Some(42));
    }

    #[test]
    fn test_call_missing_or_non_callable() {
        let module = utils();
        assert!(module.call("missing", CallArgs::new()).is_err());
        let err = module.call("VERSION", CallArgs::new()).unwrap_err();
        assert!(err.to_string().contains("not callable"));
    }

    #[test]
    fn test_read_only_binding_rejects_assignment() {
        let module = utils().read_only("double");
        let err = module.set("double", Value::None).unwrap_err();
        assert_eq!(
            err,
            ModuleError::ReadOnly {
                module: "utils".to_string(),
                name: "double".to_string()
            }
        );
        assert!(module.set("other", Value::None).is_ok());
    }

    #[test]
    fn test_names_sorted() {
        assert_eq!(utils().names(), vec!["VERSION", "double"]);
    }

    #[test]
    fn test_plain_function_not_instrumented() {
        assert!(!utils().is_instrumented("double"));
        assert!(!utils().is_instrumented("VERSION"));
    }
}
