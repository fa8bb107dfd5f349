//! The call contract shared by plain functions, interceptors, and bound methods
//!
//! A callable takes positional and keyword arguments and returns
//! `anyhow::Result<Value>`. Parameter names are declared when a function is
//! registered; [`Callable::parameters`] may still fail for callables that have
//! no declared signature, and callers must tolerate that.

use crate::value::Value;
use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Signature lookup failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("No signature available for {0}")]
    Unavailable(String),
}

/// Arguments of a single invocation
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    /// Positional arguments, in call order
    pub positional: Vec<Value>,

    /// Keyword arguments by parameter name
    pub keywords: HashMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from positional arguments only
    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            keywords: HashMap::new(),
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Add a keyword argument
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.insert(name.into(), value.into());
        self
    }

    /// Insert a receiver in front of the positional arguments
    pub fn prepend(mut self, receiver: Value) -> Self {
        self.positional.insert(0, receiver);
        self
    }

    /// Resolve a parameter by position, then by name
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional
            .get(index)
            .or_else(|| self.keywords.get(name))
    }

    /// Total number of supplied arguments
    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Something that can be invoked with [`CallArgs`]
pub trait Callable: Send + Sync {
    /// Unqualified name
    fn name(&self) -> &str;

    /// Module that defines this callable, if known
    fn owner_module(&self) -> Option<&str>;

    /// Declared parameter names, in positional order
    fn parameters(&self) -> Result<Vec<String>, SignatureError>;

    /// Invoke with the given arguments
    fn call(&self, args: CallArgs) -> Result<Value>;

    /// Whether this callable already records its calls
    fn is_interceptor(&self) -> bool {
        false
    }
}

type Body = dyn Fn(CallArgs) -> Result<Value> + Send + Sync;

/// A function implemented in Rust and registered with a declared signature
pub struct NativeFunction {
    name: String,
    module: Option<String>,
    params: Option<Vec<String>>,
    body: Box<Body>,
}

impl NativeFunction {
    /// Create a function owned by `module` with the given parameter names
    pub fn new<F>(module: &str, name: &str, params: &[&str], body: F) -> Self
    where
        F: Fn(CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            module: Some(module.to_string()),
            params: Some(params.iter().map(|p| p.to_string()).collect()),
            body: Box::new(body),
        }
    }

    /// Create a function whose signature cannot be introspected
    pub fn without_signature<F>(module: &str, name: &str, body: F) -> Self
    where
        F: Fn(CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            module: Some(module.to_string()),
            params: None,
            body: Box::new(body),
        }
    }

    /// Create a function with no owning module (e.g. a builtin)
    pub fn builtin<F>(name: &str, params: &[&str], body: F) -> Self
    where
        F: Fn(CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            module: None,
            params: Some(params.iter().map(|p| p.to_string()).collect()),
            body: Box::new(body),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Function(Arc::new(self))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("params", &self.params)
            .finish()
    }
}

impl Callable for NativeFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner_module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    fn parameters(&self) -> Result<Vec<String>, SignatureError> {
        self.params
            .clone()
            .ok_or_else(|| SignatureError::Unavailable(self.name.clone()))
    }

    fn call(&self, args: CallArgs) -> Result<Value> {
        (self.body)(args)
    }
}

/// A callable with its receiver already supplied as the first argument
pub struct BoundMethod {
    receiver: Value,
    func: Arc<dyn Callable>,
}

impl BoundMethod {
    pub fn new(receiver: Value, func: Arc<dyn Callable>) -> Self {
        Self { receiver, func }
    }

    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    pub fn function(&self) -> &Arc<dyn Callable> {
        &self.func
    }
}

impl Callable for BoundMethod {
    fn name(&self) -> &str {
        self.func.name()
    }

    fn owner_module(&self) -> Option<&str> {
        self.func.owner_module()
    }

    fn parameters(&self) -> Result<Vec<String>, SignatureError> {
        let mut params = self.func.parameters()?;
        if !params.is_empty() {
            params.remove(0);
        }
        Ok(params)
    }

    fn call(&self, args: CallArgs) -> Result<Value> {
        self.func.call(args.prepend(self.receiver.clone()))
    }
}

/// Method access: without an instance the function itself, with one a bound method
pub fn bind(func: &Arc<dyn Callable>, instance: Option<Value>) -> Value {
    match instance {
        None => Value::Function(Arc::clone(func)),
        Some(receiver) => Value::Function(Arc::new(BoundMethod::new(receiver, Arc::clone(func)))),
    }
}

/// Invoke a value that is expected to be callable
pub fn call_value(value: &Value, args: CallArgs) -> Result<Value> {
    match value {
        Value::Function(func) => func.call(args),
        other => anyhow::bail!("'{}' object is not callable", other.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add() -> NativeFunction {
        NativeFunction::new("calc", "add", &["a", "b"], |args| {
            let a = args.get(0, "a").and_then(Value::as_int).unwrap_or(0);
            let b = args.get(1, "b").and_then(Value::as_int).unwrap_or(0);
            Ok(Value::Int(a + b))
        })
    }

    #[test]
    fn test_call_args_resolution() {
        let args = CallArgs::new().arg(1).kwarg("b", 2);
        assert_eq!(args.get(0, "a").and_then(Value::as_int), Some(1));
        assert_eq!(args.get(1, "b").and_then(Value::as_int), Some(2));
        assert!(args.get(2, "c").is_none());
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_native_function_call_and_signature() {
        let f = add();
        assert_eq!(f.name(), "add");
        assert_eq!(f.owner_module(), Some("calc"));
        assert_eq!(f.parameters().unwrap(), vec!["a", "b"]);
        let result = f.call(CallArgs::new().arg(2).arg(3)).unwrap();
        assert_eq!(result.as_int(), Some(5));
    }

    #[test]
    fn test_without_signature_reports_unavailable() {
        let f = NativeFunction::without_signature("m", "opaque", |_| Ok(Value::None));
        assert_eq!(
            f.parameters(),
            Err(SignatureError::Unavailable("opaque".to_string()))
        );
    }

    #[test]
    fn test_bind_without_instance_returns_function() {
        let func: Arc<dyn Callable> = Arc::new(add());
        match bind(&func, None) {
            Value::Function(f) => assert!(Arc::ptr_eq(&f, &func)),
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_bound_method_prepends_receiver() {
        let func: Arc<dyn Callable> = Arc::new(add());
        let bound = bind(&func, Some(Value::Int(10)));
        let result = call_value(&bound, CallArgs::new().arg(5)).unwrap();
        assert_eq!(result.as_int(), Some(15));

        let Value::Function(bound) = bound else {
            panic!("bind must produce a function");
        };
        assert_eq!(bound.parameters().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_call_value_rejects_non_callables() {
        let err = call_value(&Value::Int(1), CallArgs::new()).unwrap_err();
        assert!(err.to_string().contains("not callable"));
    }
}
