//! Runtime values passed through instrumented calls
//!
//! `Value` is the closed set of shapes an argument can take: null, scalars,
//! functions, sequences, mappings, and structured objects. Lists and dicts are
//! shared mutable cells, so a graph may contain itself (`d["self"] = d`), which
//! is exactly the kind of input the serializer must survive.
//!
//! Structured objects opt in through the [`Inspect`] capability instead of
//! reflection: an object that can enumerate its attributes gets captured as a
//! mapping, anything else falls back to its display form.

use crate::callable::Callable;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Nesting depth used by `Display`/`Debug` before eliding with `...`
const REPR_DEPTH: usize = 4;

/// Shared, mutable list storage
pub type ListCell = Arc<Mutex<Vec<Value>>>;

/// Shared, mutable dict storage (insertion ordered key/value pairs)
pub type DictCell = Arc<Mutex<Vec<(Value, Value)>>>;

/// Capability for objects that expose a public attribute set
///
/// Implementors decide what "attributes" means for their type. Returning
/// `None` from [`Inspect::attributes`] marks the object as opaque, so it is
/// captured through [`Inspect::describe`] instead.
pub trait Inspect: Send + Sync {
    /// Type name used in the default description
    fn type_name(&self) -> &str;

    /// Attribute name/value pairs, private ones included (the serializer filters them)
    fn attributes(&self) -> Option<Vec<(String, Value)>> {
        None
    }

    /// Whether the object can be called like a function
    fn is_callable(&self) -> bool {
        false
    }

    /// Display form, used as the fallback capture
    fn describe(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} object>", self.type_name())
    }
}

/// A runtime value
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Function(Arc<dyn Callable>),
    List(ListCell),
    Tuple(Arc<[Value]>),
    Dict(DictCell),
    Object(Arc<dyn Inspect>),
}

/// Lock a cell, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(cell: &Mutex<T>) -> MutexGuard<'_, T> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Value {
    /// Build a string value
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Build a new list cell
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(Mutex::new(items.into_iter().collect())))
    }

    /// Build an immutable tuple
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    /// Build a new dict cell from key/value pairs (later duplicates overwrite)
    pub fn dict<K: Into<Value>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let value = Value::Dict(Arc::new(Mutex::new(Vec::new())));
        for (k, v) in pairs {
            value.insert(k, v);
        }
        value
    }

    /// Wrap an inspectable object
    pub fn object(object: impl Inspect + 'static) -> Self {
        Value::Object(Arc::new(object))
    }

    /// Wrap a callable
    pub fn function(callable: impl Callable + 'static) -> Self {
        Value::Function(Arc::new(callable))
    }

    /// Append to a list; returns false for anything that is not a list
    pub fn push(&self, item: Value) -> bool {
        match self {
            Value::List(cell) => {
                lock(cell).push(item);
                true
            }
            _ => false,
        }
    }

    /// Insert into a dict, replacing the value of an equal scalar key
    ///
    /// Returns false for anything that is not a dict.
    pub fn insert(&self, key: impl Into<Value>, item: Value) -> bool {
        let Value::Dict(cell) = self else {
            return false;
        };
        let key = key.into();
        let mut entries = lock(cell);
        match entries.iter_mut().find(|(k, _)| k.same_key(&key)) {
            Some(slot) => slot.1 = item,
            None => entries.push((key, item)),
        }
        true
    }

    /// Look up a dict entry by key
    pub fn get(&self, key: &Value) -> Option<Value> {
        match self {
            Value::Dict(cell) => lock(cell)
                .iter()
                .find(|(k, _)| k.same_key(key))
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    /// Number of items in a list, tuple, or dict
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::List(cell) => Some(lock(cell).len()),
            Value::Tuple(items) => Some(items.len()),
            Value::Dict(cell) => Some(lock(cell).len()),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether the value can be called
    pub fn is_callable(&self) -> bool {
        match self {
            Value::Function(_) => true,
            Value::Object(obj) => obj.is_callable(),
            _ => false,
        }
    }

    /// Short kind name, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Function(_) => "function",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Object(_) => "object",
        }
    }

    /// Key equality for dict lookups: scalars by value, shared cells by identity
    fn same_key(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same_key(y))
            }
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Element snapshot of a list or tuple, taken without holding the lock afterwards
    pub(crate) fn sequence_snapshot(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(cell) => Some(lock(cell).clone()),
            Value::Tuple(items) => Some(items.to_vec()),
            _ => None,
        }
    }

    /// Entry snapshot of a dict
    pub(crate) fn mapping_snapshot(&self) -> Option<Vec<(Value, Value)>> {
        match self {
            Value::Dict(cell) => Some(lock(cell).clone()),
            _ => None,
        }
    }

    fn write_repr(&self, f: &mut fmt::Formatter<'_>, depth: usize, quoted: bool) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) if quoted => write!(f, "'{}'", s),
            Value::Str(s) => f.write_str(s),
            Value::Function(func) => write!(f, "<function {}>", func.name()),
            Value::Object(obj) => obj.describe(f),
            Value::List(_) | Value::Tuple(_) | Value::Dict(_) if depth >= REPR_DEPTH => {
                f.write_str("...")
            }
            Value::List(_) | Value::Tuple(_) => {
                let items = self.sequence_snapshot().unwrap_or_default();
                let (open, close) = if matches!(self, Value::List(_)) {
                    ("[", "]")
                } else {
                    ("(", ")")
                };
                f.write_str(open)?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.write_repr(f, depth + 1, true)?;
                }
                if close == ")" && items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(close)
            }
            Value::Dict(_) => {
                let entries = self.mapping_snapshot().unwrap_or_default();
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    k.write_repr(f, depth + 1, true)?;
                    f.write_str(": ")?;
                    v.write_repr(f, depth + 1, true)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Float text form: integral values keep a trailing `.0`, non-finite values
/// use `nan`/`inf`/`-inf`
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{:?}", x)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_repr(f, 0, false)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_repr(f, 0, true)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::None, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items.into_iter().map(Into::into))
    }
}

/// A plain attribute bag, the common case of a user-defined object
///
/// Attributes can be assigned after construction, so an instance may refer to
/// itself.
pub struct Instance {
    type_name: String,
    attrs: Mutex<Vec<(String, Value)>>,
}

impl Instance {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attrs: Mutex::new(Vec::new()),
        }
    }

    /// Builder-style attribute assignment
    pub fn with_attr(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Assign an attribute, replacing an existing one of the same name
    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        let mut attrs = lock(&self.attrs);
        match attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => attrs.push((name, value)),
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<Value> {
        lock(&self.attrs)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Share the instance as a `Value`
    pub fn into_value(self) -> Value {
        Value::Object(Arc::new(self))
    }
}

impl Inspect for Instance {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn attributes(&self) -> Option<Vec<(String, Value)>> {
        Some(lock(&self.attrs).clone())
    }
}
