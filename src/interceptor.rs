//! Transparent call recording
//!
//! An [`Interceptor`] stands in for one callable. Every invocation is first
//! offered to the sample cache, then forwarded unchanged; the caller gets back
//! exactly what the wrapped callable returned, errors included. Recording is
//! best-effort: a panic raised while capturing arguments (for instance from a
//! user `Inspect` implementation) is caught and reported, and the call still
//! runs.
//!
//! Arguments are serialized before the cache lock is taken. Capture code may
//! call other instrumented functions, which lock the same cache.

use crate::callable::{bind, CallArgs, Callable, SignatureError};
use crate::diagnostics;
use crate::sample_cache::{capture_samples, lock_cache, SharedCache};
use crate::serializer::ValueSerializer;
use crate::value::Value;
use anyhow::Result;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Recording proxy around a single callable
pub struct Interceptor {
    inner: Arc<dyn Callable>,
    qualified_name: String,
    param_names: Vec<String>,
    serializer: ValueSerializer,
    cache: SharedCache,
}

impl Interceptor {
    /// Wrap `inner`, snapshotting its parameter names once
    ///
    /// A callable without a discoverable signature gets an empty name list;
    /// its positional arguments are still recorded by index.
    pub fn new(inner: Arc<dyn Callable>, qualified_name: &str, cache: SharedCache) -> Self {
        let param_names = match inner.parameters() {
            Ok(names) => names,
            Err(SignatureError::Unavailable(name)) => {
                tracing::debug!("No signature for {}, recording by position only", name);
                Vec::new()
            }
        };

        let serializer = lock_cache(&cache).serializer();
        Self {
            inner,
            qualified_name: qualified_name.to_string(),
            param_names,
            serializer,
            cache,
        }
    }

    /// Fully-qualified name used as the cache key
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// The original callable
    pub fn inner(&self) -> &Arc<dyn Callable> {
        &self.inner
    }

    /// Method access through an owning object
    ///
    /// Without an instance this is the interceptor itself; with one it is a
    /// bound method that supplies the instance as argument 0 and still records.
    pub fn bind(self: &Arc<Self>, instance: Option<Value>) -> Value {
        let func: Arc<dyn Callable> = Arc::clone(self) as Arc<dyn Callable>;
        bind(&func, instance)
    }

    fn record(&self, args: &CallArgs) {
        let captured = catch_unwind(AssertUnwindSafe(|| {
            capture_samples(
                &self.serializer,
                &args.positional,
                &args.keywords,
                &self.param_names,
            )
        }));

        match captured {
            Ok(samples) => {
                lock_cache(&self.cache).apply_samples(
                    &self.qualified_name,
                    samples,
                    &self.param_names,
                );
            }
            Err(payload) => diagnostics::report(format!(
                "Failed to record call to {}: {}",
                self.qualified_name,
                panic_message(payload.as_ref())
            )),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

impl Callable for Interceptor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn owner_module(&self) -> Option<&str> {
        self.inner.owner_module()
    }

    fn parameters(&self) -> Result<Vec<String>, SignatureError> {
        Ok(self.param_names.clone())
    }

    fn call(&self, args: CallArgs) -> Result<Value> {
        self.record(&args);
        self.inner.call(args)
    }

    fn is_interceptor(&self) -> bool {
        true
    }
}
