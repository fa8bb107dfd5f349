//! Persistent per-parameter sample store
//!
//! The cache maps a fully-qualified function name (`module.function`) to a
//! [`FunctionRecord`]: how often the function was called, its parameter names,
//! and a bounded FIFO of serialized samples per positional parameter index.
//!
//! Lifecycle: loaded once at construction, mutated in memory by every recorded
//! call, written once at shutdown. Nothing here ever fails the host program:
//! load and save problems are reported on stderr and swallowed.
//!
//! # File format
//!
//! ```json
//! {
//!   "utils.add": {
//!     "callCount": 2,
//!     "paramNames": ["a", "b"],
//!     "paramData": { "0": [2, 5], "1": [3, 7] }
//!   }
//! }
//! ```
//!
//! Parameter indices are JSON object keys and therefore strings on disk; they
//! are parsed back to integers on load.

use crate::config::InstrumentConfig;
use crate::diagnostics;
use crate::serializer::ValueSerializer;
use crate::value::Value;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cache handle shared by the instrumentation context and every interceptor
pub type SharedCache = Arc<Mutex<SampleCache>>;

/// Lock the shared cache, recovering it if a recording thread panicked
pub fn lock_cache(cache: &SharedCache) -> MutexGuard<'_, SampleCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything captured for one function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRecord {
    /// Total observed invocations (never reduced by eviction)
    pub call_count: u64,

    /// Parameter names in positional order, last non-empty list wins
    #[serde(default)]
    pub param_names: Vec<String>,

    /// Positional index → samples, oldest first
    #[serde(default)]
    pub param_data: BTreeMap<usize, VecDeque<JsonValue>>,
}

impl FunctionRecord {
    fn new(param_names: &[String]) -> Self {
        Self {
            call_count: 0,
            param_names: param_names.to_vec(),
            param_data: BTreeMap::new(),
        }
    }

    /// Samples captured for a parameter index
    pub fn samples(&self, index: usize) -> Option<&VecDeque<JsonValue>> {
        self.param_data.get(&index)
    }

    /// Name of the parameter at `index`, if known
    pub fn param_name(&self, index: usize) -> Option<&str> {
        self.param_names.get(index).map(String::as_str)
    }

    fn push_sample(&mut self, index: usize, sample: JsonValue, capacity: usize) {
        let samples = self.param_data.entry(index).or_default();
        while samples.len() >= capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    fn enforce_capacity(&mut self, capacity: usize) {
        for samples in self.param_data.values_mut() {
            while samples.len() > capacity {
                samples.pop_front();
            }
        }
    }
}

/// Result of a save attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing recorded; the file on disk was left untouched
    SkippedEmpty,
    /// The cache was written
    Written { functions: usize },
}

/// In-memory sample cache backed by a JSON file
#[derive(Debug)]
pub struct SampleCache {
    path: PathBuf,
    entries: BTreeMap<String, FunctionRecord>,
    /// Function names in first-seen order, mirrored on disk
    order: Vec<String>,
    max_samples: usize,
    serializer: ValueSerializer,
}

impl SampleCache {
    /// Create a cache for `path` and load whatever is already there
    pub fn new(path: impl Into<PathBuf>, max_samples: usize, max_depth: usize) -> Self {
        let mut cache = Self {
            path: path.into(),
            entries: BTreeMap::new(),
            order: Vec::new(),
            max_samples: max_samples.max(1),
            serializer: ValueSerializer::new(max_depth),
        };
        cache.load();
        cache
    }

    /// Create a cache from instrumentation settings
    pub fn from_config(config: &InstrumentConfig) -> Self {
        Self::new(
            &config.cache_file,
            config.max_samples_per_param,
            config.max_depth,
        )
    }

    /// Create a cache handle ready to share with interceptors
    pub fn shared(self) -> SharedCache {
        Arc::new(Mutex::new(self))
    }

    /// Replace the in-memory state with the file contents
    ///
    /// A missing file yields an empty cache. An unreadable file, or one that
    /// is not a JSON object, is reported and also yields an empty cache. Single
    /// records that do not parse are reported and dropped; the rest load.
    pub fn load(&mut self) {
        self.entries.clear();
        self.order.clear();

        match read_ordered_entries(&self.path) {
            Ok(Some(entries)) => {
                for (name, mut record) in entries {
                    record.enforce_capacity(self.max_samples);
                    if self.entries.insert(name.clone(), record).is_none() {
                        self.order.push(name);
                    }
                }
                tracing::debug!(
                    "Loaded {} cached functions from {}",
                    self.entries.len(),
                    self.path.display()
                );
            }
            Ok(None) => {
                tracing::debug!("No cache file at {}", self.path.display());
            }
            Err(e) => {
                diagnostics::report(format!("Failed to load cache: {:#}", e));
            }
        }
    }

    /// Record one invocation
    ///
    /// Positional arguments land at their index. Keyword arguments are looked
    /// up through `param_names` and land at the matching positional index, so
    /// `f(2, 3)` and `f(a=2, b=3)` fill the same slots. A parameter supplied
    /// both ways is recorded twice.
    pub fn record_call(
        &mut self,
        function_name: &str,
        positional: &[Value],
        keywords: &HashMap<String, Value>,
        param_names: &[String],
    ) {
        let samples = capture_samples(&self.serializer, positional, keywords, param_names);
        self.apply_samples(function_name, samples, param_names);
    }

    /// Count one invocation and store samples built by [`capture_samples`]
    pub fn apply_samples(
        &mut self,
        function_name: &str,
        samples: Vec<(usize, JsonValue)>,
        param_names: &[String],
    ) {
        let capacity = self.max_samples;
        if !self.entries.contains_key(function_name) {
            self.order.push(function_name.to_string());
        }
        let record = self
            .entries
            .entry(function_name.to_string())
            .or_insert_with(|| FunctionRecord::new(param_names));

        if !param_names.is_empty() {
            record.param_names = param_names.to_vec();
        }

        record.call_count += 1;

        for (index, sample) in samples {
            record.push_sample(index, sample, capacity);
        }
    }

    /// Persist the cache, reporting any failure instead of returning it
    pub fn save(&self) {
        match self.try_save() {
            Ok(SaveOutcome::Written { functions }) => {
                tracing::debug!(
                    "Saved {} functions to {}",
                    functions,
                    self.path.display()
                );
            }
            Ok(SaveOutcome::SkippedEmpty) => {
                tracing::debug!("Cache empty, leaving {} untouched", self.path.display());
            }
            Err(e) => diagnostics::report(format!("Failed to save cache: {:#}", e)),
        }
    }

    /// Persist the cache
    ///
    /// An empty cache never touches the file, so an early or abnormal exit
    /// cannot wipe samples gathered by a previous run.
    pub fn try_save(&self) -> Result<SaveOutcome> {
        if self.entries.is_empty() {
            return Ok(SaveOutcome::SkippedEmpty);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }
        }

        let mut document = serde_json::Map::with_capacity(self.order.len());
        for name in &self.order {
            if let Some(record) = self.entries.get(name) {
                let value = serde_json::to_value(record)
                    .with_context(|| format!("Failed to serialize record {}", name))?;
                document.insert(name.clone(), value);
            }
        }
        let json = serde_json::to_string_pretty(&JsonValue::Object(document))
            .context("Failed to serialize cache")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        Ok(SaveOutcome::Written {
            functions: self.entries.len(),
        })
    }

    /// Record for a fully-qualified function name
    pub fn get(&self, function_name: &str) -> Option<&FunctionRecord> {
        self.entries.get(function_name)
    }

    /// Names of all recorded functions, in first-seen order
    pub fn function_names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Copy of the whole cache
    pub fn snapshot(&self) -> BTreeMap<String, FunctionRecord> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Serializer used for argument capture
    pub fn serializer(&self) -> ValueSerializer {
        self.serializer
    }
}

/// Serialize the arguments of one invocation into `(index, sample)` pairs
///
/// Positional arguments land at their index. Keyword arguments are looked up
/// through `param_names`. This runs user `Inspect` code, so callers must not
/// hold the cache lock while calling it.
pub fn capture_samples(
    serializer: &ValueSerializer,
    positional: &[Value],
    keywords: &HashMap<String, Value>,
    param_names: &[String],
) -> Vec<(usize, JsonValue)> {
    let mut samples: Vec<(usize, JsonValue)> = positional
        .iter()
        .enumerate()
        .map(|(i, arg)| (i, serializer.serialize(arg)))
        .collect();
    for (i, name) in param_names.iter().enumerate() {
        if let Some(value) = keywords.get(name) {
            samples.push((i, serializer.serialize(value)));
        }
    }
    samples
}

/// Read and parse a cache file
///
/// Returns `Ok(None)` when the file does not exist.
/// Records that fail to parse are reported and skipped.
pub fn read_cache_file(path: &Path) -> Result<Option<BTreeMap<String, FunctionRecord>>> {
    Ok(read_ordered_entries(path)?.map(|entries| entries.into_iter().collect()))
}

fn read_ordered_entries(path: &Path) -> Result<Option<Vec<(String, FunctionRecord)>>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document: JsonValue = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid cache JSON in {}", path.display()))?;
    let JsonValue::Object(map) = document else {
        anyhow::bail!(
            "Invalid cache JSON in {}: expected an object at the top level",
            path.display()
        );
    };

    let mut entries = Vec::with_capacity(map.len());
    for (name, raw) in map {
        match serde_json::from_value::<FunctionRecord>(raw) {
            Ok(record) => entries.push((name, record)),
            Err(e) => {
                diagnostics::report(format!("Dropping unreadable cache entry {}: {}", name, e))
            }
        }
    }

    Ok(Some(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn empty_cache(dir: &TempDir) -> SampleCache {
        SampleCache::new(dir.path().join("cache.json"), 50, 10)
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = empty_cache(&dir);
        assert!(cache.is_empty());
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();
        let cache = SampleCache::new(&path, 50, 10);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_wrong_shape_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, r#"[1, 2, 3]"#).unwrap();
        assert!(SampleCache::new(&path, 50, 10).is_empty());

        fs::write(&path, r#"{"m.f": {"callCount": 1, "paramData": {"x": []}}}"#).unwrap();
        assert!(SampleCache::new(&path, 50, 10).is_empty());
    }

    #[test]
    fn test_record_positional() {
        let dir = TempDir::new().unwrap();
        let mut cache = empty_cache(&dir);
        cache.record_call(
            "m.add",
            &[Value::Int(2), Value::Int(3)],
            &HashMap::new(),
            &names(&["a", "b"]),
        );

        let record = cache.get("m.add").unwrap();
        assert_eq!(record.call_count, 1);
        assert_eq!(record.param_names, vec!["a", "b"]);
        assert_eq!(record.samples(0).unwrap(), &VecDeque::from(vec![json!(2)]));
        assert_eq!(record.samples(1).unwrap(), &VecDeque::from(vec![json!(3)]));
    }

    #[test]
    fn test_keywords_share_positional_slots() {
        let dir = TempDir::new().unwrap();
        let mut cache = empty_cache(&dir);
        let params = names(&["a", "b"]);

        cache.record_call("m.add", &[Value::Int(2), Value::Int(3)], &HashMap::new(), &params);
        let kwargs: HashMap<String, Value> = [
            ("a".to_string(), Value::Int(5)),
            ("b".to_string(), Value::Int(7)),
        ]
        .into_iter()
        .collect();
        cache.record_call("m.add", &[], &kwargs, &params);

        let record = cache.get("m.add").unwrap();
        assert_eq!(record.call_count, 2);
        assert_eq!(record.samples(0).unwrap(), &VecDeque::from(vec![json!(2), json!(5)]));
        assert_eq!(record.samples(1).unwrap(), &VecDeque::from(vec![json!(3), json!(7)]));
    }

    #[test]
    fn test_unknown_keywords_ignored() {
        let dir = TempDir::new().unwrap();
        let mut cache = empty_cache(&dir);
        let kwargs: HashMap<String, Value> =
            [("zzz".to_string(), Value::Int(1))].into_iter().collect();
        cache.record_call("m.f", &[], &kwargs, &names(&["a"]));

        let record = cache.get("m.f").unwrap();
        assert_eq!(record.call_count, 1);
        assert!(record.param_data.is_empty());
    }

    #[test]
    fn test_duplicate_positional_and_keyword_recorded_twice() {
        let dir = TempDir::new().unwrap();
        let mut cache = empty_cache(&dir);
        let kwargs: HashMap<String, Value> =
            [("a".to_string(), Value::Int(9))].into_iter().collect();
        cache.record_call("m.f", &[Value::Int(1)], &kwargs, &names(&["a"]));

        let record = cache.get("m.f").unwrap();
        assert_eq!(record.call_count, 1);
        assert_eq!(record.samples(0).unwrap(), &VecDeque::from(vec![json!(1), json!(9)]));
    }

    #[test]
    fn test_fifo_eviction() {
        let dir = TempDir::new().unwrap();
        let mut cache = empty_cache(&dir);
        let params = names(&["x"]);
        for i in 0..=50 {
            cache.record_call("m.f", &[Value::Int(i)], &HashMap::new(), &params);
        }

        let record = cache.get("m.f").unwrap();
        assert_eq!(record.call_count, 51);
        let expected: VecDeque<JsonValue> = (1..=50).map(|i| json!(i)).collect();
        assert_eq!(record.samples(0).unwrap(), &expected);
    }

    #[test]
    fn test_param_names_last_non_empty_wins() {
        let dir = TempDir::new().unwrap();
        let mut cache = empty_cache(&dir);
        cache.record_call("m.f", &[Value::Int(1)], &HashMap::new(), &[]);
        assert!(cache.get("m.f").unwrap().param_names.is_empty());

        cache.record_call("m.f", &[Value::Int(1)], &HashMap::new(), &names(&["x"]));
        assert_eq!(cache.get("m.f").unwrap().param_names, vec!["x"]);

        cache.record_call("m.f", &[Value::Int(1)], &HashMap::new(), &[]);
        assert_eq!(cache.get("m.f").unwrap().param_names, vec!["x"]);

        cache.record_call("m.f", &[Value::Int(1)], &HashMap::new(), &names(&["y"]));
        assert_eq!(cache.get("m.f").unwrap().param_names, vec!["y"]);
    }

    #[test]
    fn test_save_empty_leaves_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "precious").unwrap();

        let mut cache = SampleCache::new(&path, 50, 10);
        assert!(cache.is_empty());
        assert_eq!(cache.try_save().unwrap(), SaveOutcome::SkippedEmpty);
        cache.save();
        assert_eq!(fs::read_to_string(&path).unwrap(), "precious");

        cache.load();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_empty_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let cache = empty_cache(&dir);
        cache.save();
        assert!(!dir.path().join("cache.json").exists());
    }

    #[test]
    fn test_save_creates_directories_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("cache.json");
        let mut cache = SampleCache::new(&path, 50, 10);
        cache.record_call("m.f", &[Value::str("x")], &HashMap::new(), &names(&["s"]));
        assert_eq!(cache.try_save().unwrap(), SaveOutcome::Written { functions: 1 });

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"callCount\": 1"));
        assert!(text.contains("\"0\": ["));

        let reloaded = SampleCache::new(&path, 50, 10);
        assert_eq!(reloaded.snapshot(), cache.snapshot());
    }

    #[test]
    fn test_save_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let mut cache = SampleCache::new(blocker.join("cache.json"), 50, 10);
        cache.record_call("m.f", &[], &HashMap::new(), &[]);

        assert!(cache.try_save().is_err());
        cache.save();
    }

    #[test]
    fn test_load_trims_oversized_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{"m.f": {"callCount": 9, "paramNames": ["x"], "paramData": {"0": [1, 2, 3, 4]}}}"#,
        )
        .unwrap();

        let cache = SampleCache::new(&path, 2, 10);
        let record = cache.get("m.f").unwrap();
        assert_eq!(record.call_count, 9);
        assert_eq!(record.samples(0).unwrap(), &VecDeque::from(vec![json!(3), json!(4)]));
    }

    #[test]
    fn test_loaded_state_continues_accumulating() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{"m.f": {"callCount": 2, "paramNames": ["x"], "paramData": {"0": [1, 2]}}}"#,
        )
        .unwrap();

        let mut cache = SampleCache::new(&path, 50, 10);
        cache.record_call("m.f", &[Value::Int(3)], &HashMap::new(), &names(&["x"]));
        let record = cache.get("m.f").unwrap();
        assert_eq!(record.call_count, 3);
        assert_eq!(record.param_name(0), Some("x"));
        assert_eq!(
            record.samples(0).unwrap(),
            &VecDeque::from(vec![json!(1), json!(2), json!(3)])
        );
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let dir = TempDir::new().unwrap();
        let mut cache = SampleCache::new(dir.path().join("c.json"), 0, 10);
        assert_eq!(cache.max_samples(), 1);
        cache.record_call("m.f", &[Value::Int(1)], &HashMap::new(), &[]);
        cache.record_call("m.f", &[Value::Int(2)], &HashMap::new(), &[]);
        assert_eq!(
            cache.get("m.f").unwrap().samples(0).unwrap(),
            &VecDeque::from(vec![json!(2)])
        );
    }

    #[test]
    fn test_function_names_first_seen_order() {
        let dir = TempDir::new().unwrap();
        let mut cache = empty_cache(&dir);
        cache.record_call("z.f", &[], &HashMap::new(), &[]);
        cache.record_call("a.g", &[], &HashMap::new(), &[]);
        cache.record_call("z.f", &[], &HashMap::new(), &[]);
        assert_eq!(cache.function_names(), vec!["z.f", "a.g"]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_saved_file_keeps_first_seen_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = SampleCache::new(&path, 50, 10);
        cache.record_call("z.last", &[Value::Int(1)], &HashMap::new(), &names(&["x"]));
        cache.record_call("a.first", &[Value::Int(2)], &HashMap::new(), &names(&["x"]));
        cache.save();

        let text = fs::read_to_string(&path).unwrap();
        let z = text.find("\"z.last\"").unwrap();
        let a = text.find("\"a.first\"").unwrap();
        assert!(z < a);

        // Reloading keeps the file order, new names go last
        let mut reloaded = SampleCache::new(&path, 50, 10);
        assert_eq!(reloaded.function_names(), vec!["z.last", "a.first"]);
        reloaded.record_call("m.middle", &[], &HashMap::new(), &[]);
        assert_eq!(reloaded.function_names(), vec!["z.last", "a.first", "m.middle"]);
    }

    #[test]
    fn test_unreadable_record_dropped_others_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{
                "utils.add": {"callCount": 2, "paramNames": ["a", "b"], "paramData": {"0": [1, 2]}},
                "utils.legacy": {"paramNames": ["x"], "paramData": {"0": ["old"]}}
            }"#,
        )
        .unwrap();

        let mut cache = SampleCache::new(&path, 50, 10);
        assert_eq!(cache.function_names(), vec!["utils.add"]);
        assert_eq!(cache.get("utils.add").unwrap().call_count, 2);
        assert!(cache.get("utils.legacy").is_none());

        cache.record_call("utils.add", &[Value::Int(3)], &HashMap::new(), &names(&["a", "b"]));
        cache.save();

        let reloaded = read_cache_file(&path).unwrap().unwrap();
        assert_eq!(reloaded["utils.add"].call_count, 3);
        assert_eq!(
            reloaded["utils.add"].samples(0).unwrap(),
            &VecDeque::from(vec![json!(1), json!(2), json!(3)])
        );
    }

    #[test]
    fn test_capture_samples_matches_record_call() {
        let dir = TempDir::new().unwrap();
        let mut cache = empty_cache(&dir);
        let params = names(&["a", "b"]);
        let kwargs: HashMap<String, Value> =
            [("b".to_string(), Value::str("k"))].into_iter().collect();

        let samples = capture_samples(&cache.serializer(), &[Value::Int(1)], &kwargs, &params);
        assert_eq!(samples, vec![(0, json!(1)), (1, json!("k"))]);

        cache.apply_samples("m.f", samples, &params);
        let record = cache.get("m.f").unwrap();
        assert_eq!(record.call_count, 1);
        assert_eq!(record.samples(1).unwrap(), &VecDeque::from(vec![json!("k")]));
    }
}
