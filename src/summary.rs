//! Reader side of the cache file
//!
//! Condenses a cache file into per-function call counts and, for each
//! recorded parameter slot, how many samples were kept and which JSON kinds
//! they take. This is the view a downstream type-inference pass starts from.

use crate::sample_cache::{read_cache_file, FunctionRecord};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

/// One recorded parameter slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSummary {
    pub index: usize,
    /// Declared name, when the slot is within the recorded signature
    pub name: Option<String>,
    pub samples: usize,
    /// Distinct JSON kinds among the samples, in order of first appearance
    pub kinds: Vec<&'static str>,
}

/// One recorded function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSummary {
    pub name: String,
    pub call_count: u64,
    pub params: Vec<ParamSummary>,
}

/// All functions in a cache file, busiest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSummary {
    pub functions: Vec<FunctionSummary>,
}

impl CacheSummary {
    /// Summarize the cache file at `path`
    ///
    /// Unlike the cache itself, a reader wants to hear about a missing or
    /// malformed file, so both are errors here.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let entries = read_cache_file(path)?
            .with_context(|| format!("Cache file not found: {}", path.display()))?;
        Ok(Self::from_records(&entries))
    }

    /// Summarize in-memory records
    pub fn from_records(entries: &BTreeMap<String, FunctionRecord>) -> Self {
        let mut functions: Vec<FunctionSummary> = entries
            .iter()
            .map(|(name, record)| FunctionSummary::from_record(name, record))
            .collect();

        // Ties keep the name order of the map
        functions.sort_by(|a, b| b.call_count.cmp(&a.call_count));

        Self { functions }
    }

    /// Keep only the named function
    pub fn only(mut self, function_name: &str) -> Self {
        self.functions.retain(|f| f.name == function_name);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn total_calls(&self) -> u64 {
        self.functions.iter().map(|f| f.call_count).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize summary")
    }

    /// Print the human-readable table to stdout
    pub fn print_table(&self) -> Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_table(&mut out)
            .context("Failed to write summary")
    }

    pub fn write_table<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.functions.is_empty() {
            writeln!(out, "No recorded functions.")?;
            return Ok(());
        }

        writeln!(out, "╔════════════════════════════════════════════════════════════════════════════════╗")?;
        writeln!(out, "║  Argument Samples (sorted by call count)                                       ║")?;
        writeln!(out, "╚════════════════════════════════════════════════════════════════════════════════╝")?;
        writeln!(out)?;
        writeln!(out, "{:<50} {:>10} {:>10}", "Function", "Calls", "Params")?;
        writeln!(out, "{}", "─".repeat(72))?;

        for function in &self.functions {
            writeln!(
                out,
                "{:<50} {:>10} {:>10}",
                function.name,
                function.call_count,
                function.params.len()
            )?;
            for param in &function.params {
                let label = match &param.name {
                    Some(name) => format!("[{}] {}", param.index, name),
                    None => format!("[{}]", param.index),
                };
                writeln!(
                    out,
                    "    {:<30} {:>6} samples  {}",
                    label,
                    param.samples,
                    param.kinds.join(" | ")
                )?;
            }
        }

        writeln!(out, "{}", "─".repeat(72))?;
        writeln!(
            out,
            "{} functions, {} calls",
            self.functions.len(),
            self.total_calls()
        )?;
        Ok(())
    }
}

impl FunctionSummary {
    fn from_record(name: &str, record: &FunctionRecord) -> Self {
        let params = record
            .param_data
            .iter()
            .map(|(&index, samples)| {
                let mut kinds: Vec<&'static str> = Vec::new();
                for sample in samples {
                    let kind = json_kind(sample);
                    if !kinds.contains(&kind) {
                        kinds.push(kind);
                    }
                }
                ParamSummary {
                    index,
                    name: record.param_name(index).map(str::to_string),
                    samples: samples.len(),
                    kinds,
                }
            })
            .collect();

        Self {
            name: name.to_string(),
            call_count: record.call_count,
            params,
        }
    }
}

/// Coarse kind of a serialized sample
pub fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(n) if n.is_f64() => "float",
        JsonValue::Number(_) => "int",
        JsonValue::String(_) => "str",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "dict",
    }
}
