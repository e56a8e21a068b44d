//! Runtime constraints and scheduling parameters.
//!
//! Both are wire maps. Their members are only checked when a request is
//! committed, so drafts may carry incomplete or not-yet-valid values; the
//! typed accessors read what is there without failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Resource requirements of the container (`vcpus`, `ram`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeConstraints(BTreeMap<String, Value>);

/// Checked resource requirements, available once a request is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub vcpus: u64,
    pub ram: u64,
    pub keep_cache_ram: Option<u64>,
}

impl RuntimeConstraints {
    pub const VCPUS: &'static str = "vcpus";
    pub const RAM: &'static str = "ram";
    pub const KEEP_CACHE_RAM: &'static str = "keep_cache_ram";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    /// Typed view when `vcpus` and `ram` are positive integers and
    /// `keep_cache_ram`, if present, is too. Otherwise one message per
    /// offending member.
    pub fn resource_limits(&self) -> Result<ResourceLimits, Vec<String>> {
        let mut problems = Vec::new();
        let mut positive = |key: &str, required: bool| -> Option<u64> {
            let value = self.0.get(key);
            if !required && value.is_none() {
                return None;
            }
            let checked = value.and_then(Value::as_u64).filter(|v| *v > 0);
            if checked.is_none() {
                problems.push(format!(
                    "[{}]={} must be a positive integer",
                    key,
                    value.unwrap_or(&Value::Null)
                ));
            }
            checked
        };
        let vcpus = positive(Self::VCPUS, true);
        let ram = positive(Self::RAM, true);
        let keep_cache_ram = positive(Self::KEEP_CACHE_RAM, false);

        match (vcpus, ram) {
            (Some(vcpus), Some(ram)) if problems.is_empty() => Ok(ResourceLimits {
                vcpus,
                ram,
                keep_cache_ram,
            }),
            _ => Err(problems),
        }
    }
}

/// Hints for the execution backend's scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchedulingParameters(BTreeMap<String, Value>);

impl SchedulingParameters {
    pub const PARTITIONS: &'static str = "partitions";
    pub const PREEMPTIBLE: &'static str = "preemptible";
    pub const MAX_RUN_TIME: &'static str = "max_run_time";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    /// Partition names, when present and well-formed.
    pub fn partitions(&self) -> Option<Vec<String>> {
        self.0.get(Self::PARTITIONS)?.as_array()?.iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// The preemptible flag as given. `None` means the caller left it unset.
    pub fn preemptible(&self) -> Option<&Value> {
        self.0.get(Self::PREEMPTIBLE).filter(|v| !v.is_null())
    }

    /// True only when the caller explicitly asked for preemptible capacity.
    pub fn wants_preemptible(&self) -> bool {
        matches!(self.preemptible(), Some(Value::Bool(true)))
    }

    pub fn set_preemptible(&mut self, preemptible: bool) {
        self.0
            .insert(Self::PREEMPTIBLE.to_string(), Value::Bool(preemptible));
    }

    pub fn max_run_time(&self) -> Option<u64> {
        self.0.get(Self::MAX_RUN_TIME).and_then(Value::as_u64)
    }
}
