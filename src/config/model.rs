// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [pipeline]
/// buffer_capacity = 2
/// steps = 4
///
/// [stage.load]
///
/// [stage.train]
/// after = ["load"]
/// buffer_capacity = 4
///
/// [stage.save]
/// after = ["train"]
/// ```
///
/// All sections are optional except that at least one `[stage.<name>]`
/// must exist (checked in `validate`).
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// Global flow-control settings from `[pipeline]`.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// All stages from `[stage.<name>]`, keyed by stage name.
    #[serde(default)]
    pub stage: BTreeMap<String, StageConfig>,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// Default input queue depth of each stage: how many unacknowledged
    /// outputs any single upstream may hold towards it.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: u64,

    /// Optional cap on how many unconsumed readiness signals a stage may
    /// accumulate per upstream. Absent means unbounded: upstreams may run
    /// arbitrarily far ahead, which is the intended asymmetry — only the
    /// downstream direction is truly bounded.
    #[serde(default)]
    pub max_ready: Option<u64>,

    /// How many items to push through the pipeline per run.
    #[serde(default = "default_steps")]
    pub steps: u64,
}

fn default_buffer_capacity() -> u64 {
    2
}

fn default_steps() -> u64 {
    1
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            max_ready: None,
            steps: default_steps(),
        }
    }
}

/// `[stage.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    /// Dependency list: this stage consumes from every stage listed here.
    /// Empty means the stage is a source, fed by the driver.
    #[serde(default)]
    pub after: Vec<String>,

    /// Interceptor variant to instantiate for this stage, looked up in the
    /// registry. Defaults to `"compute"`.
    #[serde(default = "default_kind")]
    pub kind: String,

    /// Per-stage input queue depth; if `None`, falls back to
    /// `pipeline.buffer_capacity`.
    #[serde(default)]
    pub buffer_capacity: Option<u64>,
}

fn default_kind() -> String {
    "compute".to_string()
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            after: Vec::new(),
            kind: default_kind(),
            buffer_capacity: None,
        }
    }
}

impl StageConfig {
    /// Effective input queue depth given the `[pipeline]` default.
    pub fn effective_buffer_capacity(&self, default_capacity: u64) -> u64 {
        self.buffer_capacity.unwrap_or(default_capacity)
    }
}
