//! Skim configuration for `tnm analyze --config`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use tnm_core::{EventSelection, ObjectSelection};
use tnm_io::DEFAULT_SAVE_COUNT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkimConfig {
    /// Input tree name.
    #[serde(default = "default_tree")]
    pub tree: String,

    /// Write selected events to the output file (otherwise counts only).
    #[serde(default)]
    pub skim: bool,

    /// Entries per auto-saved row group.
    #[serde(default = "default_save_count")]
    pub save_count: usize,

    /// Stop after this many input entries.
    #[serde(default)]
    pub max_events: Option<usize>,

    /// Scalar input column holding the per-event weight.
    #[serde(default)]
    pub weight_column: Option<String>,

    /// Constant factor applied to every event weight.
    #[serde(default = "default_weight_scale")]
    pub weight_scale: f64,

    /// Object selections, applied in order.
    #[serde(default)]
    pub objects: Vec<ObjectSelection>,
}

fn default_tree() -> String {
    "Events".to_string()
}

fn default_save_count() -> usize {
    DEFAULT_SAVE_COUNT
}

fn default_weight_scale() -> f64 {
    1.0
}

impl Default for SkimConfig {
    fn default() -> Self {
        Self {
            tree: default_tree(),
            skim: false,
            save_count: default_save_count(),
            max_events: None,
            weight_column: None,
            weight_scale: default_weight_scale(),
            objects: Vec::new(),
        }
    }
}

impl SkimConfig {
    pub fn selection(&self) -> EventSelection {
        EventSelection { objects: self.objects.clone() }
    }
}

pub fn read_skim_config(path: &Path) -> Result<SkimConfig> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let cfg: SkimConfig = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        serde_yaml_ng::from_slice(&bytes)?
    };
    if cfg.save_count == 0 {
        anyhow::bail!("save_count must be positive in {}", path.display());
    }
    Ok(cfg)
}
