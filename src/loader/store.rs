// Rule stores: a directory of JSON documents, or an in-memory list

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use super::{PluginRecord, PluginStore};
use crate::errors::LoadError;

/// Only the fields selection needs. Anything else, including a document that
/// does not parse at all, is left for the decoder to reject.
#[derive(Deserialize)]
struct Meta {
    #[serde(default)]
    vul_id: String,
    #[serde(default)]
    affects: String,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

fn record(json: Vec<u8>, fallback_id: &str) -> PluginRecord {
    let meta = serde_json::from_slice::<Meta>(&json).unwrap_or(Meta {
        vul_id: String::new(),
        affects: String::new(),
        enabled: true,
    });
    let vul_id = if meta.vul_id.trim().is_empty() {
        fallback_id.to_string()
    } else {
        meta.vul_id
    };
    PluginRecord {
        vul_id,
        affects: meta.affects,
        enabled: meta.enabled,
        json,
    }
}

/// Every `*.json` file below a directory, in file name order.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PluginStore for DirectoryStore {
    fn records(&self) -> Result<Vec<PluginRecord>, LoadError> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| LoadError::Walk {
                path: self.root.display().to_string(),
                msg: e.to_string(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let json = std::fs::read(path)?;
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            debug!(path = %path.display(), "found rule document");
            out.push(record(json, stem));
        }
        Ok(out)
    }
}

/// Records held in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<PluginRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: PluginRecord) {
        self.records.push(record);
    }

    /// Add a raw document, reading its metadata from the JSON itself.
    pub fn insert_json(&mut self, json: Vec<u8>) {
        let fallback = format!("memory-{}", self.records.len());
        self.records.push(record(json, &fallback));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PluginStore for MemoryStore {
    fn records(&self) -> Result<Vec<PluginRecord>, LoadError> {
        Ok(self.records.clone())
    }
}
