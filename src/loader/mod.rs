// Rule loading for pocscan
// Selects raw rule records from a store, decodes them, skips the broken ones

pub mod store;

pub use store::{DirectoryStore, MemoryStore};

use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::LoadError;
use crate::expr::Evaluator;
use crate::poc::{decode_with, Plugin};

/// Which rules a run should use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// One enabled rule by id.
    Single(String),
    /// Several enabled rules by id.
    Multi(Vec<String>),
    /// Enabled rules of one category.
    Affects(String),
    /// Every rule, enabled or not.
    All,
    /// Every enabled rule.
    Enabled,
}

impl Selection {
    /// Build a selection from the CLI's load type and condition string.
    pub fn parse(load_type: &str, conditions: &str) -> Selection {
        match load_type.trim().to_ascii_lowercase().as_str() {
            "single" => Selection::Single(conditions.trim().to_string()),
            "multi" => Selection::Multi(split_conditions(conditions)),
            "affects" => Selection::Affects(conditions.trim().to_string()),
            "all" => Selection::All,
            _ => Selection::Enabled,
        }
    }

    pub fn admits(&self, record: &PluginRecord) -> bool {
        match self {
            Selection::Single(id) => record.enabled && record.vul_id == *id,
            Selection::Multi(ids) => record.enabled && ids.iter().any(|id| *id == record.vul_id),
            Selection::Affects(affects) => record.enabled && record.affects == *affects,
            Selection::All => true,
            Selection::Enabled => record.enabled,
        }
    }
}

/// Comma separated ids, trimmed, empties dropped.
pub fn split_conditions(conditions: &str) -> Vec<String> {
    conditions
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// A stored rule: selection metadata plus the undecoded document.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginRecord {
    pub vul_id: String,
    pub affects: String,
    pub enabled: bool,
    pub json: Vec<u8>,
}

/// Source of rule records.
pub trait PluginStore {
    /// Every record the store holds.
    fn records(&self) -> Result<Vec<PluginRecord>, LoadError>;

    /// Records admitted by `selection`. A `Single` selection that matches
    /// nothing is an error.
    fn query(&self, selection: &Selection) -> Result<Vec<PluginRecord>, LoadError> {
        let picked: Vec<PluginRecord> = self
            .records()?
            .into_iter()
            .filter(|r| selection.admits(r))
            .collect();
        if let Selection::Single(id) = selection {
            if picked.is_empty() {
                return Err(LoadError::NotFound(id.clone()));
            }
        }
        Ok(picked)
    }
}

/// Query `store` and decode what it returns. Documents that fail to decode
/// are logged and left out.
pub fn load_plugins(
    store: &dyn PluginStore,
    selection: &Selection,
    evaluator: &dyn Evaluator,
) -> Result<Vec<Plugin>, LoadError> {
    let records = store.query(selection)?;
    let total = records.len();
    let mut plugins = Vec::with_capacity(total);
    for record in records {
        match decode_with(&record.json, evaluator) {
            Ok(poc) => plugins.push(Plugin {
                vul_id: record.vul_id,
                affects: record.affects,
                enabled: record.enabled,
                poc: Arc::new(poc),
            }),
            Err(e) => warn!(vul_id = %record.vul_id, error = %e, "skipping malformed rule"),
        }
    }
    info!(selected = total, loaded = plugins.len(), "rules loaded");
    Ok(plugins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CelLite;

    fn doc(id: &str, affects: &str, enabled: bool) -> String {
        format!(
            r#"{{"vul_id":"{}","affects":"{}","enabled":{},"sets":[
                {{"request":{{"path":"/"}},"expression":"response.status == 200","terminal":true}}]}}"#,
            id, affects, enabled
        )
    }

    fn store() -> MemoryStore {
        let mut s = MemoryStore::new();
        s.insert_json(doc("poc-a", "server", true).into_bytes());
        s.insert_json(doc("poc-b", "dir", true).into_bytes());
        s.insert_json(doc("poc-c", "server", false).into_bytes());
        s.insert_json(doc("poc-d", "dir", true).into_bytes());
        s
    }

    fn ids(plugins: &[Plugin]) -> Vec<&str> {
        plugins.iter().map(|p| p.vul_id.as_str()).collect()
    }

    fn load(selection: Selection) -> Result<Vec<Plugin>, LoadError> {
        load_plugins(&store(), &selection, &CelLite::new())
    }

    #[test]
    fn parses_selection_modes() {
        assert_eq!(Selection::parse("single", " poc-a "), Selection::Single("poc-a".into()));
        assert_eq!(
            Selection::parse("multi", "poc-a, poc-b ,,poc-d"),
            Selection::Multi(vec!["poc-a".into(), "poc-b".into(), "poc-d".into()])
        );
        assert_eq!(Selection::parse("AFFECTS", "dir"), Selection::Affects("dir".into()));
        assert_eq!(Selection::parse("all", ""), Selection::All);
        assert_eq!(Selection::parse("", "ignored"), Selection::Enabled);
    }

    #[test]
    fn default_selection_is_enabled_rules() {
        assert_eq!(ids(&load(Selection::Enabled).unwrap()), vec!["poc-a", "poc-b", "poc-d"]);
    }

    #[test]
    fn all_includes_disabled_rules() {
        assert_eq!(load(Selection::All).unwrap().len(), 4);
    }

    #[test]
    fn single_requires_an_enabled_match() {
        assert_eq!(ids(&load(Selection::Single("poc-b".into())).unwrap()), vec!["poc-b"]);
        assert!(matches!(
            load(Selection::Single("poc-c".into())),
            Err(LoadError::NotFound(id)) if id == "poc-c"
        ));
    }

    #[test]
    fn multi_uses_every_listed_id() {
        let sel = Selection::parse("multi", "poc-d,poc-a,poc-c,nope");
        assert_eq!(ids(&load(sel).unwrap()), vec!["poc-a", "poc-d"]);
    }

    #[test]
    fn affects_filters_by_category() {
        assert_eq!(ids(&load(Selection::Affects("dir".into())).unwrap()), vec!["poc-b", "poc-d"]);
        assert!(load(Selection::Affects("server".into())).unwrap().len() == 1);
    }

    #[test]
    fn malformed_document_is_skipped() {
        let mut s = MemoryStore::new();
        s.insert_json(doc("good-1", "server", true).into_bytes());
        s.insert(PluginRecord {
            vul_id: "broken".into(),
            affects: "server".into(),
            enabled: true,
            json: br#"{"vul_id":"broken","affects":"server","sets":[{"request":{}}]}"#.to_vec(),
        });
        s.insert_json(doc("good-2", "server", true).into_bytes());
        let plugins = load_plugins(&s, &Selection::Enabled, &CelLite::new()).unwrap();
        assert_eq!(ids(&plugins), vec!["good-1", "good-2"]);
    }

    #[test]
    fn overly_nested_rule_is_skipped() {
        let expr = format!("{}true{}", "(".repeat(200_000), ")".repeat(200_000));
        let mut s = MemoryStore::new();
        s.insert_json(
            format!(
                r#"{{"vul_id":"deep","affects":"server","sets":[
                    {{"request":{{"path":"/"}},"expression":"{}"}}]}}"#,
                expr
            )
            .into_bytes(),
        );
        s.insert_json(doc("good", "server", true).into_bytes());
        let plugins = load_plugins(&s, &Selection::Enabled, &CelLite::new()).unwrap();
        assert_eq!(ids(&plugins), vec!["good"]);
    }
}
