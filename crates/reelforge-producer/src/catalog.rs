//! `ProducerCatalog`: maps a producer alias to its provider/model/rate key
//! and any extra synthetic selection/config inputs (§4.4).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ProducerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerCatalogEntry {
    pub provider: String,
    pub provider_model: String,
    pub rate_key: String,
    #[serde(default)]
    pub sdk_mapping: Option<BTreeMap<String, String>>,
    /// Extra per-producer keys whose values are read as synthetic inputs
    /// `Input:<alias>.<key>` (e.g. `provider`, `model`).
    #[serde(default)]
    pub selection_input_keys: Vec<String>,
    /// Extra per-producer config keys, same synthetic-input treatment
    /// (e.g. `temperature`).
    #[serde(default)]
    pub config_input_paths: Vec<String>,
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProducerCatalog {
    entries: BTreeMap<String, ProducerCatalogEntry>,
}

impl ProducerCatalog {
    pub fn builder() -> ProducerCatalogBuilder {
        ProducerCatalogBuilder::default()
    }

    pub fn get(&self, alias: &str) -> Option<&ProducerCatalogEntry> {
        self.entries.get(alias)
    }
}

#[derive(Debug, Default)]
pub struct ProducerCatalogBuilder {
    entries: BTreeMap<String, ProducerCatalogEntry>,
}

impl ProducerCatalogBuilder {
    pub fn register(mut self, alias: impl Into<String>, entry: ProducerCatalogEntry) -> Result<Self, ProducerError> {
        let alias = alias.into();
        if self.entries.contains_key(&alias) {
            return Err(ProducerError::DuplicateProducerAlias(alias));
        }
        self.entries.insert(alias, entry);
        Ok(self)
    }

    pub fn build(self) -> ProducerCatalog {
        ProducerCatalog { entries: self.entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ProducerCatalogEntry {
        ProducerCatalogEntry {
            provider: "openai".into(),
            provider_model: "gpt-5".into(),
            rate_key: "openai:gpt-5".into(),
            sdk_mapping: None,
            selection_input_keys: Vec::new(),
            config_input_paths: Vec::new(),
            input_schema: None,
            output_schema: None,
        }
    }

    #[test]
    fn duplicate_alias_registration_errors() {
        let result = ProducerCatalog::builder().register("Script", entry()).unwrap().register("Script", entry());
        assert!(matches!(result, Err(ProducerError::DuplicateProducerAlias(_))));
    }

    #[test]
    fn registered_entry_is_retrievable() {
        let catalog = ProducerCatalog::builder().register("Script", entry()).unwrap().build();
        assert_eq!(catalog.get("Script").unwrap().provider, "openai");
        assert!(catalog.get("Missing").is_none());
    }
}
