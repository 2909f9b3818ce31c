use crate::level::Severity;
use crate::rule::RuleSettings;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Engine configuration.
///
/// Loading and locating configuration files is the embedding tool's concern;
/// the engine only parses TOML text it is handed:
///
/// ```toml
/// [rules]
/// disabled = ["fixed_screen_size"]
/// missing_assertion = "error"
/// duplicate_handler = "allow"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub rules: RulesConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub disabled: Vec<String>,

    #[serde(flatten)]
    pub severities: HashMap<String, Severity>,
}

impl EngineConfig {
    pub fn into_settings(self) -> RuleSettings {
        RuleSettings::default()
            .with_severities(self.rules.severities)
            .disable(self.rules.disabled)
    }
}

pub fn parse_config(raw: &str) -> Result<EngineConfig> {
    let cfg: EngineConfig = toml::from_str(raw).context("failed to parse engine configuration")?;
    Ok(cfg)
}
