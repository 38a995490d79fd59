use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ResolveError;

pub const DEFAULT_TEAM_THRESHOLD: f64 = 80.0;
pub const DEFAULT_PLAYER_THRESHOLD: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManualAliases(BTreeMap<String, String>);

impl ManualAliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abbreviations the fuzzy scorer cannot bridge on its own.
    pub fn premier_league() -> Self {
        Self::new()
            .with_alias("Man Utd", "Manchester United")
            .with_alias("Man United", "Manchester United")
            .with_alias("Spurs", "Tottenham Hotspur")
            .with_alias("Tottenham", "Tottenham Hotspur")
    }

    pub fn with_alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.insert(from, to);
        self
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.0.insert(from.into(), to.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLayout {
    pub id_field: String,
    pub team_field: String,
    /// One name variant per group, fields joined by a space; most specific first.
    pub name_fields: Vec<Vec<String>>,
}

impl RecordLayout {
    pub fn new(id_field: impl Into<String>, team_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            team_field: team_field.into(),
            name_fields: Vec::new(),
        }
    }

    pub fn with_variant(mut self, fields: &[&str]) -> Self {
        self.name_fields
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn fantasy_roster() -> Self {
        Self::new("id", "team_name")
            .with_variant(&["first_name", "second_name"])
            .with_variant(&["web_name"])
    }

    pub fn stats_provider() -> Self {
        Self::new("player_id", "team_name")
            .with_variant(&["player_name"])
            .with_variant(&["first_name", "last_name"])
            .with_variant(&["common_name"])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrosswalkConfig {
    pub team_threshold: f64,
    pub player_threshold: f64,
    pub team_aliases: ManualAliases,
    pub source_a: RecordLayout,
    pub source_b: RecordLayout,
}

impl Default for CrosswalkConfig {
    fn default() -> Self {
        Self {
            team_threshold: DEFAULT_TEAM_THRESHOLD,
            player_threshold: DEFAULT_PLAYER_THRESHOLD,
            team_aliases: ManualAliases::premier_league(),
            source_a: RecordLayout::fantasy_roster(),
            source_b: RecordLayout::stats_provider(),
        }
    }
}

impl CrosswalkConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("parsing crosswalk config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ResolveError> {
        for (label, value) in [
            ("team_threshold", self.team_threshold),
            ("player_threshold", self.player_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ResolveError::Config(format!(
                    "{label} must be within 0-100, got {value}"
                )));
            }
        }
        for (label, layout) in [("source_a", &self.source_a), ("source_b", &self.source_b)] {
            if layout.id_field.trim().is_empty() || layout.team_field.trim().is_empty() {
                return Err(ResolveError::Config(format!(
                    "{label} needs both id_field and team_field"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_known_aliases_and_thresholds() {
        let config = CrosswalkConfig::default();
        assert_eq!(config.team_threshold, 80.0);
        assert_eq!(config.team_aliases.get("Spurs"), Some("Tottenham Hotspur"));
        assert_eq!(config.source_a.name_fields[0], vec!["first_name", "second_name"]);
        assert_eq!(config.source_b.id_field, "player_id");
    }

    #[test]
    fn partial_yaml_keeps_remaining_defaults() {
        let config = CrosswalkConfig::from_yaml_str(
            "player_threshold: 85\nteam_aliases:\n  Wolves: Wolverhampton Wanderers\n",
        )
        .unwrap();
        assert_eq!(config.player_threshold, 85.0);
        assert_eq!(config.team_threshold, 80.0);
        assert_eq!(config.team_aliases.len(), 1);
        assert_eq!(config.source_a, RecordLayout::fantasy_roster());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let err = CrosswalkConfig::from_yaml_str("team_threshold: 180").unwrap_err();
        assert!(format!("{err:#}").contains("team_threshold"));
    }
}
