//! Cross-source entity resolution: team-name canonicalization, then greedy
//! fuzzy player matching within each mapped team.

pub mod config;
pub mod entities;
pub mod fuzzy;
pub mod records;
pub mod teams;

use std::collections::HashSet;

use serde::Serialize;
use statwalk_core::EntitySourceRecord;
use thiserror::Error;
use tracing::info;

pub use config::{CrosswalkConfig, ManualAliases, RecordLayout};
pub use entities::{find_best_match, match_entities, CrosswalkOutcome, TeamIndex, UnmatchedReport};
pub use records::{records_from_rows, records_from_table, RecordBatch};
pub use teams::{match_teams, TeamMapping, TeamMatch};

pub const CRATE_NAME: &str = "statwalk-resolve";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("could not match source-A teams to source-B teams: {}", .names.join(", "))]
    UnmatchedTeams { names: Vec<String> },
    #[error("invalid crosswalk config: {0}")]
    Config(String),
}

pub fn distinct_teams(records: &[EntitySourceRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(EntitySourceRecord::team_name)
        .filter(|team| seen.insert(*team))
        .map(ToString::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub teams: TeamMapping,
    pub players: CrosswalkOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    config: CrosswalkConfig,
}

impl IdentityResolver {
    pub fn new(config: CrosswalkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CrosswalkConfig {
        &self.config
    }

    pub fn match_teams<A: AsRef<str>, B: AsRef<str>>(
        &self,
        names_a: &[A],
        names_b: &[B],
    ) -> Result<TeamMapping, ResolveError> {
        match_teams(
            names_a,
            names_b,
            &self.config.team_aliases,
            self.config.team_threshold,
        )
    }

    pub fn match_entities(
        &self,
        records_a: &[EntitySourceRecord],
        records_b: &[EntitySourceRecord],
        mapping: &TeamMapping,
    ) -> CrosswalkOutcome {
        match_entities(records_a, records_b, mapping, self.config.player_threshold)
    }

    /// Both stages; a team that cannot be mapped fails the whole run.
    pub fn resolve(
        &self,
        records_a: &[EntitySourceRecord],
        records_b: &[EntitySourceRecord],
    ) -> Result<Resolution, ResolveError> {
        let teams_a = distinct_teams(records_a);
        let teams_b = distinct_teams(records_b);
        info!(
            records_a = records_a.len(),
            records_b = records_b.len(),
            teams_a = teams_a.len(),
            teams_b = teams_b.len(),
            "resolving crosswalk"
        );
        let teams = self.match_teams(&teams_a, &teams_b)?;
        let players = self.match_entities(records_a, records_b, &teams);
        Ok(Resolution { teams, players })
    }

    pub fn resolve_rows(
        &self,
        rows_a: &[serde_json::Value],
        rows_b: &[serde_json::Value],
    ) -> Result<Resolution, ResolveError> {
        let a = records_from_rows(rows_a, &self.config.source_a);
        let b = records_from_rows(rows_b, &self.config.source_b);
        if a.skipped + b.skipped > 0 {
            info!(skipped_a = a.skipped, skipped_b = b.skipped, "skipped malformed rows");
        }
        self.resolve(&a.records, &b.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_teams_keep_first_seen_order() {
        let records = vec![
            EntitySourceRecord::new("1", Some("Everton".into()), vec![]),
            EntitySourceRecord::new("2", None, vec![]),
            EntitySourceRecord::new("3", Some("Arsenal".into()), vec![]),
            EntitySourceRecord::new("4", Some("Everton".into()), vec![]),
            EntitySourceRecord::new("5", Some(String::new()), vec![]),
        ];
        assert_eq!(distinct_teams(&records), vec!["Everton", "Arsenal"]);
    }

    #[test]
    fn unmatched_teams_error_lists_names() {
        let err = ResolveError::UnmatchedTeams {
            names: vec!["Arsenal".into(), "Luton".into()],
        };
        assert_eq!(
            err.to_string(),
            "could not match source-A teams to source-B teams: Arsenal, Luton"
        );
    }
}
