use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use statwalk_core::{CrosswalkEntry, EntitySourceRecord, MatchMethod, UnmatchedEntry, UnmatchedReason};
use tracing::{debug, info, warn};

use crate::fuzzy::extract_one;
use crate::teams::TeamMapping;

#[derive(Debug, Default)]
pub struct TeamIndex<'a> {
    teams: HashMap<&'a str, Vec<&'a EntitySourceRecord>>,
}

impl<'a> TeamIndex<'a> {
    pub fn build(records: &'a [EntitySourceRecord]) -> Self {
        let mut teams: HashMap<&'a str, Vec<&'a EntitySourceRecord>> = HashMap::new();
        for record in records {
            let team = record.team.as_deref().unwrap_or_default();
            teams.entry(team).or_default().push(record);
        }
        Self { teams }
    }

    pub fn candidates(&self, team: &str) -> &[&'a EntitySourceRecord] {
        self.teams.get(team).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn team_count(&self) -> usize {
        self.teams.len()
    }
}

/// Best candidate over every (A variant x candidate x B variant) score.
///
/// Only scores at or above `threshold` count; ties keep the earliest candidate.
/// Candidates without name variants are passed over.
pub fn find_best_match<'a>(
    variants: &[String],
    candidates: &[&'a EntitySourceRecord],
    threshold: f64,
) -> Option<(&'a EntitySourceRecord, f64)> {
    if variants.is_empty() {
        return None;
    }
    let mut best: Option<(&'a EntitySourceRecord, f64)> = None;
    for &candidate in candidates {
        if candidate.name_variants.is_empty() {
            continue;
        }
        for variant in variants {
            let choices = candidate.name_variants.iter().map(String::as_str);
            let Some((_, score)) = extract_one(variant, choices) else {
                continue;
            };
            if score >= threshold && best.map_or(true, |(_, current)| score > current) {
                best = Some((candidate, score));
            }
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UnmatchedReport {
    pub entries: Vec<UnmatchedEntry>,
    pub matched: usize,
}

impl UnmatchedReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> usize {
        self.matched + self.entries.len()
    }

    pub fn match_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.matched as f64 / total as f64 * 100.0,
        }
    }

    pub fn count_by_reason(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.reason.to_string()).or_insert(0) += 1;
        }
        counts
    }

    fn push(&mut self, record: &EntitySourceRecord, reason: UnmatchedReason) {
        debug!(id = %record.source_id, team = ?record.team_name(), %reason, "unmatched record");
        self.entries.push(UnmatchedEntry {
            source_a_id: record.source_id.clone(),
            names: record.name_variants.clone(),
            team: record.team_name().unwrap_or_default().to_string(),
            reason,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CrosswalkOutcome {
    pub entries: Vec<CrosswalkEntry>,
    pub report: UnmatchedReport,
}

impl CrosswalkOutcome {
    pub fn duplicate_targets(&self) -> BTreeMap<String, Vec<String>> {
        let mut claims: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in &self.entries {
            claims
                .entry(entry.source_b_id.clone())
                .or_default()
                .push(entry.source_a_id.clone());
        }
        claims.retain(|_, claimants| claimants.len() > 1);
        claims
    }
}

/// Greedy per-record matching within mapped teams.
///
/// Every source-A record ends up either in `entries` or in the report, never both.
/// Two source-A records may receive the same source-B match.
pub fn match_entities(
    records_a: &[EntitySourceRecord],
    records_b: &[EntitySourceRecord],
    mapping: &TeamMapping,
    threshold: f64,
) -> CrosswalkOutcome {
    let index = TeamIndex::build(records_b);
    let mut outcome = CrosswalkOutcome::default();

    for record in records_a {
        let Some(team_b) = record.team_name().and_then(|team| mapping.target(team)) else {
            outcome.report.push(record, UnmatchedReason::NoTeam);
            continue;
        };
        let candidates = index.candidates(team_b);
        if candidates.is_empty() {
            outcome.report.push(record, UnmatchedReason::NoCandidates);
            continue;
        }
        match find_best_match(&record.name_variants, candidates, threshold) {
            Some((candidate, score)) => {
                outcome.entries.push(CrosswalkEntry {
                    source_a_id: record.source_id.clone(),
                    source_b_id: candidate.source_id.clone(),
                    method: MatchMethod::FuzzyPlayer,
                    score,
                });
                outcome.report.matched += 1;
            }
            None => outcome.report.push(record, UnmatchedReason::NoPlayerMatch),
        }
    }

    let duplicates = outcome.duplicate_targets();
    if !duplicates.is_empty() {
        warn!(
            targets = duplicates.len(),
            "some source-B records matched more than one source-A record"
        );
    }
    info!(
        matched = outcome.report.matched,
        unmatched = outcome.report.len(),
        match_rate = outcome.report.match_rate(),
        "entity matching finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, team: &str, names: &[&str]) -> EntitySourceRecord {
        EntitySourceRecord::new(
            id,
            Some(team.to_string()),
            names.iter().map(|n| n.to_string()).collect(),
        )
    }

    #[test]
    fn index_keeps_input_order_per_team() {
        let records = vec![
            player("1", "Everton", &["Beto"]),
            player("2", "Fulham", &["Raul Jimenez"]),
            player("3", "Everton", &["Dwight McNeil"]),
        ];
        let index = TeamIndex::build(&records);
        let ids = index
            .candidates("Everton")
            .iter()
            .map(|r| r.source_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["1", "3"]);
        assert!(index.candidates("Chelsea").is_empty());
        assert_eq!(index.team_count(), 2);
    }

    #[test]
    fn candidates_without_names_are_passed_over() {
        let nameless = player("9", "Everton", &[]);
        let beto = player("4", "Everton", &["Beto"]);
        let candidates = vec![&nameless, &beto];
        let (hit, score) = find_best_match(&["Beto".to_string()], &candidates, 80.0).unwrap();
        assert_eq!(hit.source_id, "4");
        assert_eq!(score, 100.0);
    }

    #[test]
    fn equal_scores_keep_the_first_candidate() {
        let first = player("a", "Everton", &["Ashley Young"]);
        let second = player("b", "Everton", &["Ashley Young"]);
        let candidates = vec![&first, &second];
        let (hit, _) = find_best_match(&["Ashley Young".to_string()], &candidates, 80.0).unwrap();
        assert_eq!(hit.source_id, "a");
    }

    #[test]
    fn report_rate_and_reason_counts() {
        let mut report = UnmatchedReport::default();
        assert_eq!(report.match_rate(), 0.0);
        report.matched = 3;
        report.push(&player("x", "Everton", &["X"]), UnmatchedReason::NoPlayerMatch);
        assert_eq!(report.total(), 4);
        assert_eq!(report.match_rate(), 75.0);
        assert_eq!(report.count_by_reason().get("no player match"), Some(&1));
    }
}
