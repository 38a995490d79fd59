use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use statwalk_core::{CrosswalkEntry, MatchMethod};
use tracing::{debug, info};

use crate::config::ManualAliases;
use crate::fuzzy::extract_one;
use crate::ResolveError;

pub const MANUAL_SCORE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamMatch {
    pub name_b: String,
    pub method: MatchMethod,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct TeamMapping {
    matches: BTreeMap<String, TeamMatch>,
}

impl TeamMapping {
    pub fn get(&self, name_a: &str) -> Option<&TeamMatch> {
        self.matches.get(name_a)
    }

    pub fn target(&self, name_a: &str) -> Option<&str> {
        self.get(name_a).map(|m| m.name_b.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TeamMatch)> {
        self.matches.iter().map(|(a, m)| (a.as_str(), m))
    }

    pub fn as_name_map(&self) -> BTreeMap<String, String> {
        self.matches
            .iter()
            .map(|(a, m)| (a.clone(), m.name_b.clone()))
            .collect()
    }

    pub fn crosswalk_entries(&self) -> Vec<CrosswalkEntry> {
        self.matches
            .iter()
            .map(|(a, m)| CrosswalkEntry {
                source_a_id: a.clone(),
                source_b_id: m.name_b.clone(),
                method: m.method,
                score: m.score,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Map every source-A team name onto a source-B name, or fail naming every miss.
///
/// Aliases win when their target exists in `names_b`; otherwise the best fuzzy
/// candidate at or above `threshold` is taken, keeping the first on ties.
pub fn match_teams<A, B>(
    names_a: &[A],
    names_b: &[B],
    aliases: &ManualAliases,
    threshold: f64,
) -> Result<TeamMapping, ResolveError>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let known_b = names_b.iter().map(|n| n.as_ref()).collect::<HashSet<&str>>();
    let mut mapping = TeamMapping::default();
    let mut unmatched = Vec::new();

    for name_a in names_a.iter().map(|n| n.as_ref()) {
        if let Some(target) = aliases.get(name_a) {
            if known_b.contains(target) {
                info!(team = name_a, matched = target, "team match (manual)");
                mapping.matches.insert(
                    name_a.to_string(),
                    TeamMatch {
                        name_b: target.to_string(),
                        method: MatchMethod::ManualTeamAlias,
                        score: MANUAL_SCORE,
                    },
                );
                continue;
            }
            debug!(team = name_a, alias = target, "alias target absent; trying fuzzy match");
        }

        match extract_one(name_a, names_b.iter().map(|n| n.as_ref())) {
            Some((name_b, score)) if score >= threshold => {
                info!(team = name_a, matched = name_b, score, "team match (fuzzy)");
                mapping.matches.insert(
                    name_a.to_string(),
                    TeamMatch {
                        name_b: name_b.to_string(),
                        method: MatchMethod::FuzzyTeam,
                        score,
                    },
                );
            }
            best => {
                debug!(team = name_a, best = ?best, threshold, "no team candidate above threshold");
                unmatched.push(name_a.to_string());
            }
        }
    }

    if unmatched.is_empty() {
        Ok(mapping)
    } else {
        Err(ResolveError::UnmatchedTeams { names: unmatched })
    }
}
