//! Case- and order-insensitive string similarity on a 0-100 scale.

use std::collections::{BTreeSet, HashSet};

pub fn default_process(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

// Insertions and deletions only: 100 * (1 - indel / (len_a + len_b)).
fn indel_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

pub fn ratio(a: &str, b: &str) -> f64 {
    let a = a.chars().collect::<Vec<_>>();
    let b = b.chars().collect::<Vec<_>>();
    indel_ratio(&a, &b)
}

// Windows of `long` aligned with `short`, including the partial ones hanging off
// either end; a window must start (or, at the front, end) on a character of `short`.
fn best_window(short: &[char], long: &[char]) -> f64 {
    let alphabet = short.iter().copied().collect::<HashSet<_>>();
    let (n, m) = (short.len(), long.len());
    let heads = (1..n)
        .filter(|&end| alphabet.contains(&long[end - 1]))
        .map(|end| &long[..end]);
    let inner = (0..m - n)
        .filter(|&start| alphabet.contains(&long[start]))
        .map(|start| &long[start..start + n]);
    let tails = (m - n..m)
        .filter(|&start| alphabet.contains(&long[start]))
        .map(|start| &long[start..]);

    let mut best = 0.0_f64;
    for window in heads.chain(inner).chain(tails) {
        best = best.max(indel_ratio(short, window));
        if best >= 100.0 {
            break;
        }
    }
    best
}

pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a = a.chars().collect::<Vec<_>>();
    let b = b.chars().collect::<Vec<_>>();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if short.is_empty() {
        return 0.0;
    }
    let best = best_window(short, long);
    if best < 100.0 && short.len() == long.len() {
        best.max(best_window(long, short))
    } else {
        best
    }
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens = s.split_whitespace().collect::<Vec<_>>();
    tokens.sort_unstable();
    tokens.join(" ")
}

pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn join_tokens<'a, 'b: 'a>(tokens: impl Iterator<Item = &'a &'b str>) -> String {
    tokens.copied().collect::<Vec<_>>().join(" ")
}

pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a = a.split_whitespace().collect::<BTreeSet<_>>();
    let tokens_b = b.split_whitespace().collect::<BTreeSet<_>>();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let shared = join_tokens(tokens_a.intersection(&tokens_b));
    let only_a = join_tokens(tokens_a.difference(&tokens_b));
    let only_b = join_tokens(tokens_b.difference(&tokens_a));
    if !shared.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let combined = |rest: &str| {
        if shared.is_empty() {
            rest.to_string()
        } else {
            format!("{shared} {rest}")
        }
    };
    let with_a = combined(&only_a);
    let with_b = combined(&only_b);

    let mut best = ratio(&with_a, &with_b);
    if !shared.is_empty() {
        best = best.max(ratio(&shared, &with_a)).max(ratio(&shared, &with_b));
    }
    best
}

pub fn partial_token_ratio(a: &str, b: &str) -> f64 {
    let tokens_a = a.split_whitespace().collect::<BTreeSet<_>>();
    let tokens_b = b.split_whitespace().collect::<BTreeSet<_>>();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    if tokens_a.intersection(&tokens_b).next().is_some() {
        return 100.0;
    }
    partial_ratio(&sorted_tokens(a), &sorted_tokens(b))
}

const UNBASE_SCALE: f64 = 0.95;

/// Weighted ratio over processed inputs; empty input on either side scores 0.
pub fn weighted_ratio(a: &str, b: &str) -> f64 {
    let a = default_process(a);
    let b = default_process(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let len_a = a.chars().count() as f64;
    let len_b = b.chars().count() as f64;
    let len_ratio = len_a.max(len_b) / len_a.min(len_b);
    let base = ratio(&a, &b);

    if len_ratio < 1.5 {
        let token = token_sort_ratio(&a, &b).max(token_set_ratio(&a, &b));
        return base.max(token * UNBASE_SCALE);
    }

    let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
    let partial = partial_ratio(&a, &b) * partial_scale;
    let partial_token = partial_token_ratio(&a, &b) * UNBASE_SCALE * partial_scale;
    base.max(partial).max(partial_token)
}

pub fn extract_one<'a, I>(query: &str, choices: I) -> Option<(&'a str, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, f64)> = None;
    for choice in choices {
        let score = weighted_ratio(query, choice);
        if best.map_or(true, |(_, current)| score > current) {
            best = Some((choice, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_folds_case_and_punctuation() {
        assert_eq!(default_process("  Heung-Min   SON "), "heung min son");
        assert_eq!(default_process("Nott'm Forest"), "nott m forest");
        assert_eq!(default_process("--"), "");
    }

    #[test]
    fn word_order_does_not_matter() {
        assert_eq!(token_sort_ratio("son heung min", "heung min son"), 100.0);
        assert!(weighted_ratio("Son Heung-Min", "Heung-min Son") >= 94.9);
    }

    #[test]
    fn subset_tokens_score_full_set_ratio() {
        assert_eq!(token_set_ratio("idrissa gueye", "idrissa gana gueye"), 100.0);
        assert!(weighted_ratio("Idrissa Gueye", "Idrissa Gana Gueye") >= 94.9);
    }

    #[test]
    fn partial_ratio_finds_the_embedded_word() {
        assert_eq!(partial_ratio("tottenham", "tottenham hotspur"), 100.0);
        let score = weighted_ratio("Tottenham", "Tottenham Hotspur");
        assert!((score - 90.0).abs() < 1e-9, "score was {score}");
    }

    #[test]
    fn ratio_counts_insertions_against_both_lengths() {
        assert!((ratio("tottenham", "tottenham hotspur") - 900.0 / 13.0).abs() < 1e-9);
        assert_eq!(ratio("", ""), 100.0);
        assert!((weighted_ratio("Dan Burn", "Daniel Burn") - 1600.0 / 19.0).abs() < 1e-9);
    }

    #[test]
    fn abbreviated_team_name_reaches_the_default_threshold() {
        let score = weighted_ratio("Nott'm Forest", "Nottingham Forest");
        assert!(score >= 80.0 - 1e-9, "score was {score}");
        assert!(weighted_ratio("Nott'm Forest", "Chelsea") < 60.0);
    }

    #[test]
    fn partial_windows_hang_off_either_end() {
        assert!((partial_ratio("abcd", "cdxxxxx") - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(partial_ratio("", "chelsea"), 0.0);
    }

    #[test]
    fn unrelated_names_score_low() {
        assert!(weighted_ratio("Arsenal", "Manchester United") < 60.0);
        assert!(weighted_ratio("Arsenal", "Chelsea") < 60.0);
    }

    #[test]
    fn empty_input_scores_zero() {
        assert_eq!(weighted_ratio("", "Chelsea"), 0.0);
        assert_eq!(weighted_ratio("Chelsea", " - "), 0.0);
        assert_eq!(weighted_ratio("Chelsea", "chelsea"), 100.0);
    }

    #[test]
    fn extract_one_keeps_first_on_ties() {
        let best = extract_one("Chelsea", ["Chelsea", "chelsea", "Everton"]);
        assert_eq!(best, Some(("Chelsea", 100.0)));
        assert_eq!(extract_one("Chelsea", std::iter::empty()), None);
    }
}
