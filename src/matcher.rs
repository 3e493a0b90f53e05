//! Cross-reference matching between a primary and a secondary record set.
//!
//! Primary: case-insensitive equality of the name field, first hit wins.
//! Fallback: weighted token-overlap on name and account, plus a flat bonus
//! when the amounts agree within a tolerance.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Anything the matcher can compare.
pub trait Matchable {
    fn match_name(&self) -> &str;
    fn match_account(&self) -> Option<&str>;
    fn match_amount(&self) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Exact,
    Fuzzy,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Exact => write!(f, "exact"),
            Confidence::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

/// A primary record paired with its chosen secondary record.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate<'a, P, S> {
    pub primary: &'a P,
    pub secondary: &'a S,
    pub confidence: Confidence,
    /// Always within [0, 1].
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub name_weight: f64,
    pub account_weight: f64,
    pub amount_bonus: f64,
    pub amount_tolerance: f64,
    /// Minimum blended score before the amount bonus.
    pub consider_threshold: f64,
    /// A fuzzy match is accepted only when its final score exceeds this.
    pub accept_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            name_weight: 0.7,
            account_weight: 0.3,
            amount_bonus: 0.2,
            amount_tolerance: 1000.0,
            consider_threshold: 0.5,
            accept_threshold: 0.7,
        }
    }
}

/// Lowercased alphanumeric tokens.
pub fn tokens(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Jaccard overlap of the token sets; 0 when either side has no tokens.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    let union = ta.union(&tb).count();
    if ta.is_empty() || tb.is_empty() || union == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / union as f64
}

fn names_equal(a: &str, b: &str) -> bool {
    let a = a.trim();
    !a.is_empty() && a.to_lowercase() == b.trim().to_lowercase()
}

fn amounts_agree(a: Option<f64>, b: Option<f64>, tolerance: f64) -> bool {
    match (a, b) {
        (Some(a), Some(b)) if a.is_finite() && b.is_finite() => (a - b).abs() <= tolerance,
        _ => false,
    }
}

/// Blended score before the amount bonus.
pub fn base_score<P: Matchable, S: Matchable>(primary: &P, secondary: &S, config: &MatcherConfig) -> f64 {
    let name = token_overlap(primary.match_name(), secondary.match_name());
    let account = match (primary.match_account(), secondary.match_account()) {
        (Some(a), Some(b)) => token_overlap(a, b),
        _ => 0.0,
    };
    config.name_weight * name + config.account_weight * account
}

/// Best secondary record for `primary`, or `None` when nothing qualifies.
pub fn best_match<'a, P: Matchable, S: Matchable>(
    primary: &'a P,
    secondaries: &'a [S],
    config: &MatcherConfig,
) -> Option<MatchCandidate<'a, P, S>> {
    if let Some(secondary) = secondaries
        .iter()
        .find(|s| names_equal(primary.match_name(), s.match_name()))
    {
        return Some(MatchCandidate {
            primary,
            secondary,
            confidence: Confidence::Exact,
            score: 1.0,
        });
    }

    let mut best: Option<(&S, f64)> = None;
    for secondary in secondaries {
        let base = base_score(primary, secondary, config);
        if base < config.consider_threshold {
            continue;
        }
        let mut score = base;
        if amounts_agree(primary.match_amount(), secondary.match_amount(), config.amount_tolerance) {
            score += config.amount_bonus;
        }
        // strictly greater: ties keep the earlier candidate
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((secondary, score));
        }
    }

    let (secondary, score) = best?;
    if score <= config.accept_threshold {
        log::debug!(
            "{}: best candidate {:?} scored {score:.3}, not above threshold",
            primary.match_name(),
            secondary.match_name()
        );
        return None;
    }
    Some(MatchCandidate {
        primary,
        secondary,
        confidence: Confidence::Fuzzy,
        score: score.clamp(0.0, 1.0),
    })
}

/// Match every primary record in input order. `None` marks an unmatched record.
pub fn match_all<'a, P: Matchable, S: Matchable>(
    primaries: &'a [P],
    secondaries: &'a [S],
    config: &MatcherConfig,
) -> Vec<(&'a P, Option<MatchCandidate<'a, P, S>>)> {
    primaries
        .iter()
        .map(|p| (p, best_match(p, secondaries, config)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Rec {
        name: &'static str,
        account: Option<&'static str>,
        amount: Option<f64>,
    }

    fn rec(name: &'static str, account: Option<&'static str>, amount: Option<f64>) -> Rec {
        Rec { name, account, amount }
    }

    impl Matchable for Rec {
        fn match_name(&self) -> &str {
            self.name
        }
        fn match_account(&self) -> Option<&str> {
            self.account
        }
        fn match_amount(&self) -> Option<f64> {
            self.amount
        }
    }

    #[test]
    fn test_tokens_and_overlap() {
        assert_eq!(tokens("SA Health - Sunrise (Renewal)").len(), 4);
        assert_eq!(token_overlap("SA Health Renewal", "sa health renewal"), 1.0);
        assert_eq!(token_overlap("a b", "b c"), 1.0 / 3.0);
        assert_eq!(token_overlap("", ""), 0.0);
        assert_eq!(token_overlap("abc", ""), 0.0);
    }

    #[test]
    fn test_exact_match_beats_better_fuzzy_score() {
        let primary = rec("SA Health Renewal", Some("SA Health"), Some(46000.0));
        let secondaries = vec![
            // fuzzy-perfect on account and amount, but not the same name
            rec("SA Health Renewal 2025", Some("SA Health"), Some(46000.0)),
            rec("sa health renewal", None, None),
        ];
        let m = best_match(&primary, &secondaries, &MatcherConfig::default()).unwrap();
        assert_eq!(m.confidence, Confidence::Exact);
        assert_eq!(m.secondary.name, "sa health renewal");
        assert_eq!(m.score, 1.0);
    }

    #[test]
    fn test_fuzzy_match_with_amount_bonus() {
        let primary = rec("Sunrise EMR Upgrade", Some("WA Health"), Some(120000.0));
        let secondaries = vec![
            rec("Unrelated Deal", Some("Other"), Some(120000.0)),
            rec("Sunrise EMR Upgrade Phase 2", Some("WA Health"), Some(120500.0)),
        ];
        let m = best_match(&primary, &secondaries, &MatcherConfig::default()).unwrap();
        assert_eq!(m.confidence, Confidence::Fuzzy);
        assert_eq!(m.secondary.name, "Sunrise EMR Upgrade Phase 2");
        // 0.7 * 3/5 + 0.3 * 1 = 0.72, + 0.2 bonus, clamped
        assert!((m.score - 0.92).abs() < 1e-9);
    }

    #[test]
    fn test_score_clamped_to_one() {
        let primary = rec("Opal Upgrade", Some("NSW Health"), Some(10.0));
        let secondaries = vec![rec("Opal-Upgrade", Some("NSW Health"), Some(10.0))];
        let m = best_match(&primary, &secondaries, &MatcherConfig::default()).unwrap();
        assert_eq!(m.confidence, Confidence::Fuzzy);
        assert_eq!(m.score, 1.0);
    }

    #[test]
    fn test_below_threshold_is_unmatched() {
        let primary = rec("Sunrise EMR Upgrade", Some("WA Health"), None);
        let secondaries = vec![rec("Sunrise Analytics", Some("QLD Health"), None)];
        assert!(best_match(&primary, &secondaries, &MatcherConfig::default()).is_none());
        let none: Vec<Rec> = vec![];
        assert!(best_match(&primary, &none, &MatcherConfig::default()).is_none());
    }

    #[test]
    fn test_bonus_lifts_considered_candidate_over_acceptance() {
        // base = 0.7 * 2/3 + 0 = 0.467 < 0.5: not considered even with the bonus
        let primary = rec("Opal Upgrade Phase", None, Some(5.0));
        let secondaries = vec![rec("Opal Upgrade", None, Some(5.0))];
        assert!(best_match(&primary, &secondaries, &MatcherConfig::default()).is_none());

        // base = 0.7 * 3/4 = 0.525: considered, bonus takes it to 0.725
        let primary = rec("Opal Upgrade Phase One", None, Some(5.0));
        let secondaries = vec![rec("Opal Upgrade Phase", None, Some(5.0))];
        let m = best_match(&primary, &secondaries, &MatcherConfig::default()).unwrap();
        assert!((m.score - 0.725).abs() < 1e-9);
    }

    #[test]
    fn test_score_at_threshold_is_unmatched() {
        // name overlap 1.0 * 0.7, no account, no amount: exactly 0.7
        let primary = rec("Opal Upgrade", None, None);
        let secondaries = vec![rec("Opal-Upgrade", None, None)];
        assert!(best_match(&primary, &secondaries, &MatcherConfig::default()).is_none());

        let lenient = MatcherConfig {
            accept_threshold: 0.69,
            ..MatcherConfig::default()
        };
        let m = best_match(&primary, &secondaries, &lenient).unwrap();
        assert_eq!(m.confidence, Confidence::Fuzzy);
    }

    #[test]
    fn test_tie_goes_to_first_candidate() {
        let primary = rec("Sunrise EMR Upgrade", Some("WA Health"), None);
        let secondaries = vec![
            rec("Sunrise EMR Upgrade A", Some("WA Health"), None),
            rec("Sunrise EMR Upgrade B", Some("WA Health"), None),
        ];
        for _ in 0..10 {
            let m = best_match(&primary, &secondaries, &MatcherConfig::default()).unwrap();
            assert_eq!(m.secondary.name, "Sunrise EMR Upgrade A");
        }
    }

    #[test]
    fn test_match_all_preserves_input_order() {
        let primaries = vec![rec("B", None, None), rec("A", None, None), rec("Z", None, None)];
        let secondaries = vec![rec("a", None, None), rec("b", None, None)];
        let results = match_all(&primaries, &secondaries, &MatcherConfig::default());
        let names: Vec<Option<&str>> = results
            .iter()
            .map(|(_, m)| m.as_ref().map(|m| m.secondary.name))
            .collect();
        assert_eq!(names, vec![Some("b"), Some("a"), None]);
    }
}
