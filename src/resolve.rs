//! Query-to-profile resolution.
//!
//! A query like `"pln essdlc"`, `"pln/essdlc"`, `"essdlc"` or `"ess"` is
//! matched against every name a profile answers to: its id, its bare network
//! name, each alias, and `"location alias"`. Exact (case- and
//! separator-insensitive) matches win outright; otherwise candidates are
//! ranked by Levenshtein similarity, `100 * (len - distance) / len` over the
//! longer string. A best score at or above `matcher.threshold` resolves; ties
//! across distinct profiles are ambiguous rather than guessed at. Below the
//! threshold, anything scoring at least [`SUGGESTION_CUTOFF`] is offered as a
//! suggestion.

use crate::config::{MatcherConfig, Profile};
use crate::error::{Error, Result};

/// Minimum score for a profile to appear in "did you mean" suggestions.
const SUGGESTION_CUTOFF: u8 = 50;

pub struct Resolver<'a> {
    profiles: &'a [Profile],
    threshold: u8,
    max_suggestions: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(profiles: &'a [Profile], matcher: &MatcherConfig) -> Self {
        Self {
            profiles,
            threshold: matcher.threshold,
            max_suggestions: matcher.max_suggestions,
        }
    }

    /// Resolve a query to exactly one profile.
    pub fn resolve(&self, query: &str) -> Result<&'a Profile> {
        let q = normalize(query);
        if q.is_empty() {
            return Err(Error::NoMatch {
                query: query.to_string(),
                suggestions: Vec::new(),
            });
        }

        let exact: Vec<&Profile> = self
            .profiles
            .iter()
            .filter(|p| candidates(p).iter().any(|c| *c == q))
            .collect();
        match exact.len() {
            1 => return Ok(exact[0]),
            0 => {}
            _ => {
                return Err(Error::AmbiguousMatch {
                    query: query.to_string(),
                    candidates: exact.iter().map(|p| p.id.clone()).collect(),
                });
            }
        }

        let scored: Vec<(u8, &Profile)> = self
            .profiles
            .iter()
            .map(|p| (score_profile(&q, p), p))
            .collect();
        let best = scored.iter().map(|(s, _)| *s).max().unwrap_or(0);
        if best < self.threshold {
            return Err(Error::NoMatch {
                query: query.to_string(),
                suggestions: self.suggestions(&scored),
            });
        }

        let top: Vec<&Profile> = scored
            .iter()
            .filter(|(s, _)| *s == best)
            .map(|(_, p)| *p)
            .collect();
        if top.len() == 1 {
            Ok(top[0])
        } else {
            Err(Error::AmbiguousMatch {
                query: query.to_string(),
                candidates: top.iter().map(|p| p.id.clone()).collect(),
            })
        }
    }

    fn suggestions(&self, scored: &[(u8, &Profile)]) -> Vec<String> {
        let mut close: Vec<(u8, &str)> = scored
            .iter()
            .filter(|(s, _)| *s >= SUGGESTION_CUTOFF)
            .map(|(s, p)| (*s, p.id.as_str()))
            .collect();
        close.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        close
            .into_iter()
            .take(self.max_suggestions)
            .map(|(_, id)| id.to_string())
            .collect()
    }
}

/// Lowercase, treat `/`, `_`, `-` as spaces, collapse runs of whitespace.
fn normalize(s: &str) -> String {
    let mapped: String = s
        .to_lowercase()
        .chars()
        .map(|c| if matches!(c, '/' | '_' | '-') { ' ' } else { c })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Every normalized name this profile answers to.
fn candidates(profile: &Profile) -> Vec<String> {
    let mut names = vec![normalize(&profile.id), normalize(&profile.network)];
    for alias in &profile.aliases {
        names.push(normalize(alias));
        names.push(normalize(&format!("{} {}", profile.location, alias)));
    }
    names
}

fn score_profile(query: &str, profile: &Profile) -> u8 {
    candidates(profile)
        .iter()
        .map(|c| ratio(query, c))
        .max()
        .unwrap_or(0)
}

/// Similarity in 0..=100; 100 means equal.
fn ratio(a: &str, b: &str) -> u8 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100;
    }
    let dist = levenshtein(a, b);
    ((100 * (max_len - dist)) / max_len) as u8
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn profile(location: &str, network: &str, aliases: &[&str]) -> Profile {
        Profile {
            id: format!("{location}/{network}"),
            location: location.to_string(),
            network: network.to_string(),
            file: PathBuf::from(format!("/tmp/ovpn/{location}/{network}.ovpn")),
            description: String::new(),
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
            allow_simultaneous: false,
        }
    }

    fn sample_profiles() -> Vec<Profile> {
        vec![
            profile("dal", "mup", &[]),
            profile("pln", "essdlc", &["ess"]),
        ]
    }

    fn resolver(profiles: &[Profile]) -> Resolver<'_> {
        Resolver::new(profiles, &MatcherConfig::default())
    }

    #[test]
    fn test_spaced_query_resolves() {
        let profiles = sample_profiles();
        let found = resolver(&profiles).resolve("pln essdlc").unwrap();
        assert_eq!(found.id, "pln/essdlc");
    }

    #[test]
    fn test_slash_query_resolves() {
        let profiles = sample_profiles();
        let found = resolver(&profiles).resolve("pln/essdlc").unwrap();
        assert_eq!(found.id, "pln/essdlc");
    }

    #[test]
    fn test_bare_network_resolves() {
        let profiles = sample_profiles();
        assert_eq!(resolver(&profiles).resolve("mup").unwrap().id, "dal/mup");
        assert_eq!(
            resolver(&profiles).resolve("essdlc").unwrap().id,
            "pln/essdlc"
        );
    }

    #[test]
    fn test_alias_resolves_case_insensitively() {
        let profiles = sample_profiles();
        assert_eq!(resolver(&profiles).resolve("ESS").unwrap().id, "pln/essdlc");
        assert_eq!(
            resolver(&profiles).resolve("pln ess").unwrap().id,
            "pln/essdlc"
        );
    }

    #[test]
    fn test_unrelated_query_is_no_match() {
        let profiles = sample_profiles();
        let err = resolver(&profiles).resolve("xyz").unwrap_err();
        match err {
            Error::NoMatch { query, suggestions } => {
                assert_eq!(query, "xyz");
                assert!(suggestions.is_empty());
            }
            other => panic!("expected NoMatch, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_query_is_no_match() {
        let profiles = sample_profiles();
        assert!(matches!(
            resolver(&profiles).resolve("   "),
            Err(Error::NoMatch { .. })
        ));
    }

    #[test]
    fn test_typo_resolves_through_fuzzy_stage() {
        let profiles = sample_profiles();
        // one edit away from "essdlc", well above the default threshold
        assert_eq!(
            resolver(&profiles).resolve("essdlx").unwrap().id,
            "pln/essdlc"
        );
    }

    #[test]
    fn test_below_threshold_offers_suggestions() {
        let profiles = sample_profiles();
        // three edits from "essdlc": scores 50, under the default 60
        let err = resolver(&profiles).resolve("exsdxx").unwrap_err();
        match err {
            Error::NoMatch { suggestions, .. } => {
                assert_eq!(suggestions, vec!["pln/essdlc"]);
            }
            other => panic!("expected NoMatch, got {other:?}"),
        }
    }

    #[test]
    fn test_threshold_is_configurable() {
        let profiles = sample_profiles();
        let matcher = MatcherConfig {
            threshold: 40,
            max_suggestions: 3,
        };
        let resolver = Resolver::new(&profiles, &matcher);
        assert_eq!(resolver.resolve("exsdxx").unwrap().id, "pln/essdlc");
    }

    #[test]
    fn test_shared_network_name_is_ambiguous() {
        let profiles = vec![
            profile("dal", "vpn", &[]),
            profile("pln", "vpn", &[]),
        ];
        let err = resolver(&profiles).resolve("vpn").unwrap_err();
        match err {
            Error::AmbiguousMatch { candidates, .. } => {
                assert_eq!(candidates, vec!["dal/vpn", "pln/vpn"]);
            }
            other => panic!("expected AmbiguousMatch, got {other:?}"),
        }
    }

    #[test]
    fn test_fuzzy_tie_is_ambiguous() {
        let profiles = vec![
            profile("a", "node1", &[]),
            profile("b", "node2", &[]),
        ];
        // one edit from both node names
        let err = resolver(&profiles).resolve("node3").unwrap_err();
        assert!(matches!(err, Error::AmbiguousMatch { .. }));
    }

    #[test]
    fn test_suggestions_are_capped_and_ordered() {
        let profiles = vec![
            profile("x", "net1", &[]),
            profile("x", "net2", &[]),
            profile("x", "net3", &[]),
        ];
        let matcher = MatcherConfig {
            threshold: 90,
            max_suggestions: 2,
        };
        let err = Resolver::new(&profiles, &matcher).resolve("net0").unwrap_err();
        match err {
            Error::NoMatch { suggestions, .. } => {
                assert_eq!(suggestions, vec!["x/net1", "x/net2"]);
            }
            other => panic!("expected NoMatch, got {other:?}"),
        }
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("essdlc", "essdlc"), 0);
    }

    #[test]
    fn test_ratio_basics() {
        assert_eq!(ratio("essdlc", "essdlc"), 100);
        assert_eq!(ratio("kitten", "sitting"), 57);
        assert_eq!(ratio("", ""), 100);
        assert_eq!(ratio("abc", "xyz"), 0);
    }

    #[test]
    fn test_normalize_collapses_separators() {
        assert_eq!(normalize("PLN/EssDLC"), "pln essdlc");
        assert_eq!(normalize("  pln   essdlc "), "pln essdlc");
        assert_eq!(normalize("ess_dlc-x"), "ess dlc x");
    }
}
