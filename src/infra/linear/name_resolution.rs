//! Matching free-text names against Linear entities.
//!
//! Users say "the atlas project" or "ana" where Linear wants an ID. The
//! matcher tries four tiers in a fixed order and the first tier that matches
//! anything wins; within a tier the first candidate (in the order Linear
//! returned them) is chosen.

/// How closely a candidate matched, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    /// A field equals the needle.
    Exact,
    /// A field equals the needle ignoring case.
    CaseInsensitive,
    /// A field contains the needle ignoring case.
    Substring,
    /// Some single field contains every whitespace-separated token of the
    /// needle, ignoring case.
    TokenSubset,
}

const TIERS: [MatchTier; 4] = [
    MatchTier::Exact,
    MatchTier::CaseInsensitive,
    MatchTier::Substring,
    MatchTier::TokenSubset,
];

/// Words dropped from project needles: "the ATLAS project" -> "atlas".
const PROJECT_FILLER_WORDS: &[&str] = &["the", "project", "on", "in", "for", "to", "a", "an"];

/// True when `value` has the 8-4-4-4-12 hex shape of a Linear ID.
pub fn is_likely_uuid(value: &str) -> bool {
    let value = value.trim();
    value.len() == 36 && uuid::Uuid::parse_str(value).is_ok()
}

/// Lowercases and removes filler words from a project name needle.
pub fn strip_filler_words(needle: &str) -> String {
    needle
        .to_lowercase()
        .split_whitespace()
        .filter(|word| !PROJECT_FILLER_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn field_matches(tier: MatchTier, field: &str, needle: &str, tokens: &[String]) -> bool {
    match tier {
        MatchTier::Exact => field == needle,
        MatchTier::CaseInsensitive => field.to_lowercase() == needle.to_lowercase(),
        MatchTier::Substring => field.to_lowercase().contains(&needle.to_lowercase()),
        MatchTier::TokenSubset => {
            let field = field.to_lowercase();
            !tokens.is_empty() && tokens.iter().all(|token| field.contains(token.as_str()))
        }
    }
}

/// Finds the best candidate for `needle`.
///
/// `fields` lists the searchable names of a candidate (key, name, email...).
/// Returns `None` for a blank needle or when no tier matches.
pub fn best_match<'a, T, F>(needle: &str, candidates: &'a [T], fields: F) -> Option<(&'a T, MatchTier)>
where
    F: Fn(&T) -> Vec<&str>,
{
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }

    let tokens: Vec<String> = needle
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    TIERS.iter().find_map(|&tier| {
        candidates
            .iter()
            .find(|candidate| {
                fields(*candidate)
                    .into_iter()
                    .filter(|field| !field.is_empty())
                    .any(|field| field_matches(tier, field, needle, &tokens))
            })
            .map(|candidate| (candidate, tier))
    })
}
