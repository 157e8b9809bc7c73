// src/matching/normalize.rs
// Company-name normalization and the single shared similarity function every
// resolution stage scores against.

use once_cell::sync::Lazy;
use regex::Regex;
use strsim::jaro_winkler;

pub const MIN_TOKEN_LENGTH: usize = 2;

/// Legal suffixes stripped from the tail of a name before comparison.
/// Ordered longest-first so compound suffixes win over their parts.
const LEGAL_SUFFIXES: [&str; 12] = [
    "proprietary limited",
    "pty limited",
    "pty ltd",
    "incorporated",
    "corporation",
    "limited",
    "holdings",
    "pty",
    "ltd",
    "inc",
    "corp",
    "co",
];

/// Tokens too generic to discriminate between construction companies.
pub const STOPWORDS: [&str; 24] = [
    "pty", "ltd", "limited", "proprietary", "inc", "incorporated", "corp",
    "corporation", "group", "holdings", "company", "co", "the", "and",
    "construction", "constructions", "contracting", "contractors", "builders",
    "building", "services", "australia", "australian", "aust",
];

static PUNCTUATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Canonical form of a company name: lowercase, punctuation stripped, legal
/// suffixes removed, whitespace collapsed. Consolidation groups and alias
/// lookups both key on this.
pub fn normalize_company_name(name: &str) -> String {
    let mut normalized = name.to_lowercase().trim().to_string();
    normalized = normalized.replace('&', " and ");
    normalized = PUNCTUATION_RE.replace_all(&normalized, " ").to_string();
    normalized = WHITESPACE_RE.replace_all(&normalized, " ").trim().to_string();

    // Strip legal suffixes repeatedly; "acme holdings pty ltd" sheds both.
    let mut changed = true;
    while changed {
        changed = false;
        for suffix in &LEGAL_SUFFIXES {
            let candidate = format!(" {}", suffix);
            if normalized.ends_with(candidate.as_str()) {
                normalized = normalized[..normalized.len() - candidate.len()]
                    .trim()
                    .to_string();
                changed = true;
            }
        }
    }

    normalized
}

/// Search tokens for the database fuzzy stage: normalized words minus
/// stopwords and anything shorter than `MIN_TOKEN_LENGTH`.
pub fn tokenize_company_name(name: &str) -> Vec<String> {
    normalize_company_name(name)
        .split_whitespace()
        .filter(|token| token.len() >= MIN_TOKEN_LENGTH)
        .filter(|token| !STOPWORDS.contains(token))
        .map(|token| token.to_string())
        .collect()
}

/// Shared similarity over normalized names. Every confidence figure in the
/// resolver derives from this one function.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize_company_name(a);
    let norm_b = normalize_company_name(b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return 0.0;
    }
    if norm_a == norm_b {
        return 1.0;
    }
    jaro_winkler(&norm_a, &norm_b)
}

/// Bucketed numeric confidence for an in-memory fuzzy hit.
pub fn fuzzy_confidence_bucket(similarity: f64) -> f64 {
    if similarity >= 1.0 {
        1.0
    } else if similarity >= 0.95 {
        0.9
    } else if similarity >= 0.90 {
        0.8
    } else {
        0.7
    }
}
