// src/matching/resolver.rs
// Employer Resolver: four resolution stages, first hit wins.
//   1. persisted alias table, exact on normalized name
//   2. in-memory fuzzy against the preloaded employer snapshot
//   3. database exact (case-insensitive)
//   4. database token search over the stopword-stripped name
// A store error at any stage degrades the whole resolution to
// none/create-new; resolution is never allowed to abort the batch.

use anyhow::Result;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::time::Duration;

use crate::matching::normalize::{
    fuzzy_confidence_bucket, name_similarity, normalize_company_name, tokenize_company_name,
};
use crate::models::{
    ClassificationKey, CompanyClassification, Employer, EmployerMatchResult, MatchAction,
    MatchConfidence, SuggestedMatch,
};
use crate::store::ImportStore;
use crate::utils::progress::phase_bar;

/// Minimum shared-similarity score for a snapshot hit to count at all.
const IN_MEMORY_FUZZY_THRESHOLD: f64 = 0.85;
/// Flat confidence for unscored database substring candidates.
const DB_FUZZY_CONFIDENCE: f64 = 0.6;
const MAX_SUGGESTED_MATCHES: usize = 10;
/// Single-token names this short get prefix matching on top of substring.
const AGGRESSIVE_SINGLE_TOKEN_LEN: usize = 4;

/// Employer list loaded once per wizard session and passed explicitly.
/// Employers created mid-run are not visible here; stage 3 still catches
/// them on the next resolution.
#[derive(Debug, Clone, Default)]
pub struct EmployerSnapshot {
    pub employers: Vec<Employer>,
}

impl EmployerSnapshot {
    pub async fn load<S: ImportStore>(store: &S) -> Result<Self> {
        let employers = store.load_employers().await?;
        info!("Loaded employer snapshot: {} employers", employers.len());
        Ok(Self { employers })
    }

    pub fn from_employers(employers: Vec<Employer>) -> Self {
        Self { employers }
    }
}

/// Sequential-with-delay policy for the batch driver. Items are resolved
/// one at a time with a fixed pause between store round-trips.
#[derive(Debug, Clone, Copy)]
pub struct ResolvePolicy {
    pub inter_item_delay: Duration,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            inter_item_delay: Duration::from_millis(100),
        }
    }
}

impl ResolvePolicy {
    pub fn from_env() -> Self {
        let millis = std::env::var("RESOLVE_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(100);
        Self {
            inter_item_delay: Duration::from_millis(millis),
        }
    }
}

fn exact_result(key: ClassificationKey, employer: &Employer) -> EmployerMatchResult {
    EmployerMatchResult {
        key,
        confidence: MatchConfidence::Exact,
        numeric_confidence: 1.0,
        employer_id: Some(employer.id.clone()),
        employer_name: Some(employer.name.clone()),
        suggested_matches: vec![suggested(employer)],
        action: MatchAction::ConfirmMatch,
        // Exact confidence auto-confirms.
        user_confirmed: true,
    }
}

fn suggested(employer: &Employer) -> SuggestedMatch {
    SuggestedMatch {
        id: employer.id.clone(),
        name: employer.name.clone(),
        address: employer.address.clone(),
    }
}

/// Resolve one company name against the store. Never returns `Err`; every
/// failure path degrades to a create-new result.
pub async fn resolve<S: ImportStore>(
    store: &S,
    key: ClassificationKey,
    snapshot: Option<&EmployerSnapshot>,
) -> EmployerMatchResult {
    let company_name = key.company_name.clone();
    let normalized = normalize_company_name(&company_name);
    if normalized.is_empty() {
        return EmployerMatchResult::no_match(key);
    }

    // Stage 1: alias table.
    match store.find_alias(&normalized).await {
        Ok(Some(employer)) => {
            debug!("Alias hit for '{}' -> {}", company_name, employer.name);
            return exact_result(key, &employer);
        }
        Ok(None) => {}
        Err(e) => {
            warn!("Alias lookup failed for '{}': {}. Degrading to create-new.", company_name, e);
            return EmployerMatchResult::no_match(key);
        }
    }

    // Stage 2: in-memory fuzzy against the snapshot.
    if let Some(snapshot) = snapshot {
        if let Some(result) = resolve_in_memory(&key, &company_name, snapshot) {
            return result;
        }
    }

    // Stage 3: database exact.
    match store.find_employer_exact(&company_name).await {
        Ok(Some(employer)) => {
            debug!("DB exact hit for '{}'", company_name);
            return exact_result(key, &employer);
        }
        Ok(None) => {}
        Err(e) => {
            warn!("Exact lookup failed for '{}': {}. Degrading to create-new.", company_name, e);
            return EmployerMatchResult::no_match(key);
        }
    }

    // Stage 4: database token search.
    let mut tokens = tokenize_company_name(&company_name);
    if tokens.is_empty() {
        // Everything was a stopword; search the normalized name whole so
        // generic names still surface candidates.
        tokens.push(normalized.clone());
    }
    let mut candidates = match store.search_employers(&tokens).await {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!("Token search failed for '{}': {}. Degrading to create-new.", company_name, e);
            return EmployerMatchResult::no_match(key);
        }
    };
    // A lone short token matches substrings everywhere; keep prefix hits only.
    if tokens.len() == 1 && tokens[0].len() <= AGGRESSIVE_SINGLE_TOKEN_LEN {
        let token = tokens[0].as_str();
        candidates.retain(|e| normalize_company_name(&e.name).starts_with(token));
    }
    if candidates.is_empty() {
        return EmployerMatchResult::no_match(key);
    }

    let suggestions = rank_candidates(&normalized, &tokens, candidates);
    EmployerMatchResult {
        key,
        confidence: MatchConfidence::Fuzzy,
        numeric_confidence: DB_FUZZY_CONFIDENCE,
        employer_id: None,
        employer_name: None,
        suggested_matches: suggestions,
        action: MatchAction::ConfirmMatch,
        user_confirmed: false,
    }
}

fn resolve_in_memory(
    key: &ClassificationKey,
    company_name: &str,
    snapshot: &EmployerSnapshot,
) -> Option<EmployerMatchResult> {
    let mut scored: Vec<(f64, &Employer)> = snapshot
        .employers
        .iter()
        .map(|e| (name_similarity(company_name, &e.name), e))
        .filter(|(score, _)| *score >= IN_MEMORY_FUZZY_THRESHOLD)
        .collect();
    if scored.is_empty() {
        return None;
    }
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let (best_score, best) = scored[0];
    if best_score >= 1.0 {
        return Some(exact_result(key.clone(), best));
    }

    let suggestions: Vec<SuggestedMatch> = scored
        .iter()
        .take(MAX_SUGGESTED_MATCHES)
        .map(|(_, e)| suggested(e))
        .collect();
    Some(EmployerMatchResult {
        key: key.clone(),
        confidence: MatchConfidence::Fuzzy,
        numeric_confidence: fuzzy_confidence_bucket(best_score),
        employer_id: Some(best.id.clone()),
        employer_name: Some(best.name.clone()),
        suggested_matches: suggestions,
        action: MatchAction::ConfirmMatch,
        user_confirmed: false,
    })
}

/// Order database candidates: starts-with-first-token first, then substring
/// containment of the whole normalized name, then shorter names first.
fn rank_candidates(
    normalized: &str,
    tokens: &[String],
    candidates: Vec<Employer>,
) -> Vec<SuggestedMatch> {
    let first_token = tokens.first().map(String::as_str).unwrap_or("");
    let mut ranked = candidates;
    ranked.sort_by_key(|e| {
        let name_norm = normalize_company_name(&e.name);
        let starts = name_norm.starts_with(first_token);
        let contains = name_norm.contains(normalized);
        (!starts, !contains, e.name.len())
    });
    ranked
        .iter()
        .take(MAX_SUGGESTED_MATCHES)
        .map(suggested)
        .collect()
}

/// Resolve every importable classification, strictly sequentially with the
/// policy's inter-item pause between store round-trips.
pub async fn resolve_all<S: ImportStore>(
    store: &S,
    classifications: &[CompanyClassification],
    snapshot: Option<&EmployerSnapshot>,
    policy: ResolvePolicy,
) -> HashMap<ClassificationKey, EmployerMatchResult> {
    let pending: Vec<&CompanyClassification> = classifications
        .iter()
        .filter(|c| c.should_import && !c.user_excluded)
        .collect();
    let bar = phase_bar(pending.len() as u64, "Resolving employers");
    let mut results = HashMap::with_capacity(pending.len());

    for (i, classification) in pending.iter().enumerate() {
        let result = resolve(store, classification.key.clone(), snapshot).await;
        debug!(
            "Resolved '{}' on {}: {} ({:.2})",
            classification.key.company_name,
            classification.key.bci_project_id,
            result.confidence,
            result.numeric_confidence
        );
        results.insert(classification.key.clone(), result);
        bar.inc(1);
        if i + 1 < pending.len() && !policy.inter_item_delay.is_zero() {
            tokio::time::sleep(policy.inter_item_delay).await;
        }
    }
    bar.finish_and_clear();

    let exact = results
        .values()
        .filter(|r| r.confidence == MatchConfidence::Exact)
        .count();
    let fuzzy = results
        .values()
        .filter(|r| r.confidence == MatchConfidence::Fuzzy)
        .count();
    info!(
        "Resolution complete: {} exact, {} fuzzy, {} unmatched",
        exact,
        fuzzy,
        results.len() - exact - fuzzy
    );
    results
}

/// Persist an alias once the operator has manually confirmed a fuzzy match,
/// so the next batch resolves the same spelling at stage 1.
pub async fn record_alias<S: ImportStore>(
    store: &S,
    raw_name: &str,
    employer_id: &str,
) -> Result<()> {
    let normalized = normalize_company_name(raw_name);
    store.insert_alias(raw_name, &normalized, employer_id).await
}
