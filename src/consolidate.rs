// src/consolidate.rs
// Consolidation Layer: one review entry per physical employer instead of one
// per (project, row) appearance. Groups classification + match pairs by
// normalized company name, tracks whether role/trade are consistent across
// projects, and fans bulk decisions and confirmations back down to the
// per-row state.

use log::{debug, info};
use std::collections::{BTreeMap, HashMap};

use crate::matching::normalize::normalize_company_name;
use crate::models::{
    ClassificationKey, CompanyClassification, ConsolidatedEmployerMatch, EmployerMatchResult,
    MatchAction, MatchConfidence, OurRole, ProjectAssignment, TradeType,
};

/// Build the per-company view. Pure projection; recomputed whenever the
/// underlying state changes.
pub fn consolidate(
    classifications: &[CompanyClassification],
    matches: &HashMap<ClassificationKey, EmployerMatchResult>,
) -> BTreeMap<String, ConsolidatedEmployerMatch> {
    let mut consolidated: BTreeMap<String, ConsolidatedEmployerMatch> = BTreeMap::new();

    for classification in classifications {
        if !classification.should_import || classification.user_excluded {
            continue;
        }
        let normalized = normalize_company_name(&classification.key.company_name);
        if normalized.is_empty() {
            continue;
        }
        let match_result = matches.get(&classification.key);

        let entry = consolidated
            .entry(normalized.clone())
            .or_insert_with(|| ConsolidatedEmployerMatch {
                normalized_name: normalized.clone(),
                display_name: classification.key.company_name.clone(),
                confidence: MatchConfidence::None,
                numeric_confidence: 0.0,
                employer_id: None,
                employer_name: None,
                suggested_matches: Vec::new(),
                action: MatchAction::CreateNew,
                project_assignments: Vec::new(),
                has_consistent_role: true,
                has_consistent_trade: true,
                bulk_role: None,
                bulk_trade_type: None,
                user_confirmed: false,
            });

        entry.project_assignments.push(ProjectAssignment {
            key: classification.key.clone(),
            our_role: classification.our_role,
            trade_type: classification.primary_trade(),
        });

        // The best match seen for any appearance represents the group.
        if let Some(m) = match_result {
            if m.numeric_confidence > entry.numeric_confidence
                || entry.project_assignments.len() == 1
            {
                entry.confidence = m.confidence;
                entry.numeric_confidence = m.numeric_confidence;
                entry.employer_id = m.employer_id.clone();
                entry.employer_name = m.employer_name.clone();
                entry.suggested_matches = m.suggested_matches.clone();
                entry.action = m.action;
            }
            if m.user_confirmed {
                entry.user_confirmed = true;
            }
        }
    }

    for entry in consolidated.values_mut() {
        let mut roles: Vec<OurRole> = entry
            .project_assignments
            .iter()
            .map(|a| a.our_role)
            .collect();
        roles.sort_by_key(|r| r.as_str());
        roles.dedup();
        entry.has_consistent_role = roles.len() == 1;
        entry.bulk_role = if entry.has_consistent_role {
            roles.first().copied()
        } else {
            None
        };

        let mut trades: Vec<Option<TradeType>> = entry
            .project_assignments
            .iter()
            .map(|a| a.trade_type)
            .collect();
        trades.sort_by_key(|t| t.map(|t| t.as_str()));
        trades.dedup();
        entry.has_consistent_trade = trades.len() == 1;
        entry.bulk_trade_type = if entry.has_consistent_trade {
            trades.first().copied().flatten()
        } else {
            None
        };
    }

    info!(
        "Consolidated {} classifications into {} employers",
        classifications.len(),
        consolidated.len()
    );
    consolidated
}

/// Apply one role to every appearance of a company. Updates the per-row
/// classifications in place and returns the affected keys.
pub fn apply_bulk_role(
    consolidated: &mut BTreeMap<String, ConsolidatedEmployerMatch>,
    classifications: &mut [CompanyClassification],
    normalized_name: &str,
    role: OurRole,
) -> Vec<ClassificationKey> {
    let entry = match consolidated.get_mut(normalized_name) {
        Some(entry) => entry,
        None => return Vec::new(),
    };
    let mut touched = Vec::with_capacity(entry.project_assignments.len());
    for assignment in &mut entry.project_assignments {
        assignment.our_role = role;
        touched.push(assignment.key.clone());
    }
    entry.has_consistent_role = true;
    entry.bulk_role = Some(role);

    for classification in classifications.iter_mut() {
        if touched.contains(&classification.key) {
            classification.our_role = role;
        }
    }
    debug!("Applied bulk role {} to '{}' ({} rows)", role, normalized_name, touched.len());
    touched
}

/// Apply one trade type to every appearance of a company; the chosen trade
/// becomes the primary (first) tag on each underlying classification.
pub fn apply_bulk_trade_type(
    consolidated: &mut BTreeMap<String, ConsolidatedEmployerMatch>,
    classifications: &mut [CompanyClassification],
    normalized_name: &str,
    trade: TradeType,
) -> Vec<ClassificationKey> {
    let entry = match consolidated.get_mut(normalized_name) {
        Some(entry) => entry,
        None => return Vec::new(),
    };
    let mut touched = Vec::with_capacity(entry.project_assignments.len());
    for assignment in &mut entry.project_assignments {
        assignment.trade_type = Some(trade);
        touched.push(assignment.key.clone());
    }
    entry.has_consistent_trade = true;
    entry.bulk_trade_type = Some(trade);

    for classification in classifications.iter_mut() {
        if touched.contains(&classification.key) {
            classification.trade_types.retain(|t| *t != trade);
            classification.trade_types.insert(0, trade);
        }
    }
    debug!("Applied bulk trade {} to '{}' ({} rows)", trade, normalized_name, touched.len());
    touched
}

/// Confirm a consolidated employer: every underlying match gets
/// `user_confirmed` with the consolidated employer id / name / confidence /
/// action copied down.
pub fn confirm_consolidated_employer(
    consolidated: &mut BTreeMap<String, ConsolidatedEmployerMatch>,
    classifications: &mut [CompanyClassification],
    matches: &mut HashMap<ClassificationKey, EmployerMatchResult>,
    normalized_name: &str,
) -> usize {
    let entry = match consolidated.get_mut(normalized_name) {
        Some(entry) => entry,
        None => return 0,
    };
    entry.user_confirmed = true;

    let mut confirmed = 0;
    for assignment in &entry.project_assignments {
        if let Some(m) = matches.get_mut(&assignment.key) {
            m.user_confirmed = true;
            m.confidence = entry.confidence;
            m.numeric_confidence = entry.numeric_confidence;
            m.employer_id = entry.employer_id.clone();
            m.employer_name = entry.employer_name.clone();
            m.action = entry.action;
            confirmed += 1;
        }
        for classification in classifications.iter_mut() {
            if classification.key == assignment.key {
                classification.user_confirmed = true;
                classification.employer_id = entry.employer_id.clone();
            }
        }
    }
    debug!("Confirmed '{}' across {} rows", normalized_name, confirmed);
    confirmed
}
