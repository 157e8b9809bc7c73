// src/models/matching.rs
// Match-result and consolidation entities. All session-local: built during a
// wizard run, discarded when it completes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::core::{ClassificationKey, OurRole, TradeType};

/// How certain an employer-name match is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Exact,
    Fuzzy,
    None,
}

impl MatchConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchConfidence::Exact => "exact",
            MatchConfidence::Fuzzy => "fuzzy",
            MatchConfidence::None => "none",
        }
    }
}

impl fmt::Display for MatchConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the operator decided to do with a match. Only meaningful once the
/// result is user-confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAction {
    ConfirmMatch,
    SearchManual,
    CreateNew,
    AddToList,
    Skip,
}

/// One candidate employer surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedMatch {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
}

/// Resolver output for one classification key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployerMatchResult {
    pub key: ClassificationKey,
    pub confidence: MatchConfidence,
    pub numeric_confidence: f64,
    pub employer_id: Option<String>,
    pub employer_name: Option<String>,
    /// Ordered, best candidate first.
    pub suggested_matches: Vec<SuggestedMatch>,
    pub action: MatchAction,
    pub user_confirmed: bool,
}

impl EmployerMatchResult {
    pub fn no_match(key: ClassificationKey) -> Self {
        Self {
            key,
            confidence: MatchConfidence::None,
            numeric_confidence: 0.0,
            employer_id: None,
            employer_name: None,
            suggested_matches: Vec::new(),
            action: MatchAction::CreateNew,
            user_confirmed: false,
        }
    }

    /// Resolved enough to let the wizard advance past employer matching:
    /// confirmed (by the operator or auto-confirmed exact) or skipped.
    pub fn is_resolved(&self) -> bool {
        self.user_confirmed || self.action == MatchAction::Skip
    }
}

/// One (project, role, trade) appearance of a company inside a consolidated
/// group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectAssignment {
    pub key: ClassificationKey,
    pub our_role: OurRole,
    pub trade_type: Option<TradeType>,
}

/// One physical employer across the whole batch, keyed by normalized company
/// name. Recomputed from classifications + match results each time; never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedEmployerMatch {
    pub normalized_name: String,
    /// Representative raw spelling (first appearance wins).
    pub display_name: String,
    pub confidence: MatchConfidence,
    pub numeric_confidence: f64,
    pub employer_id: Option<String>,
    pub employer_name: Option<String>,
    pub suggested_matches: Vec<SuggestedMatch>,
    pub action: MatchAction,
    pub project_assignments: Vec<ProjectAssignment>,
    pub has_consistent_role: bool,
    pub has_consistent_trade: bool,
    pub bulk_role: Option<OurRole>,
    pub bulk_trade_type: Option<TradeType>,
    pub user_confirmed: bool,
}
