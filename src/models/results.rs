// src/models/results.rs
// Wizard stage machine and the batch-level results the operator sees.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wizard stages. Forward-only; `Importing` is irreversible within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Preview,
    EmployerMatching,
    TradeTypeConfirmation,
    Importing,
    Complete,
}

impl ImportStage {
    pub fn next(&self) -> Option<ImportStage> {
        match self {
            ImportStage::Preview => Some(ImportStage::EmployerMatching),
            ImportStage::EmployerMatching => Some(ImportStage::TradeTypeConfirmation),
            ImportStage::TradeTypeConfirmation => Some(ImportStage::Importing),
            ImportStage::Importing => Some(ImportStage::Complete),
            ImportStage::Complete => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStage::Preview => "preview",
            ImportStage::EmployerMatching => "employer_matching",
            ImportStage::TradeTypeConfirmation => "trade_type_confirmation",
            ImportStage::Importing => "importing",
            ImportStage::Complete => "complete",
        }
    }
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Batch outcome summary. Every caught failure lands in `errors` verbatim so
/// partial success stays legible on the final screen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResults {
    pub success: usize,
    pub errors: Vec<String>,
    pub projects_created: Vec<String>,
    pub employers_created: usize,
    pub employers_matched: usize,
}

impl ImportResults {
    pub fn record_error(&mut self, context: &str, err: impl fmt::Display) {
        self.errors.push(format!("{}: {}", context, err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_progression_is_linear_and_terminal() {
        let mut stage = ImportStage::Preview;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            stage = next;
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                ImportStage::Preview,
                ImportStage::EmployerMatching,
                ImportStage::TradeTypeConfirmation,
                ImportStage::Importing,
                ImportStage::Complete,
            ]
        );
        assert!(ImportStage::Complete.next().is_none());
    }

    #[test]
    fn record_error_keeps_context() {
        let mut results = ImportResults::default();
        results.record_error("Project P1", "rpc failed");
        assert_eq!(results.errors, vec!["Project P1: rpc failed"]);
    }
}
