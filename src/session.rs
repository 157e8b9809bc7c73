// src/session.rs
// Wizard session: owns the batch state (rows, classifications, match
// results, consolidated view) and enforces the stage machine
// preview -> employer_matching -> trade_type_confirmation -> importing ->
// complete. All of it is session-local memory, discarded after the run.

use anyhow::{bail, Result};
use log::info;
use std::collections::{BTreeMap, HashMap};

use crate::classify::classify_row;
use crate::consolidate::{
    apply_bulk_role, apply_bulk_trade_type, confirm_consolidated_employer, consolidate,
};
use crate::import::execute;
use crate::ingest::distinct_projects;
use crate::matching::resolver::{resolve_all, EmployerSnapshot, ResolvePolicy};
use crate::models::{
    ClassificationKey, CompanyClassification, ConsolidatedEmployerMatch, EmployerMatchResult,
    ImportResults, ImportRow, ImportStage, MatchAction, MatchConfidence, OurRole, ProjectRecord,
    TradeType,
};
use crate::store::ImportStore;

/// How the non-interactive runner treats unresolved matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoConfirmMode {
    /// Confirm exact and no-match (create-new) entries; leave fuzzy entries
    /// unconfirmed so they are skipped at import.
    Exact,
    /// Additionally confirm every fuzzy entry to its top suggestion.
    All,
}

impl AutoConfirmMode {
    pub fn from_env() -> Self {
        match std::env::var("AUTO_CONFIRM").as_deref() {
            Ok("all") => AutoConfirmMode::All,
            _ => AutoConfirmMode::Exact,
        }
    }
}

pub struct ImportSession {
    rows: Vec<ImportRow>,
    pub stage: ImportStage,
    pub classifications: Vec<CompanyClassification>,
    pub matches: HashMap<ClassificationKey, EmployerMatchResult>,
    pub consolidated: BTreeMap<String, ConsolidatedEmployerMatch>,
}

impl ImportSession {
    pub fn new(rows: Vec<ImportRow>) -> Self {
        Self {
            rows,
            stage: ImportStage::Preview,
            classifications: Vec::new(),
            matches: HashMap::new(),
            consolidated: BTreeMap::new(),
        }
    }

    pub fn projects(&self) -> Vec<ProjectRecord> {
        distinct_projects(&self.rows)
    }

    fn require_stage(&self, expected: ImportStage, operation: &str) -> Result<()> {
        if self.stage != expected {
            bail!(
                "{} is only valid in the {} stage (current stage: {})",
                operation,
                expected,
                self.stage
            );
        }
        Ok(())
    }

    /// Classify every row, collapsing duplicate (project, company, role)
    /// keys, and advance to employer matching.
    pub fn classify_all(&mut self) -> Result<()> {
        self.require_stage(ImportStage::Preview, "classification")?;
        let mut seen = std::collections::HashSet::new();
        self.classifications = self
            .rows
            .iter()
            .map(classify_row)
            .filter(|c| seen.insert(c.key.clone()))
            .collect();
        let importable = self.classifications.iter().filter(|c| c.should_import).count();
        info!(
            "Classified {} rows: {} importable, {} skipped",
            self.classifications.len(),
            importable,
            self.classifications.len() - importable
        );
        self.stage = ImportStage::EmployerMatching;
        Ok(())
    }

    /// Resolve every importable classification and build the consolidated
    /// per-company review view.
    pub async fn resolve_matches<S: ImportStore>(
        &mut self,
        store: &S,
        snapshot: Option<&EmployerSnapshot>,
        policy: ResolvePolicy,
    ) -> Result<()> {
        self.require_stage(ImportStage::EmployerMatching, "employer resolution")?;
        self.matches = resolve_all(store, &self.classifications, snapshot, policy).await;
        for classification in &mut self.classifications {
            if let Some(m) = self.matches.get(&classification.key) {
                if m.user_confirmed {
                    classification.employer_id = m.employer_id.clone();
                    classification.user_confirmed = true;
                }
            }
        }
        self.consolidated = consolidate(&self.classifications, &self.matches);
        Ok(())
    }

    /// A classification is resolved once its match is confirmed or the
    /// operator skipped/excluded it.
    pub fn all_resolved(&self) -> bool {
        self.classifications
            .iter()
            .filter(|c| c.should_import && !c.user_excluded)
            .all(|c| {
                self.matches
                    .get(&c.key)
                    .map(EmployerMatchResult::is_resolved)
                    .unwrap_or(false)
            })
    }

    pub fn apply_bulk_role(&mut self, normalized_name: &str, role: OurRole) -> usize {
        apply_bulk_role(
            &mut self.consolidated,
            &mut self.classifications,
            normalized_name,
            role,
        )
        .len()
    }

    pub fn apply_bulk_trade_type(&mut self, normalized_name: &str, trade: TradeType) -> usize {
        apply_bulk_trade_type(
            &mut self.consolidated,
            &mut self.classifications,
            normalized_name,
            trade,
        )
        .len()
    }

    pub fn confirm_employer(&mut self, normalized_name: &str) -> usize {
        confirm_consolidated_employer(
            &mut self.consolidated,
            &mut self.classifications,
            &mut self.matches,
            normalized_name,
        )
    }

    pub fn exclude_company(&mut self, key: &ClassificationKey) {
        for classification in &mut self.classifications {
            if &classification.key == key {
                classification.user_excluded = true;
            }
        }
        self.consolidated = consolidate(&self.classifications, &self.matches);
    }

    /// Non-interactive confirmation pass for the CLI runner.
    pub fn auto_confirm(&mut self, mode: AutoConfirmMode) -> usize {
        let names: Vec<String> = self.consolidated.keys().cloned().collect();
        let mut confirmed_groups = 0;
        for name in names {
            let entry = match self.consolidated.get_mut(&name) {
                Some(entry) => entry,
                None => continue,
            };
            let confirmable = match entry.confidence {
                MatchConfidence::Exact => true,
                MatchConfidence::None => true,
                MatchConfidence::Fuzzy => mode == AutoConfirmMode::All,
            };
            if !confirmable {
                continue;
            }
            if entry.confidence == MatchConfidence::Fuzzy {
                if let Some(best) = entry.suggested_matches.first() {
                    entry.employer_id = Some(best.id.clone());
                    entry.employer_name = Some(best.name.clone());
                    entry.action = MatchAction::ConfirmMatch;
                } else {
                    entry.action = MatchAction::CreateNew;
                }
            }
            if self.confirm_employer(&name) > 0 {
                confirmed_groups += 1;
            }
        }
        info!("Auto-confirmed {} consolidated employers ({:?})", confirmed_groups, mode);
        confirmed_groups
    }

    /// Advance to trade confirmation; requires every match resolved.
    pub fn finish_matching(&mut self) -> Result<()> {
        self.require_stage(ImportStage::EmployerMatching, "finishing matching")?;
        if !self.all_resolved() {
            bail!("Cannot advance: unresolved employer matches remain");
        }
        self.stage = ImportStage::TradeTypeConfirmation;
        Ok(())
    }

    /// User-triggered and irreversible within a run.
    pub fn begin_import(&mut self) -> Result<()> {
        self.require_stage(ImportStage::TradeTypeConfirmation, "starting the import")?;
        self.stage = ImportStage::Importing;
        Ok(())
    }

    pub async fn run_import<S: ImportStore>(&mut self, store: &S) -> Result<ImportResults> {
        self.require_stage(ImportStage::Importing, "running the import")?;
        let projects = self.projects();
        let results = execute(store, &projects, &self.classifications, &self.matches).await;
        self.stage = ImportStage::Complete;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::time::Duration;

    fn row(project: &str, role: &str, company: &str) -> ImportRow {
        ImportRow {
            bci_project_id: project.to_string(),
            project_name: format!("{} development", project),
            role_on_project: role.to_string(),
            company_name: company.to_string(),
            value: None,
            construction_start_date: None,
            construction_end_date: None,
            address: None,
            suburb: None,
            state: None,
            postcode: None,
            stage: None,
            latitude: None,
            longitude: None,
        }
    }

    fn no_delay() -> ResolvePolicy {
        ResolvePolicy {
            inter_item_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn stages_are_enforced_in_order() {
        let store = MemoryStore::new();
        let mut session = ImportSession::new(vec![row("P1", "Builder", "Acme Builders Pty Ltd")]);

        assert!(session.finish_matching().is_err());
        assert!(session.begin_import().is_err());
        assert!(session.run_import(&store).await.is_err());

        session.classify_all().unwrap();
        assert_eq!(session.stage, ImportStage::EmployerMatching);
        assert!(session.classify_all().is_err());
    }

    #[tokio::test]
    async fn finish_matching_requires_all_resolved() {
        let store = MemoryStore::new();
        // Unknown company resolves to an unconfirmed create-new entry.
        let mut session = ImportSession::new(vec![row("P1", "Builder", "Nowhere Pty Ltd")]);
        session.classify_all().unwrap();
        session.resolve_matches(&store, None, no_delay()).await.unwrap();
        assert!(!session.all_resolved());
        assert!(session.finish_matching().is_err());

        session.auto_confirm(AutoConfirmMode::Exact);
        assert!(session.all_resolved());
        session.finish_matching().unwrap();
        assert_eq!(session.stage, ImportStage::TradeTypeConfirmation);
    }

    #[tokio::test]
    async fn full_session_runs_to_complete() {
        let store = MemoryStore::new();
        store.seed_employer("Acme Builders Pty Ltd").await;

        let mut session = ImportSession::new(vec![
            row("P1", "Builder", "Acme Builders Pty Ltd"),
            row("P1", "Subcontractor - Electrical", "Zenith Electrical Pty Ltd"),
        ]);
        session.classify_all().unwrap();
        session.resolve_matches(&store, None, no_delay()).await.unwrap();
        session.auto_confirm(AutoConfirmMode::Exact);
        session.finish_matching().unwrap();
        session.begin_import().unwrap();
        let results = session.run_import(&store).await.unwrap();

        assert_eq!(session.stage, ImportStage::Complete);
        assert_eq!(results.success, 1);
        assert_eq!(results.employers_matched, 1);
        assert_eq!(results.employers_created, 1);
        assert!(results.errors.is_empty());
    }

    #[tokio::test]
    async fn duplicate_rows_collapse_to_one_classification() {
        let mut session = ImportSession::new(vec![
            row("P1", "Builder", "Acme Builders Pty Ltd"),
            row("P1", "Builder", "Acme Builders Pty Ltd"),
        ]);
        session.classify_all().unwrap();
        assert_eq!(session.classifications.len(), 1);
    }

    #[tokio::test]
    async fn excluded_companies_drop_out_of_the_consolidated_view() {
        let store = MemoryStore::new();
        let mut session = ImportSession::new(vec![
            row("P1", "Builder", "Acme Builders Pty Ltd"),
            row("P1", "Subcontractor", "Zenith Plumbing Pty Ltd"),
        ]);
        session.classify_all().unwrap();
        session.resolve_matches(&store, None, no_delay()).await.unwrap();
        assert_eq!(session.consolidated.len(), 2);

        let key = session.classifications[1].key.clone();
        session.exclude_company(&key);
        assert_eq!(session.consolidated.len(), 1);
        // The excluded company no longer blocks stage progression.
        session.auto_confirm(AutoConfirmMode::Exact);
        assert!(session.all_resolved());
    }
}
