// src/store/mod.rs
// External-store seam. The trait covers exactly the backend surface the
// pipeline consumes: employer/alias lookups, project and job-site upserts,
// and the role-assignment stored procedures with their fallback writes.

use anyhow::Result;

use crate::models::{Employer, ProjectRecord, TradeType};

pub mod pg;

#[cfg(test)]
pub mod memory;

/// Outcome row returned by the assignment stored procedures.
#[derive(Debug, Clone)]
pub struct RpcOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl RpcOutcome {
    pub fn describe(&self) -> String {
        self.message.clone().unwrap_or_else(|| {
            if self.success {
                "ok".to_string()
            } else {
                "procedure reported failure".to_string()
            }
        })
    }
}

/// Everything the resolver and executor need from the backend. Async fns
/// with generic dispatch; the Postgres implementation lives in `pg`, the
/// in-memory one under test. Callers never spawn these futures, so the
/// auto-trait bounds the lint warns about do not matter here.
#[allow(async_fn_in_trait)]
pub trait ImportStore {
    // --- employer resolution reads ---

    /// Exact hit in the persisted alias table, keyed on normalized name.
    async fn find_alias(&self, normalized_name: &str) -> Result<Option<Employer>>;

    /// Case-insensitive exact match on employer name.
    async fn find_employer_exact(&self, name: &str) -> Result<Option<Employer>>;

    /// Substring search: any employer whose name contains one of the tokens.
    async fn search_employers(&self, tokens: &[String]) -> Result<Vec<Employer>>;

    /// Full employer list for the in-memory fuzzy snapshot.
    async fn load_employers(&self) -> Result<Vec<Employer>>;

    // --- employer writes ---

    async fn create_employer(&self, name: &str) -> Result<Employer>;

    /// Persist an alias so the next batch resolves this spelling instantly.
    async fn insert_alias(&self, alias: &str, normalized_name: &str, employer_id: &str)
        -> Result<()>;

    // --- project / job site ---

    /// Internal project id for a BCI business key, if the project exists.
    async fn find_project_by_bci_id(&self, bci_project_id: &str) -> Result<Option<String>>;

    async fn insert_project(&self, record: &ProjectRecord) -> Result<String>;

    async fn update_project(&self, project_id: &str, record: &ProjectRecord) -> Result<()>;

    /// Create or update the main job site, linked back to the project.
    /// Returns the job site id.
    async fn upsert_job_site(&self, project_id: &str, record: &ProjectRecord) -> Result<String>;

    // --- role assignment: primary RPC paths ---

    async fn assign_bci_builder(
        &self,
        project_id: &str,
        employer_id: &str,
        company_name: &str,
    ) -> Result<RpcOutcome>;

    async fn assign_contractor_unified(
        &self,
        project_id: &str,
        job_site_id: &str,
        employer_id: &str,
        trade_type: TradeType,
        stage: Option<&str>,
    ) -> Result<RpcOutcome>;

    async fn assign_multiple_trade_types(
        &self,
        project_id: &str,
        employer_id: &str,
        trade_types: &[TradeType],
        stage: Option<&str>,
    ) -> Result<Vec<RpcOutcome>>;

    // --- role assignment: fallback + guarded writes ---

    /// Direct builder column update, the documented fallback when the
    /// builder RPC fails.
    async fn set_project_builder(&self, project_id: &str, employer_id: &str) -> Result<()>;

    async fn project_role_exists(
        &self,
        project_id: &str,
        employer_id: &str,
        role: &str,
    ) -> Result<bool>;

    async fn insert_project_role(
        &self,
        project_id: &str,
        employer_id: &str,
        role: &str,
    ) -> Result<()>;

    /// Manual insert into the contractor-trades table, the documented
    /// fallback when the unified assignment RPC fails.
    async fn insert_contractor_trade(
        &self,
        project_id: &str,
        job_site_id: &str,
        employer_id: &str,
        trade_type: TradeType,
    ) -> Result<()>;
}
