// src/store/memory.rs
// In-memory ImportStore used by the resolver/executor tests. Mirrors the
// Postgres implementation's observable behavior, with per-surface failure
// injection so degradation and fallback paths can be exercised.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::matching::normalize::normalize_company_name;
use crate::models::{Employer, ProjectRecord, TradeType};

use super::{ImportStore, RpcOutcome};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRole {
    pub project_id: String,
    pub employer_id: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrade {
    pub project_id: String,
    pub job_site_id: String,
    pub employer_id: String,
    pub trade_type: TradeType,
    pub via_fallback: bool,
}

#[derive(Debug, Default)]
pub struct MemoryState {
    pub employers: Vec<Employer>,
    /// normalized alias -> employer id
    pub aliases: HashMap<String, String>,
    /// internal project id -> record
    pub projects: HashMap<String, ProjectRecord>,
    /// internal project id -> job site id
    pub job_sites: HashMap<String, String>,
    /// project id -> builder employer id
    pub builders: HashMap<String, String>,
    pub roles: Vec<StoredRole>,
    pub trades: Vec<StoredTrade>,
}

/// Which store surfaces fail on their next calls.
#[derive(Debug, Default, Clone)]
pub struct FailureInjection {
    pub fail_alias_lookup: bool,
    pub fail_exact_lookup: bool,
    pub fail_search: bool,
    pub fail_builder_rpc: bool,
    pub fail_builder_fallback: bool,
    pub fail_contractor_rpc: bool,
    pub fail_contractor_fallback: bool,
    pub fail_insert_project: bool,
}

pub struct MemoryStore {
    pub state: Mutex<MemoryState>,
    pub failures: FailureInjection,
    next_id: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            failures: FailureInjection::default(),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn with_failures(failures: FailureInjection) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            failures,
            next_id: AtomicUsize::new(1),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn seed_employer(&self, name: &str) -> Employer {
        let employer = Employer {
            id: self.next_id("emp"),
            name: name.to_string(),
            address: None,
            suburb: None,
            state: None,
            postcode: None,
        };
        self.state.lock().await.employers.push(employer.clone());
        employer
    }

    pub async fn seed_alias(&self, alias: &str, employer_id: &str) {
        self.state
            .lock()
            .await
            .aliases
            .insert(normalize_company_name(alias), employer_id.to_string());
    }
}

impl ImportStore for MemoryStore {
    async fn find_alias(&self, normalized_name: &str) -> Result<Option<Employer>> {
        if self.failures.fail_alias_lookup {
            return Err(anyhow!("injected alias lookup failure"));
        }
        let state = self.state.lock().await;
        let employer_id = match state.aliases.get(normalized_name) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        Ok(state.employers.iter().find(|e| e.id == employer_id).cloned())
    }

    async fn find_employer_exact(&self, name: &str) -> Result<Option<Employer>> {
        if self.failures.fail_exact_lookup {
            return Err(anyhow!("injected exact lookup failure"));
        }
        let state = self.state.lock().await;
        Ok(state
            .employers
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn search_employers(&self, tokens: &[String]) -> Result<Vec<Employer>> {
        if self.failures.fail_search {
            return Err(anyhow!("injected search failure"));
        }
        let state = self.state.lock().await;
        let mut hits: Vec<Employer> = state
            .employers
            .iter()
            .filter(|e| {
                let name_lower = e.name.to_lowercase();
                tokens.iter().any(|t| name_lower.contains(t.as_str()))
            })
            .cloned()
            .collect();
        hits.sort_by_key(|e| e.name.len());
        Ok(hits)
    }

    async fn load_employers(&self) -> Result<Vec<Employer>> {
        Ok(self.state.lock().await.employers.clone())
    }

    async fn create_employer(&self, name: &str) -> Result<Employer> {
        let employer = Employer {
            id: self.next_id("emp"),
            name: name.to_string(),
            address: None,
            suburb: None,
            state: None,
            postcode: None,
        };
        self.state.lock().await.employers.push(employer.clone());
        Ok(employer)
    }

    async fn insert_alias(
        &self,
        _alias: &str,
        normalized_name: &str,
        employer_id: &str,
    ) -> Result<()> {
        self.state
            .lock()
            .await
            .aliases
            .insert(normalized_name.to_string(), employer_id.to_string());
        Ok(())
    }

    async fn find_project_by_bci_id(&self, bci_project_id: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state
            .projects
            .iter()
            .find(|(_, p)| p.bci_project_id == bci_project_id)
            .map(|(id, _)| id.clone()))
    }

    async fn insert_project(&self, record: &ProjectRecord) -> Result<String> {
        if self.failures.fail_insert_project {
            return Err(anyhow!("injected project insert failure"));
        }
        let id = self.next_id("proj");
        self.state.lock().await.projects.insert(id.clone(), record.clone());
        Ok(id)
    }

    async fn update_project(&self, project_id: &str, record: &ProjectRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.projects.get_mut(project_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(anyhow!("no project with id {}", project_id)),
        }
    }

    async fn upsert_job_site(&self, project_id: &str, _record: &ProjectRecord) -> Result<String> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.job_sites.get(project_id) {
            return Ok(existing.clone());
        }
        let id = self.next_id("site");
        state.job_sites.insert(project_id.to_string(), id.clone());
        Ok(id)
    }

    async fn assign_bci_builder(
        &self,
        project_id: &str,
        employer_id: &str,
        _company_name: &str,
    ) -> Result<RpcOutcome> {
        if self.failures.fail_builder_rpc {
            return Err(anyhow!("injected builder rpc failure"));
        }
        self.state
            .lock()
            .await
            .builders
            .insert(project_id.to_string(), employer_id.to_string());
        Ok(RpcOutcome {
            success: true,
            message: None,
        })
    }

    async fn assign_contractor_unified(
        &self,
        project_id: &str,
        job_site_id: &str,
        employer_id: &str,
        trade_type: TradeType,
        _stage: Option<&str>,
    ) -> Result<RpcOutcome> {
        if self.failures.fail_contractor_rpc {
            return Err(anyhow!("injected contractor rpc failure"));
        }
        self.state.lock().await.trades.push(StoredTrade {
            project_id: project_id.to_string(),
            job_site_id: job_site_id.to_string(),
            employer_id: employer_id.to_string(),
            trade_type,
            via_fallback: false,
        });
        Ok(RpcOutcome {
            success: true,
            message: None,
        })
    }

    async fn assign_multiple_trade_types(
        &self,
        project_id: &str,
        employer_id: &str,
        trade_types: &[TradeType],
        _stage: Option<&str>,
    ) -> Result<Vec<RpcOutcome>> {
        if self.failures.fail_contractor_rpc {
            return Err(anyhow!("injected contractor rpc failure"));
        }
        let mut state = self.state.lock().await;
        let job_site_id = state
            .job_sites
            .get(project_id)
            .cloned()
            .unwrap_or_default();
        for trade in trade_types {
            state.trades.push(StoredTrade {
                project_id: project_id.to_string(),
                job_site_id: job_site_id.clone(),
                employer_id: employer_id.to_string(),
                trade_type: *trade,
                via_fallback: false,
            });
        }
        Ok(trade_types
            .iter()
            .map(|_| RpcOutcome {
                success: true,
                message: None,
            })
            .collect())
    }

    async fn set_project_builder(&self, project_id: &str, employer_id: &str) -> Result<()> {
        if self.failures.fail_builder_fallback {
            return Err(anyhow!("injected builder fallback failure"));
        }
        self.state
            .lock()
            .await
            .builders
            .insert(project_id.to_string(), employer_id.to_string());
        Ok(())
    }

    async fn project_role_exists(
        &self,
        project_id: &str,
        employer_id: &str,
        role: &str,
    ) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.roles.iter().any(|r| {
            r.project_id == project_id && r.employer_id == employer_id && r.role == role
        }))
    }

    async fn insert_project_role(
        &self,
        project_id: &str,
        employer_id: &str,
        role: &str,
    ) -> Result<()> {
        self.state.lock().await.roles.push(StoredRole {
            project_id: project_id.to_string(),
            employer_id: employer_id.to_string(),
            role: role.to_string(),
        });
        Ok(())
    }

    async fn insert_contractor_trade(
        &self,
        project_id: &str,
        job_site_id: &str,
        employer_id: &str,
        trade_type: TradeType,
    ) -> Result<()> {
        if self.failures.fail_contractor_fallback {
            return Err(anyhow!("injected contractor fallback failure"));
        }
        self.state.lock().await.trades.push(StoredTrade {
            project_id: project_id.to_string(),
            job_site_id: job_site_id.to_string(),
            employer_id: employer_id.to_string(),
            trade_type,
            via_fallback: true,
        });
        Ok(())
    }
}
