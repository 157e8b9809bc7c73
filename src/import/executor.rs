// src/import/executor.rs
// Import Executor: persists confirmed projects, job sites and role/trade
// assignments, one project at a time. Every failure is caught, stringified
// into the batch's error list and the loop moves on; a single bad row never
// aborts the batch.

use anyhow::Result;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::future::Future;

use crate::matching::normalize::{normalize_company_name, tokenize_company_name};
use crate::models::{
    ClassificationKey, CompanyClassification, EmployerMatchResult, ImportResults, MatchAction,
    OurRole, ProjectRecord,
};
use crate::store::{ImportStore, RpcOutcome};
use crate::utils::progress::phase_bar;

const HEAD_CONTRACTOR_ROLE: &str = "head_contractor";

/// Attempt the primary write path; on failure attempt the documented
/// secondary path. Only a fallback failure lands in `errors`; a primary
/// failure with a working fallback is logged and forgotten.
pub async fn write_with_fallback<P, F>(
    label: &str,
    primary: P,
    fallback: F,
    errors: &mut Vec<String>,
) -> bool
where
    P: Future<Output = Result<RpcOutcome>>,
    F: Future<Output = Result<()>>,
{
    let primary_failure = match primary.await {
        Ok(outcome) if outcome.success => return true,
        Ok(outcome) => outcome.describe(),
        Err(e) => e.to_string(),
    };
    warn!("{}: primary write failed ({}), attempting fallback", label, primary_failure);

    match fallback.await {
        Ok(()) => {
            debug!("{}: fallback write succeeded", label);
            true
        }
        Err(e) => {
            errors.push(format!("{}: {} (fallback also failed: {})", label, primary_failure, e));
            false
        }
    }
}

/// Run the import for every confirmed company across the given projects.
pub async fn execute<S: ImportStore>(
    store: &S,
    projects: &[ProjectRecord],
    classifications: &[CompanyClassification],
    matches: &HashMap<ClassificationKey, EmployerMatchResult>,
) -> ImportResults {
    let mut results = ImportResults::default();
    // Employers created this run, keyed by normalized name, so the same new
    // company appearing on several projects is only created once.
    let mut created_this_run: HashMap<String, String> = HashMap::new();
    let mut matched_ids: HashSet<String> = HashSet::new();

    let bar = phase_bar(projects.len() as u64, "Importing projects");
    for project in projects {
        match import_project(
            store,
            project,
            classifications,
            matches,
            &mut created_this_run,
            &mut matched_ids,
            &mut results,
        )
        .await
        {
            Ok(()) => results.success += 1,
            Err(e) => {
                results.record_error(&format!("Project {}", project.bci_project_id), e);
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    info!(
        "Import complete: {} projects ok, {} employers matched, {} created, {} errors",
        results.success,
        results.employers_matched,
        results.employers_created,
        results.errors.len()
    );
    results
}

/// Project-level work: upsert the project and its main site, then assign
/// every confirmed company. Company-level failures are recorded in
/// `results.errors` here and do not fail the project.
async fn import_project<S: ImportStore>(
    store: &S,
    project: &ProjectRecord,
    classifications: &[CompanyClassification],
    matches: &HashMap<ClassificationKey, EmployerMatchResult>,
    created_this_run: &mut HashMap<String, String>,
    matched_ids: &mut HashSet<String>,
    results: &mut ImportResults,
) -> Result<()> {
    // Idempotent on the business key: update in place, never duplicate.
    let project_id = match store.find_project_by_bci_id(&project.bci_project_id).await? {
        Some(existing_id) => {
            debug!("Updating existing project {} ({})", project.bci_project_id, existing_id);
            store.update_project(&existing_id, project).await?;
            existing_id
        }
        None => {
            let new_id = store.insert_project(project).await?;
            results.projects_created.push(project.bci_project_id.clone());
            new_id
        }
    };

    let job_site_id = store.upsert_job_site(&project_id, project).await?;

    let confirmed: Vec<&CompanyClassification> = classifications
        .iter()
        .filter(|c| c.key.bci_project_id == project.bci_project_id)
        .filter(|c| c.should_import && !c.user_excluded && c.our_role != OurRole::Skip)
        .filter(|c| {
            matches
                .get(&c.key)
                .map(|m| m.user_confirmed && m.action != MatchAction::Skip)
                .unwrap_or(false)
        })
        .collect();

    for classification in confirmed {
        let match_result = &matches[&classification.key];
        let company = &classification.key.company_name;

        let employer_id = match final_employer_id(
            store,
            company,
            match_result,
            created_this_run,
            matched_ids,
            results,
        )
        .await
        {
            Ok(id) => id,
            Err(e) => {
                results.record_error(
                    &format!("Employer '{}' on {}", company, project.bci_project_id),
                    e,
                );
                continue;
            }
        };

        assign_role(
            store,
            &project_id,
            &job_site_id,
            &employer_id,
            classification,
            project.stage.as_deref(),
            results,
        )
        .await;
    }
    Ok(())
}

/// Resolve the employer id a confirmed company imports against, creating the
/// employer when the confirmed action is create-new. Creation goes through
/// duplicate prevention: exact-name reuse first, then a warn on similar
/// names, then insert.
async fn final_employer_id<S: ImportStore>(
    store: &S,
    company: &str,
    match_result: &EmployerMatchResult,
    created_this_run: &mut HashMap<String, String>,
    matched_ids: &mut HashSet<String>,
    results: &mut ImportResults,
) -> Result<String> {
    if match_result.action != MatchAction::CreateNew {
        if let Some(id) = &match_result.employer_id {
            if matched_ids.insert(id.clone()) {
                results.employers_matched += 1;
            }
            return Ok(id.clone());
        }
        // Confirmed without a concrete id; fall through to the create path.
    }

    let normalized = normalize_company_name(company);
    if let Some(id) = created_this_run.get(&normalized) {
        return Ok(id.clone());
    }

    if let Some(existing) = store.find_employer_exact(company).await? {
        debug!("Duplicate prevention: '{}' already exists as {}", company, existing.id);
        if matched_ids.insert(existing.id.clone()) {
            results.employers_matched += 1;
        }
        created_this_run.insert(normalized, existing.id.clone());
        return Ok(existing.id);
    }

    let tokens = tokenize_company_name(company);
    match store.search_employers(&tokens).await {
        Ok(similar) if !similar.is_empty() => {
            warn!(
                "Creating '{}' despite {} similar existing employers (closest: '{}')",
                company,
                similar.len(),
                similar[0].name
            );
        }
        Ok(_) => {}
        Err(e) => warn!("Similar-name check failed for '{}': {}", company, e),
    }

    let employer = store.create_employer(company).await?;
    results.employers_created += 1;
    created_this_run.insert(normalized, employer.id.clone());
    Ok(employer.id)
}

/// Assign the classified role through its stored procedure, with the
/// documented manual fallback per role kind.
async fn assign_role<S: ImportStore>(
    store: &S,
    project_id: &str,
    job_site_id: &str,
    employer_id: &str,
    classification: &CompanyClassification,
    stage: Option<&str>,
    results: &mut ImportResults,
) {
    let company = &classification.key.company_name;
    match classification.our_role {
        OurRole::Builder => {
            let label = format!("Builder '{}' on {}", company, project_id);
            write_with_fallback(
                &label,
                store.assign_bci_builder(project_id, employer_id, company),
                store.set_project_builder(project_id, employer_id),
                &mut results.errors,
            )
            .await;
        }
        OurRole::HeadContractor => {
            let outcome: Result<()> = async {
                if !store
                    .project_role_exists(project_id, employer_id, HEAD_CONTRACTOR_ROLE)
                    .await?
                {
                    store
                        .insert_project_role(project_id, employer_id, HEAD_CONTRACTOR_ROLE)
                        .await?;
                }
                Ok(())
            }
            .await;
            if let Err(e) = outcome {
                results.record_error(
                    &format!("Head contractor '{}' on {}", company, project_id),
                    e,
                );
            }
        }
        OurRole::Subcontractor => {
            let trades = classification.trade_types.clone();
            if trades.is_empty() {
                return;
            }
            let label = format!("Subcontractor '{}' on {}", company, project_id);
            if trades.len() == 1 {
                write_with_fallback(
                    &label,
                    store.assign_contractor_unified(
                        project_id,
                        job_site_id,
                        employer_id,
                        trades[0],
                        stage,
                    ),
                    store.insert_contractor_trade(project_id, job_site_id, employer_id, trades[0]),
                    &mut results.errors,
                )
                .await;
            } else {
                let primary = async {
                    let outcomes = store
                        .assign_multiple_trade_types(project_id, employer_id, &trades, stage)
                        .await?;
                    let failed: Vec<String> = outcomes
                        .iter()
                        .filter(|o| !o.success)
                        .map(RpcOutcome::describe)
                        .collect();
                    Ok(RpcOutcome {
                        success: failed.is_empty(),
                        message: if failed.is_empty() {
                            None
                        } else {
                            Some(failed.join("; "))
                        },
                    })
                };
                let fallback = async {
                    for trade in &trades {
                        store
                            .insert_contractor_trade(project_id, job_site_id, employer_id, *trade)
                            .await?;
                    }
                    Ok(())
                };
                write_with_fallback(&label, primary, fallback, &mut results.errors).await;
            }
        }
        OurRole::Skip => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_row;
    use crate::matching::resolver::{resolve_all, ResolvePolicy};
    use crate::models::{ImportRow, MatchConfidence, TradeType};
    use crate::store::memory::{FailureInjection, MemoryStore};
    use anyhow::anyhow;
    use std::time::Duration;

    fn row(project: &str, role: &str, company: &str) -> ImportRow {
        ImportRow {
            bci_project_id: project.to_string(),
            project_name: format!("{} development", project),
            role_on_project: role.to_string(),
            company_name: company.to_string(),
            value: Some(2_500_000.0),
            construction_start_date: None,
            construction_end_date: None,
            address: Some("1 Main St".to_string()),
            suburb: None,
            state: None,
            postcode: None,
            stage: Some("Construction".to_string()),
            latitude: None,
            longitude: None,
        }
    }

    fn no_delay() -> ResolvePolicy {
        ResolvePolicy {
            inter_item_delay: Duration::ZERO,
        }
    }

    async fn classify_and_resolve(
        store: &MemoryStore,
        rows: &[ImportRow],
    ) -> (
        Vec<CompanyClassification>,
        HashMap<ClassificationKey, EmployerMatchResult>,
    ) {
        let classifications: Vec<CompanyClassification> = rows.iter().map(classify_row).collect();
        let matches = resolve_all(store, &classifications, None, no_delay()).await;
        (classifications, matches)
    }

    fn confirm_all(matches: &mut HashMap<ClassificationKey, EmployerMatchResult>) {
        for m in matches.values_mut() {
            m.user_confirmed = true;
        }
    }

    #[tokio::test]
    async fn end_to_end_one_matched_one_created() {
        let store = MemoryStore::new();
        let existing = store.seed_employer("Acme Builders Pty Ltd").await;

        let rows = vec![
            row("P1", "Builder", "Acme Builders Pty Ltd"),
            row("P1", "Subcontractor - Electrical", "Acme Electrical Pty Ltd"),
        ];
        let projects = vec![ProjectRecord::from_row(&rows[0])];
        let (classifications, mut matches) = classify_and_resolve(&store, &rows).await;
        confirm_all(&mut matches);

        let results = execute(&store, &projects, &classifications, &matches).await;
        assert_eq!(results.success, 1);
        assert!(results.errors.is_empty(), "unexpected errors: {:?}", results.errors);
        assert_eq!(results.employers_matched, 1);
        assert_eq!(results.employers_created, 1);
        assert_eq!(results.projects_created, vec!["P1".to_string()]);

        let state = store.state.lock().await;
        assert_eq!(state.projects.len(), 1);
        let project_id = state.projects.keys().next().unwrap();
        assert_eq!(state.builders.get(project_id), Some(&existing.id));
        assert_eq!(state.trades.len(), 1);
        assert_eq!(state.trades[0].trade_type, TradeType::Electrical);
        assert!(!state.trades[0].via_fallback);
    }

    #[tokio::test]
    async fn rerun_updates_project_in_place() {
        let store = MemoryStore::new();
        store.seed_employer("Acme Builders Pty Ltd").await;

        let rows = vec![row("P1", "Builder", "Acme Builders Pty Ltd")];
        let projects = vec![ProjectRecord::from_row(&rows[0])];
        let (classifications, mut matches) = classify_and_resolve(&store, &rows).await;
        confirm_all(&mut matches);

        let first = execute(&store, &projects, &classifications, &matches).await;
        assert_eq!(first.projects_created.len(), 1);

        let second = execute(&store, &projects, &classifications, &matches).await;
        assert_eq!(second.success, 1);
        assert!(second.projects_created.is_empty());
        assert_eq!(store.state.lock().await.projects.len(), 1);
    }

    #[tokio::test]
    async fn builder_rpc_failure_takes_fallback_path() {
        let failures = FailureInjection {
            fail_builder_rpc: true,
            ..Default::default()
        };
        let store = MemoryStore::with_failures(failures);
        store.seed_employer("Acme Builders Pty Ltd").await;

        let rows = vec![row("P1", "Builder", "Acme Builders Pty Ltd")];
        let projects = vec![ProjectRecord::from_row(&rows[0])];
        let (classifications, mut matches) = classify_and_resolve(&store, &rows).await;
        confirm_all(&mut matches);

        let results = execute(&store, &projects, &classifications, &matches).await;
        // Fallback succeeded, so no errors and the builder is still set.
        assert!(results.errors.is_empty());
        assert_eq!(store.state.lock().await.builders.len(), 1);
    }

    #[tokio::test]
    async fn contractor_rpc_failure_falls_back_to_manual_insert() {
        let failures = FailureInjection {
            fail_contractor_rpc: true,
            ..Default::default()
        };
        let store = MemoryStore::with_failures(failures);

        let rows = vec![row("P1", "Subcontractor - Electrical", "Acme Electrical Pty Ltd")];
        let projects = vec![ProjectRecord::from_row(&rows[0])];
        let (classifications, mut matches) = classify_and_resolve(&store, &rows).await;
        confirm_all(&mut matches);

        let results = execute(&store, &projects, &classifications, &matches).await;
        assert!(results.errors.is_empty());
        let state = store.state.lock().await;
        assert_eq!(state.trades.len(), 1);
        assert!(state.trades[0].via_fallback);
    }

    #[tokio::test]
    async fn fallback_failure_is_recorded_but_not_fatal() {
        let failures = FailureInjection {
            fail_contractor_rpc: true,
            fail_contractor_fallback: true,
            ..Default::default()
        };
        let store = MemoryStore::with_failures(failures);

        let rows = vec![
            row("P1", "Subcontractor - Electrical", "Acme Electrical Pty Ltd"),
            row("P2", "Builder", "Zenith Builders Pty Ltd"),
        ];
        let projects = vec![
            ProjectRecord::from_row(&rows[0]),
            ProjectRecord::from_row(&rows[1]),
        ];
        let (classifications, mut matches) = classify_and_resolve(&store, &rows).await;
        confirm_all(&mut matches);

        let results = execute(&store, &projects, &classifications, &matches).await;
        // The trade write failed both ways, but both projects still imported.
        assert_eq!(results.success, 2);
        assert_eq!(results.errors.len(), 1);
        assert!(results.errors[0].contains("fallback also failed"));
        assert_eq!(store.state.lock().await.builders.len(), 1);
    }

    #[tokio::test]
    async fn project_insert_failure_skips_to_next_project() {
        let failures = FailureInjection {
            fail_insert_project: true,
            ..Default::default()
        };
        let store = MemoryStore::with_failures(failures);

        let rows = vec![row("P1", "Builder", "Acme Builders Pty Ltd")];
        let projects = vec![ProjectRecord::from_row(&rows[0])];
        let (classifications, mut matches) = classify_and_resolve(&store, &rows).await;
        confirm_all(&mut matches);

        let results = execute(&store, &projects, &classifications, &matches).await;
        assert_eq!(results.success, 0);
        assert_eq!(results.errors.len(), 1);
        assert!(results.errors[0].starts_with("Project P1"));
    }

    #[tokio::test]
    async fn unconfirmed_companies_are_not_imported() {
        let store = MemoryStore::new();
        store.seed_employer("Acme Builders Pty Ltd").await;

        let rows = vec![row("P1", "Builder", "Acme Builders Pty Ltd")];
        let projects = vec![ProjectRecord::from_row(&rows[0])];
        let (classifications, mut matches) = classify_and_resolve(&store, &rows).await;
        // Exact match auto-confirms; force it back to unconfirmed.
        for m in matches.values_mut() {
            m.user_confirmed = false;
        }

        let results = execute(&store, &projects, &classifications, &matches).await;
        assert_eq!(results.success, 1);
        assert_eq!(results.employers_matched, 0);
        assert!(store.state.lock().await.builders.is_empty());
    }

    #[tokio::test]
    async fn multiple_trades_assign_every_trade() {
        let store = MemoryStore::new();

        let rows = vec![row(
            "P1",
            "Subcontractor - Concrete Forming",
            "ABC Concrete & Formwork Pty Ltd",
        )];
        let projects = vec![ProjectRecord::from_row(&rows[0])];
        let (classifications, mut matches) = classify_and_resolve(&store, &rows).await;
        confirm_all(&mut matches);
        assert!(classifications[0].trade_types.len() > 1);

        let results = execute(&store, &projects, &classifications, &matches).await;
        assert!(results.errors.is_empty());
        let state = store.state.lock().await;
        let trades: Vec<TradeType> = state.trades.iter().map(|t| t.trade_type).collect();
        assert!(trades.contains(&TradeType::Concrete));
        assert!(trades.contains(&TradeType::FormWork));
    }

    #[tokio::test]
    async fn head_contractor_insert_is_guarded_against_duplicates() {
        let store = MemoryStore::new();
        store.seed_employer("Apex Project Co Pty Ltd").await;

        let rows = vec![row("P1", "Project Manager", "Apex Project Co Pty Ltd")];
        let projects = vec![ProjectRecord::from_row(&rows[0])];
        let (classifications, mut matches) = classify_and_resolve(&store, &rows).await;
        confirm_all(&mut matches);

        execute(&store, &projects, &classifications, &matches).await;
        execute(&store, &projects, &classifications, &matches).await;
        let state = store.state.lock().await;
        assert_eq!(state.roles.len(), 1);
        assert_eq!(state.roles[0].role, HEAD_CONTRACTOR_ROLE);
    }

    #[tokio::test]
    async fn same_new_company_across_projects_created_once() {
        let store = MemoryStore::new();

        let rows = vec![
            row("P1", "Subcontractor - Electrical", "Acme Electrical Pty Ltd"),
            row("P2", "Subcontractor - Electrical", "Acme Electrical Pty Ltd"),
        ];
        let projects = vec![
            ProjectRecord::from_row(&rows[0]),
            ProjectRecord::from_row(&rows[1]),
        ];
        let (classifications, mut matches) = classify_and_resolve(&store, &rows).await;
        confirm_all(&mut matches);

        let results = execute(&store, &projects, &classifications, &matches).await;
        assert_eq!(results.employers_created, 1);
        assert_eq!(store.state.lock().await.employers.len(), 1);
    }

    #[tokio::test]
    async fn write_with_fallback_prefers_primary() {
        let mut errors = Vec::new();
        let ok = write_with_fallback(
            "test",
            async {
                Ok(RpcOutcome {
                    success: true,
                    message: None,
                })
            },
            async { Err(anyhow!("fallback must not run")) },
            &mut errors,
        )
        .await;
        assert!(ok);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn write_with_fallback_reports_unsuccessful_outcome() {
        let mut errors = Vec::new();
        let ok = write_with_fallback(
            "test",
            async {
                Ok(RpcOutcome {
                    success: false,
                    message: Some("constraint violated".to_string()),
                })
            },
            async { Err(anyhow!("disk on fire")) },
            &mut errors,
        )
        .await;
        assert!(!ok);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("constraint violated"));
        assert!(errors[0].contains("disk on fire"));
    }
}
