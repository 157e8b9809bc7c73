// src/store/pg.rs
// Postgres-backed ImportStore over the shared bb8 pool. SQL lives in const
// statements; the assignment procedures are invoked as set-returning
// functions and their {success, message} rows surfaced as RpcOutcome.

use anyhow::{Context, Result};
use log::debug;
use postgres_types::ToSql;
use tokio_postgres::Row as PgRow;
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::{Employer, ProjectRecord, TradeType};

use super::{ImportStore, RpcOutcome};

const EMPLOYER_COLUMNS: &str = "id, name, address_line_1, suburb, state, postcode";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn employer_from_row(row: &PgRow) -> Employer {
    Employer {
        id: row.get("id"),
        name: row.get("name"),
        address: row.get("address_line_1"),
        suburb: row.get("suburb"),
        state: row.get("state"),
        postcode: row.get("postcode"),
    }
}

fn rpc_outcome_from_row(row: &PgRow) -> RpcOutcome {
    RpcOutcome {
        success: row.get("success"),
        message: row.get("message"),
    }
}

impl ImportStore for PgStore {
    async fn find_alias(&self, normalized_name: &str) -> Result<Option<Employer>> {
        const SQL: &str = "
            SELECT e.id, e.name, e.address_line_1, e.suburb, e.state, e.postcode
            FROM public.employer_aliases a
            JOIN public.employers e ON e.id = a.employer_id
            WHERE a.alias_normalized = $1
            LIMIT 1";
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for alias lookup")?;
        let row = conn
            .query_opt(SQL, &[&normalized_name])
            .await
            .context("Failed to query employer_aliases")?;
        Ok(row.as_ref().map(employer_from_row))
    }

    async fn find_employer_exact(&self, name: &str) -> Result<Option<Employer>> {
        let sql = format!(
            "SELECT {} FROM public.employers WHERE LOWER(name) = LOWER($1) LIMIT 1",
            EMPLOYER_COLUMNS
        );
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for exact employer lookup")?;
        let row = conn
            .query_opt(sql.as_str(), &[&name])
            .await
            .context("Failed to query employers for exact name match")?;
        Ok(row.as_ref().map(employer_from_row))
    }

    async fn search_employers(&self, tokens: &[String]) -> Result<Vec<Employer>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        // One ILIKE predicate per token, OR-combined.
        let mut predicates = Vec::with_capacity(tokens.len());
        let mut patterns: Vec<String> = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            predicates.push(format!("name ILIKE ${}", i + 1));
            patterns.push(format!("%{}%", token));
        }
        let sql = format!(
            "SELECT {} FROM public.employers WHERE {} ORDER BY LENGTH(name) ASC LIMIT 50",
            EMPLOYER_COLUMNS,
            predicates.join(" OR ")
        );
        let params: Vec<&(dyn ToSql + Sync)> = patterns
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();

        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for employer search")?;
        let rows = conn
            .query(sql.as_str(), &params[..])
            .await
            .context("Failed to run employer token search")?;
        debug!("Employer token search ({:?}) returned {} rows", tokens, rows.len());
        Ok(rows.iter().map(employer_from_row).collect())
    }

    async fn load_employers(&self) -> Result<Vec<Employer>> {
        let sql = format!("SELECT {} FROM public.employers ORDER BY name", EMPLOYER_COLUMNS);
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for employer snapshot")?;
        let rows = conn
            .query(sql.as_str(), &[])
            .await
            .context("Failed to load employer snapshot")?;
        Ok(rows.iter().map(employer_from_row).collect())
    }

    async fn create_employer(&self, name: &str) -> Result<Employer> {
        const SQL: &str = "
            INSERT INTO public.employers (id, name)
            VALUES ($1, $2)
            RETURNING id, name, address_line_1, suburb, state, postcode";
        let id = Uuid::new_v4().to_string();
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for employer insert")?;
        let row = conn
            .query_one(SQL, &[&id, &name])
            .await
            .with_context(|| format!("Failed to insert employer '{}'", name))?;
        Ok(employer_from_row(&row))
    }

    async fn insert_alias(
        &self,
        alias: &str,
        normalized_name: &str,
        employer_id: &str,
    ) -> Result<()> {
        const SQL: &str = "
            INSERT INTO public.employer_aliases (id, alias, alias_normalized, employer_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (alias_normalized) DO NOTHING";
        let id = Uuid::new_v4().to_string();
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for alias insert")?;
        conn.execute(SQL, &[&id, &alias, &normalized_name, &employer_id])
            .await
            .with_context(|| format!("Failed to insert alias '{}'", alias))?;
        Ok(())
    }

    async fn find_project_by_bci_id(&self, bci_project_id: &str) -> Result<Option<String>> {
        const SQL: &str = "SELECT id FROM public.projects WHERE bci_project_id = $1 LIMIT 1";
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for project lookup")?;
        let row = conn
            .query_opt(SQL, &[&bci_project_id])
            .await
            .context("Failed to query projects by bci_project_id")?;
        Ok(row.map(|r| r.get("id")))
    }

    async fn insert_project(&self, record: &ProjectRecord) -> Result<String> {
        const SQL: &str = "
            INSERT INTO public.projects (
                id, bci_project_id, name, value, proposed_start_date, proposed_finish_date,
                project_stage
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id";
        let id = Uuid::new_v4().to_string();
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for project insert")?;
        let row = conn
            .query_one(
                SQL,
                &[
                    &id,
                    &record.bci_project_id,
                    &record.name,
                    &record.value,
                    &record.construction_start_date,
                    &record.construction_end_date,
                    &record.stage,
                ],
            )
            .await
            .with_context(|| format!("Failed to insert project '{}'", record.bci_project_id))?;
        Ok(row.get("id"))
    }

    async fn update_project(&self, project_id: &str, record: &ProjectRecord) -> Result<()> {
        const SQL: &str = "
            UPDATE public.projects
            SET name = $2, value = $3, proposed_start_date = $4,
                proposed_finish_date = $5, project_stage = $6
            WHERE id = $1";
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for project update")?;
        conn.execute(
            SQL,
            &[
                &project_id,
                &record.name,
                &record.value,
                &record.construction_start_date,
                &record.construction_end_date,
                &record.stage,
            ],
        )
        .await
        .with_context(|| format!("Failed to update project '{}'", record.bci_project_id))?;
        Ok(())
    }

    async fn upsert_job_site(&self, project_id: &str, record: &ProjectRecord) -> Result<String> {
        const SELECT_SQL: &str =
            "SELECT id FROM public.job_sites WHERE project_id = $1 AND is_main_site = TRUE LIMIT 1";
        const UPDATE_SQL: &str = "
            UPDATE public.job_sites
            SET name = $2, location = $3, suburb = $4, state = $5, postcode = $6,
                latitude = $7, longitude = $8
            WHERE id = $1";
        const INSERT_SQL: &str = "
            INSERT INTO public.job_sites (
                id, project_id, name, is_main_site, location, suburb, state, postcode,
                latitude, longitude
            ) VALUES ($1, $2, $3, TRUE, $4, $5, $6, $7, $8, $9)
            RETURNING id";
        const LINK_SQL: &str = "UPDATE public.projects SET main_job_site_id = $2 WHERE id = $1";

        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for job site upsert")?;

        let existing = conn
            .query_opt(SELECT_SQL, &[&project_id])
            .await
            .context("Failed to query main job site")?;

        let job_site_id: String = match existing {
            Some(row) => {
                let id: String = row.get("id");
                conn.execute(
                    UPDATE_SQL,
                    &[
                        &id,
                        &record.name,
                        &record.address,
                        &record.suburb,
                        &record.state,
                        &record.postcode,
                        &record.latitude,
                        &record.longitude,
                    ],
                )
                .await
                .context("Failed to update main job site")?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let row = conn
                    .query_one(
                        INSERT_SQL,
                        &[
                            &id,
                            &project_id,
                            &record.name,
                            &record.address,
                            &record.suburb,
                            &record.state,
                            &record.postcode,
                            &record.latitude,
                            &record.longitude,
                        ],
                    )
                    .await
                    .context("Failed to insert main job site")?;
                row.get("id")
            }
        };

        conn.execute(LINK_SQL, &[&project_id, &job_site_id])
            .await
            .context("Failed to link main job site back to project")?;
        Ok(job_site_id)
    }

    async fn assign_bci_builder(
        &self,
        project_id: &str,
        employer_id: &str,
        company_name: &str,
    ) -> Result<RpcOutcome> {
        const SQL: &str = "SELECT success, message FROM assign_bci_builder($1, $2, $3)";
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for assign_bci_builder")?;
        let row = conn
            .query_one(SQL, &[&project_id, &employer_id, &company_name])
            .await
            .context("assign_bci_builder call failed")?;
        Ok(rpc_outcome_from_row(&row))
    }

    async fn assign_contractor_unified(
        &self,
        project_id: &str,
        job_site_id: &str,
        employer_id: &str,
        trade_type: TradeType,
        stage: Option<&str>,
    ) -> Result<RpcOutcome> {
        const SQL: &str = "
            SELECT success, message, assignment_id
            FROM assign_contractor_unified($1, $2, $3, $4, NULL, NULL, $5)";
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for assign_contractor_unified")?;
        let row = conn
            .query_one(
                SQL,
                &[&project_id, &job_site_id, &employer_id, &trade_type.as_str(), &stage],
            )
            .await
            .context("assign_contractor_unified call failed")?;
        Ok(rpc_outcome_from_row(&row))
    }

    async fn assign_multiple_trade_types(
        &self,
        project_id: &str,
        employer_id: &str,
        trade_types: &[TradeType],
        stage: Option<&str>,
    ) -> Result<Vec<RpcOutcome>> {
        const SQL: &str = "
            SELECT success, message
            FROM assign_multiple_trade_types($1, $2, $3, $4, NULL, NULL)";
        let trade_strs: Vec<&str> = trade_types.iter().map(|t| t.as_str()).collect();
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for assign_multiple_trade_types")?;
        let rows = conn
            .query(SQL, &[&project_id, &employer_id, &trade_strs, &stage])
            .await
            .context("assign_multiple_trade_types call failed")?;
        Ok(rows.iter().map(rpc_outcome_from_row).collect())
    }

    async fn set_project_builder(&self, project_id: &str, employer_id: &str) -> Result<()> {
        const SQL: &str = "UPDATE public.projects SET builder_id = $2 WHERE id = $1";
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for builder fallback update")?;
        conn.execute(SQL, &[&project_id, &employer_id])
            .await
            .context("Failed to set project builder directly")?;
        Ok(())
    }

    async fn project_role_exists(
        &self,
        project_id: &str,
        employer_id: &str,
        role: &str,
    ) -> Result<bool> {
        const SQL: &str = "
            SELECT 1 FROM public.project_employer_roles
            WHERE project_id = $1 AND employer_id = $2 AND role = $3
            LIMIT 1";
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for role existence check")?;
        let row = conn
            .query_opt(SQL, &[&project_id, &employer_id, &role])
            .await
            .context("Failed to check project_employer_roles")?;
        Ok(row.is_some())
    }

    async fn insert_project_role(
        &self,
        project_id: &str,
        employer_id: &str,
        role: &str,
    ) -> Result<()> {
        const SQL: &str = "
            INSERT INTO public.project_employer_roles (id, project_id, employer_id, role)
            VALUES ($1, $2, $3, $4)";
        let id = Uuid::new_v4().to_string();
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for role insert")?;
        conn.execute(SQL, &[&id, &project_id, &employer_id, &role])
            .await
            .with_context(|| format!("Failed to insert {} role", role))?;
        Ok(())
    }

    async fn insert_contractor_trade(
        &self,
        project_id: &str,
        job_site_id: &str,
        employer_id: &str,
        trade_type: TradeType,
    ) -> Result<()> {
        const SQL: &str = "
            INSERT INTO public.project_contractor_trades (
                id, project_id, job_site_id, employer_id, trade_type
            ) VALUES ($1, $2, $3, $4, $5)";
        let id = Uuid::new_v4().to_string();
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for contractor trade insert")?;
        conn.execute(
            SQL,
            &[&id, &project_id, &job_site_id, &employer_id, &trade_type.as_str()],
        )
        .await
        .with_context(|| format!("Failed to insert contractor trade '{}'", trade_type))?;
        Ok(())
    }
}
