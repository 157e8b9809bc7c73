// src/main.rs
use anyhow::{Context, Result};
use log::{info, warn};
use std::{
    collections::HashMap,
    path::Path,
    time::{Duration, Instant},
};

use bci_import_lib::{
    db,
    ingest,
    matching::resolver::{EmployerSnapshot, ResolvePolicy},
    models::{ImportResults, MatchAction},
    store::pg::PgStore,
    AutoConfirmMode, ImportSession,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    info!("Starting BCI project import pipeline");
    let start_time = Instant::now();

    let env_paths = [".env", ".env.local", "../.env"];
    let mut loaded_env = false;
    for path in env_paths.iter() {
        if Path::new(path).exists() {
            if let Err(e) = db::load_env_from_file(path) {
                warn!("Failed to load environment from {}: {}", path, e);
            } else {
                info!("Loaded environment variables from {}", path);
                loaded_env = true;
                break;
            }
        }
    }
    if !loaded_env {
        info!("No .env file found, using environment variables from system");
    }

    let csv_path = std::env::args()
        .nth(1)
        .context("Usage: bci_import <path-to-bci-export.csv>")?;

    let pool = db::connect()
        .await
        .context("Failed to connect to database")?;
    info!("Successfully connected to the database");
    let store = PgStore::new(pool);

    let mut phase_times = HashMap::new();
    let results = run_import(&store, &csv_path, &mut phase_times).await?;

    info!("{}", completion_summary(start_time.elapsed(), &results));
    for (phase, duration) in &phase_times {
        info!("  phase {}: {:.2?}", phase, duration);
    }
    if !results.errors.is_empty() {
        warn!("The import finished with {} errors:", results.errors.len());
        for error in &results.errors {
            warn!("  {}", error);
        }
    }
    Ok(())
}

fn completion_summary(elapsed: Duration, results: &ImportResults) -> String {
    format!(
        "Import completed in {:.2?}. Projects: {} imported, employers: {} created, {} matched, {} errors",
        elapsed,
        results.projects_created.len(),
        results.employers_created,
        results.employers_matched,
        results.errors.len()
    )
}

async fn run_import(
    store: &PgStore,
    csv_path: &str,
    phase_times: &mut HashMap<String, Duration>,
) -> Result<ImportResults> {
    // Phase 1: Ingest and classify
    let phase1_start = Instant::now();
    let rows = ingest::read_import_file(Path::new(csv_path))?;
    let mut session = ImportSession::new(rows);
    let project_count = session.projects().len();
    session.classify_all()?;
    phase_times.insert("ingest_and_classify".to_string(), phase1_start.elapsed());
    info!(
        "Phase 1 complete: {} projects, {} classifications",
        project_count,
        session.classifications.len()
    );

    // Phase 2: Employer resolution against a point-in-time snapshot
    let phase2_start = Instant::now();
    let snapshot = EmployerSnapshot::load(store).await?;
    session
        .resolve_matches(store, Some(&snapshot), ResolvePolicy::from_env())
        .await?;
    phase_times.insert("employer_resolution".to_string(), phase2_start.elapsed());
    info!(
        "Phase 2 complete: {} consolidated employers",
        session.consolidated.len()
    );

    // Phase 3: Confirmation. Without an operator in the loop the
    // AUTO_CONFIRM policy decides how far fuzzy matches are trusted.
    let phase3_start = Instant::now();
    let mode = AutoConfirmMode::from_env();
    session.auto_confirm(mode);
    if !session.all_resolved() {
        let unresolved = session
            .consolidated
            .values()
            .filter(|e| !e.user_confirmed)
            .count();
        warn!(
            "{} fuzzy-matched employers left unconfirmed; their rows will be skipped \
             (set AUTO_CONFIRM=all to accept top suggestions)",
            unresolved
        );
        for entry in session.consolidated.values_mut().filter(|e| !e.user_confirmed) {
            entry.action = MatchAction::Skip;
        }
        for m in session.matches.values_mut().filter(|m| !m.user_confirmed) {
            m.action = MatchAction::Skip;
        }
    }
    session.finish_matching()?;
    phase_times.insert("confirmation".to_string(), phase3_start.elapsed());

    // Phase 4: Import
    let phase4_start = Instant::now();
    session.begin_import()?;
    let results = session.run_import(store).await?;
    phase_times.insert("import".to_string(), phase4_start.elapsed());
    info!("Phase 4 complete: {} projects persisted", results.success);

    Ok(results)
}
