//! One reconciliation pass against the Postgres store.
//!
//! Exits non-zero when consistency faults remain after the (optional) repair.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use stockcut_core::UserId;
use stockcut_infra::store::PostgresStockStore;
use stockcut_infra::{EngineConfig, Reconciler};

fn main() -> anyhow::Result<ExitCode> {
    let config = EngineConfig::from_env();
    stockcut_observability::init_with(config.log_format);

    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set for reconciliation")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    let store = PostgresStockStore::connect(&database_url, runtime.handle().clone())
        .context("failed to connect to Postgres")?;
    store.migrate().context("failed to apply schema")?;

    // Repairs are stamped with a fresh system actor per run.
    let reconciler = Reconciler::new(Arc::new(store), UserId::new());
    let report = reconciler
        .run(config.reconcile_repair)
        .context("reconciliation pass failed")?;

    let outstanding = report.outstanding().len();
    if outstanding > 0 {
        tracing::error!(outstanding, "consistency faults need operator attention");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
