//! Engine configuration loaded from the process environment.

use serde::{Deserialize, Serialize};

use stockcut_observability::LogFormat;

pub const DEFAULT_MAX_ITEMS_PER_ORDER: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on distinct components in one cutting order.
    pub max_items_per_order: usize,
    pub log_format: LogFormat,
    /// Only the Postgres backend and the reconcile binary need this.
    pub database_url: Option<String>,
    /// Whether reconciliation rewrites diverged composite balances.
    pub reconcile_repair: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_items_per_order: DEFAULT_MAX_ITEMS_PER_ORDER,
            log_format: LogFormat::Json,
            database_url: None,
            reconcile_repair: false,
        }
    }
}

impl EngineConfig {
    /// Read `STOCKCUT_*` and `DATABASE_URL` from the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values keep their
    /// default and log a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("STOCKCUT_MAX_ITEMS_PER_ORDER") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_items_per_order = n,
                _ => tracing::warn!(
                    value = %raw,
                    default = DEFAULT_MAX_ITEMS_PER_ORDER,
                    "invalid STOCKCUT_MAX_ITEMS_PER_ORDER; using default"
                ),
            }
        }

        if let Some(raw) = lookup("STOCKCUT_LOG_FORMAT") {
            match raw.parse::<LogFormat>() {
                Ok(format) => config.log_format = format,
                Err(e) => tracing::warn!(error = %e, "invalid STOCKCUT_LOG_FORMAT; using json"),
            }
        }

        config.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        if let Some(raw) = lookup("STOCKCUT_RECONCILE_REPAIR") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.reconcile_repair = true,
                "0" | "false" | "no" => config.reconcile_repair = false,
                _ => tracing::warn!(
                    value = %raw,
                    "invalid STOCKCUT_RECONCILE_REPAIR; repair stays disabled"
                ),
            }
        }

        config
    }
}
