//! Out-of-band reconciliation of cached balances.
//!
//! Every cached balance must be derivable: a ledger-driven row from the replay
//! of its events, a composite row from the sum of its active components. A
//! divergence is a consistency fault. It is reported and logged, never hidden.
//! Only composite rows are repaired automatically; a ledger row that disagrees
//! with its own trail needs an operator.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stockcut_core::{DomainError, StockEventId, UserId};
use stockcut_events::Projection;
use stockcut_inventory::{BalanceProjection, StockTarget, mirrored_quantity};

use crate::composite::{SyncOutcome, sync_in};
use crate::error::EngineResult;
use crate::store::{StockStore, StockTx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    /// Cached balance differs from the replay of the row's events.
    Ledger {
        target: StockTarget,
        cached: Decimal,
        replayed: Decimal,
    },
    /// Composite balance differs from the sum of its active components.
    Composite {
        target: StockTarget,
        cached: Decimal,
        mirrored: Decimal,
    },
    /// Replaying the trail went negative after this event.
    Overdrawn {
        target: StockTarget,
        event_id: StockEventId,
    },
}

impl Divergence {
    pub fn target(&self) -> StockTarget {
        match self {
            Divergence::Ledger { target, .. }
            | Divergence::Composite { target, .. }
            | Divergence::Overdrawn { target, .. } => *target,
        }
    }

    pub fn to_fault(&self) -> DomainError {
        match self {
            Divergence::Ledger {
                target,
                cached,
                replayed,
            } => DomainError::consistency(format!(
                "{target}: cached balance {cached} differs from event replay {replayed}"
            )),
            Divergence::Composite {
                target,
                cached,
                mirrored,
            } => DomainError::consistency(format!(
                "{target}: composite balance {cached} differs from component sum {mirrored}"
            )),
            Divergence::Overdrawn { target, event_id } => DomainError::consistency(format!(
                "{target}: event trail goes negative at event {event_id}"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub checked: usize,
    pub divergences: Vec<Divergence>,
    pub repaired: Vec<StockTarget>,
}

impl ReconciliationReport {
    /// Divergences that were not repaired during this run.
    pub fn outstanding(&self) -> Vec<&Divergence> {
        self.divergences
            .iter()
            .filter(|d| !self.repaired.contains(&d.target()))
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.outstanding().is_empty()
    }
}

#[derive(Debug)]
pub struct Reconciler<S> {
    store: Arc<S>,
    actor: UserId,
}

impl<S: StockStore> Reconciler<S> {
    /// `actor` is stamped on repaired rows.
    pub fn new(store: Arc<S>, actor: UserId) -> Self {
        Self { store, actor }
    }

    /// Check every stock row in one transaction; with `repair`, re-sync
    /// diverged composites and commit.
    #[instrument(skip(self), err)]
    pub fn run(&self, repair: bool) -> EngineResult<ReconciliationReport> {
        let mut tx = self.store.begin()?;
        let mut report = ReconciliationReport::default();

        let stocks = tx.list_stocks()?;
        for stock in &stocks {
            report.checked += 1;
            let target = stock.target();

            let components = match target {
                StockTarget::Item(item) => tx.component_stocks_of(item)?,
                StockTarget::Component(_) => Vec::new(),
            };
            if let Some(mirrored) = mirrored_quantity(&components) {
                if mirrored != stock.quantity() {
                    report.divergences.push(Divergence::Composite {
                        target,
                        cached: stock.quantity(),
                        mirrored,
                    });
                }
                continue;
            }

            let mut projection = BalanceProjection::new();
            projection.apply_all(&tx.stock_events(target)?);
            for (_, event_id) in projection.overdrawn() {
                report.divergences.push(Divergence::Overdrawn {
                    target,
                    event_id: *event_id,
                });
            }
            let replayed = projection.balance(&target);
            if replayed != stock.quantity() {
                report.divergences.push(Divergence::Ledger {
                    target,
                    cached: stock.quantity(),
                    replayed,
                });
            }
        }

        for divergence in &report.divergences {
            tracing::error!(error = %divergence.to_fault(), "stock consistency fault");
        }

        if repair {
            let now = Utc::now();
            let composites: Vec<_> = report
                .divergences
                .iter()
                .filter_map(|d| match d {
                    Divergence::Composite { target, .. } => target.item(),
                    _ => None,
                })
                .collect();
            for item in composites {
                if let SyncOutcome::Updated { from, to } = sync_in(&mut tx, item, self.actor, now)? {
                    tracing::warn!(item_id = %item, %from, %to, "repaired composite balance");
                    report.repaired.push(StockTarget::Item(item));
                }
            }
            tx.commit()?;
        }

        tracing::info!(
            checked = report.checked,
            divergences = report.divergences.len(),
            repaired = report.repaired.len(),
            "reconciliation finished"
        );
        Ok(report)
    }
}
