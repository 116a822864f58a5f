//! Replay of the stock event trail into balances.

use std::collections::HashMap;

use rust_decimal::Decimal;

use stockcut_core::StockEventId;
use stockcut_events::Projection;

use crate::event::StockEvent;
use crate::target::StockTarget;

/// Balances derived purely from the event trail.
///
/// Used to prove that every cached balance is derivable from its events. If the
/// trail ever dips below zero part-way through, the offending event is recorded:
/// the ledger should have made that impossible.
#[derive(Debug, Default, Clone)]
pub struct BalanceProjection {
    balances: HashMap<StockTarget, Decimal>,
    overdrawn: Vec<(StockTarget, StockEventId)>,
}

impl BalanceProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replayed balance (zero when the target has no events).
    pub fn balance(&self, target: &StockTarget) -> Decimal {
        self.balances.get(target).copied().unwrap_or(Decimal::ZERO)
    }

    /// Events after which a replayed balance was negative.
    pub fn overdrawn(&self) -> &[(StockTarget, StockEventId)] {
        &self.overdrawn
    }

    pub fn targets(&self) -> impl Iterator<Item = &StockTarget> {
        self.balances.keys()
    }
}

impl Projection for BalanceProjection {
    type Ev = StockEvent;

    fn apply(&mut self, event: &StockEvent) {
        let balance = self.balances.entry(event.target).or_insert(Decimal::ZERO);
        *balance += event.delta;
        if *balance < Decimal::ZERO {
            self.overdrawn.push((event.target, event.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stockcut_core::{ComponentId, UserId};

    use crate::event::StockEventKind;

    fn event(target: StockTarget, delta: Decimal, kind: StockEventKind) -> StockEvent {
        StockEvent::record(target, delta, kind, "", UserId::new(), Utc::now()).unwrap()
    }

    #[test]
    fn replay_sums_per_target() {
        let a = StockTarget::Component(ComponentId::new());
        let b = StockTarget::Component(ComponentId::new());
        let trail = vec![
            event(a, dec!(10), StockEventKind::InitialInflow),
            event(b, dec!(3), StockEventKind::InitialInflow),
            event(a, dec!(-4.25), StockEventKind::OutflowCut),
        ];

        let mut projection = BalanceProjection::new();
        projection.apply_all(&trail);

        assert_eq!(projection.balance(&a), dec!(5.75));
        assert_eq!(projection.balance(&b), dec!(3));
        assert!(projection.overdrawn().is_empty());
    }

    #[test]
    fn replay_flags_overdrawn_trail() {
        let a = StockTarget::Component(ComponentId::new());
        let bad = event(a, dec!(-1), StockEventKind::OutflowSale);

        let mut projection = BalanceProjection::new();
        projection.apply(&bad);

        assert_eq!(projection.overdrawn(), &[(a, bad.id)]);
    }
}
