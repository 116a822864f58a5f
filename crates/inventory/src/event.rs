//! Immutable stock ledger events.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcut_core::{DomainError, DomainResult, Entity, StockEventId, UserId, quantity};
use stockcut_events::Event;

use crate::target::StockTarget;

/// Direction a ledger event moves stock in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inflow,
    Outflow,
}

/// Why a balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockEventKind {
    InitialInflow,
    Inflow,
    OutflowSale,
    OutflowCut,
    OutflowAdjustment,
    InflowAdjustment,
    TransferIn,
    TransferOut,
}

impl StockEventKind {
    pub const ALL: [StockEventKind; 8] = [
        StockEventKind::InitialInflow,
        StockEventKind::Inflow,
        StockEventKind::OutflowSale,
        StockEventKind::OutflowCut,
        StockEventKind::OutflowAdjustment,
        StockEventKind::InflowAdjustment,
        StockEventKind::TransferIn,
        StockEventKind::TransferOut,
    ];

    pub fn direction(self) -> Direction {
        match self {
            StockEventKind::InitialInflow
            | StockEventKind::Inflow
            | StockEventKind::InflowAdjustment
            | StockEventKind::TransferIn => Direction::Inflow,
            StockEventKind::OutflowSale
            | StockEventKind::OutflowCut
            | StockEventKind::OutflowAdjustment
            | StockEventKind::TransferOut => Direction::Outflow,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StockEventKind::InitialInflow => "initial_inflow",
            StockEventKind::Inflow => "inflow",
            StockEventKind::OutflowSale => "outflow_sale",
            StockEventKind::OutflowCut => "outflow_cut",
            StockEventKind::OutflowAdjustment => "outflow_adjustment",
            StockEventKind::InflowAdjustment => "inflow_adjustment",
            StockEventKind::TransferIn => "transfer_in",
            StockEventKind::TransferOut => "transfer_out",
        }
    }
}

impl core::fmt::Display for StockEventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockEventKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StockEventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown stock event kind '{s}'")))
    }
}

/// Event: one signed balance change of one stock row.
///
/// Created once, never mutated or deleted. The ledger persists it and writes the
/// resulting balance in the same unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEvent {
    pub id: StockEventId,
    pub target: StockTarget,
    pub delta: Decimal,
    pub kind: StockEventKind,
    pub note: String,
    pub actor: UserId,
    pub created_at: DateTime<Utc>,
}

impl StockEvent {
    /// Build a validated event: non-zero delta, storable scale, sign matching the kind.
    pub fn record(
        target: StockTarget,
        delta: Decimal,
        kind: StockEventKind,
        note: impl Into<String>,
        actor: UserId,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if delta.is_zero() {
            return Err(DomainError::validation("stock event delta cannot be zero"));
        }
        let delta = quantity::storable(delta, "stock event delta")?;

        match (kind.direction(), delta.is_sign_negative()) {
            (Direction::Inflow, true) => {
                return Err(DomainError::validation(format!(
                    "{kind} requires a positive delta (got {delta})"
                )));
            }
            (Direction::Outflow, false) => {
                return Err(DomainError::validation(format!(
                    "{kind} requires a negative delta (got {delta})"
                )));
            }
            _ => {}
        }

        Ok(Self {
            id: StockEventId::new(),
            target,
            delta,
            kind,
            note: note.into(),
            actor,
            created_at,
        })
    }
}

impl Entity for StockEvent {
    type Id = StockEventId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self.kind.direction() {
            Direction::Inflow => "stock.credited",
            Direction::Outflow => "stock.debited",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stockcut_core::ComponentId;

    fn target() -> StockTarget {
        StockTarget::Component(ComponentId::new())
    }

    #[test]
    fn zero_delta_is_rejected() {
        let err = StockEvent::record(
            target(),
            Decimal::ZERO,
            StockEventKind::Inflow,
            "",
            UserId::new(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn sign_must_match_kind() {
        let actor = UserId::new();
        assert!(
            StockEvent::record(target(), dec!(-1), StockEventKind::Inflow, "", actor, Utc::now())
                .is_err()
        );
        assert!(
            StockEvent::record(target(), dec!(1), StockEventKind::OutflowCut, "", actor, Utc::now())
                .is_err()
        );
        let cut =
            StockEvent::record(target(), dec!(-1), StockEventKind::OutflowCut, "", actor, Utc::now())
                .unwrap();
        assert_eq!(cut.event_type(), "stock.debited");
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in StockEventKind::ALL {
            assert_eq!(kind.as_str().parse::<StockEventKind>().unwrap(), kind);
        }
        assert!("inflow-adjustion".parse::<StockEventKind>().is_err());
    }
}
