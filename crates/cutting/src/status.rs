use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockcut_core::DomainError;

/// Cutting order workflow status.
///
/// ```text
/// pending ──▶ in_process ──▶ completed
///    │             │
///    └──────┬──────┘
///           ▼
///       cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CuttingOrderStatus {
    Pending,
    InProcess,
    Completed,
    Cancelled,
}

impl CuttingOrderStatus {
    pub const ALL: [CuttingOrderStatus; 4] = [
        CuttingOrderStatus::Pending,
        CuttingOrderStatus::InProcess,
        CuttingOrderStatus::Completed,
        CuttingOrderStatus::Cancelled,
    ];

    /// Active orders hold logical reservations.
    pub fn is_active(self) -> bool {
        matches!(self, CuttingOrderStatus::Pending | CuttingOrderStatus::InProcess)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Forward transitions. Same-state requests are handled as no-ops by the
    /// aggregate and are not listed here.
    pub fn can_transition_to(self, target: CuttingOrderStatus) -> bool {
        use CuttingOrderStatus::*;
        matches!(
            (self, target),
            (Pending, InProcess) | (InProcess, Completed) | (Pending, Cancelled) | (InProcess, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CuttingOrderStatus::Pending => "pending",
            CuttingOrderStatus::InProcess => "in_process",
            CuttingOrderStatus::Completed => "completed",
            CuttingOrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for CuttingOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CuttingOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CuttingOrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown cutting order status '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_four_forward_transitions() {
        let legal: Vec<_> = CuttingOrderStatus::ALL
            .into_iter()
            .flat_map(|from| CuttingOrderStatus::ALL.into_iter().map(move |to| (from, to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();
        assert_eq!(legal.len(), 4);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in CuttingOrderStatus::ALL {
            assert!(!CuttingOrderStatus::Completed.can_transition_to(to));
            assert!(!CuttingOrderStatus::Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn names_round_trip() {
        for st in CuttingOrderStatus::ALL {
            assert_eq!(st.as_str().parse::<CuttingOrderStatus>().unwrap(), st);
        }
    }
}
