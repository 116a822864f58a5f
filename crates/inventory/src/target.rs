use serde::{Deserialize, Serialize};

use stockcut_core::{ComponentId, ItemId};

/// The stock-holding entity an event or balance row belongs to.
///
/// Exactly one of simple item or component, never both and never neither.
/// Lock order for mutations: component rows in ascending order, then the
/// composite item row they belong to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StockTarget {
    Item(ItemId),
    Component(ComponentId),
}

impl StockTarget {
    pub fn component(&self) -> Option<ComponentId> {
        match self {
            StockTarget::Component(id) => Some(*id),
            StockTarget::Item(_) => None,
        }
    }

    pub fn item(&self) -> Option<ItemId> {
        match self {
            StockTarget::Item(id) => Some(*id),
            StockTarget::Component(_) => None,
        }
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        match self {
            StockTarget::Item(id) => id.as_uuid(),
            StockTarget::Component(id) => id.as_uuid(),
        }
    }
}

impl From<ItemId> for StockTarget {
    fn from(value: ItemId) -> Self {
        StockTarget::Item(value)
    }
}

impl From<ComponentId> for StockTarget {
    fn from(value: ComponentId) -> Self {
        StockTarget::Component(value)
    }
}

impl core::fmt::Display for StockTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StockTarget::Item(id) => write!(f, "item {id}"),
            StockTarget::Component(id) => write!(f, "component {id}"),
        }
    }
}
