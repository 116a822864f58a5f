//! Item directory collaborator: which items and components exist and are active.
//!
//! The catalog itself (names, prices, BOMs) lives outside this engine. The
//! engine only needs to know that an item is live and which item owns a
//! component.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use stockcut_core::{ComponentId, ItemId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogComponent {
    pub id: ComponentId,
    /// Composite item this component belongs to.
    pub item_id: ItemId,
    pub name: String,
}

/// Active-only lookups into the product catalog.
pub trait ItemDirectory: Send + Sync {
    fn item(&self, id: ItemId) -> Option<CatalogItem>;

    fn component(&self, id: ComponentId) -> Option<CatalogComponent>;
}

#[derive(Debug, Default)]
struct Entries {
    items: HashMap<ItemId, (CatalogItem, bool)>,
    components: HashMap<ComponentId, (CatalogComponent, bool)>,
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryItemDirectory {
    entries: RwLock<Entries>,
}

impl InMemoryItemDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_item(&self, name: impl Into<String>) -> ItemId {
        let id = ItemId::new();
        if let Ok(mut entries) = self.entries.write() {
            entries.items.insert(
                id,
                (
                    CatalogItem {
                        id,
                        name: name.into(),
                    },
                    true,
                ),
            );
        }
        id
    }

    pub fn register_component(&self, item_id: ItemId, name: impl Into<String>) -> ComponentId {
        let id = ComponentId::new();
        if let Ok(mut entries) = self.entries.write() {
            entries.components.insert(
                id,
                (
                    CatalogComponent {
                        id,
                        item_id,
                        name: name.into(),
                    },
                    true,
                ),
            );
        }
        id
    }

    pub fn deactivate_item(&self, id: ItemId) {
        if let Ok(mut entries) = self.entries.write() {
            if let Some((_, active)) = entries.items.get_mut(&id) {
                *active = false;
            }
        }
    }

    pub fn deactivate_component(&self, id: ComponentId) {
        if let Ok(mut entries) = self.entries.write() {
            if let Some((_, active)) = entries.components.get_mut(&id) {
                *active = false;
            }
        }
    }
}

impl ItemDirectory for InMemoryItemDirectory {
    fn item(&self, id: ItemId) -> Option<CatalogItem> {
        let entries = self.entries.read().ok()?;
        entries
            .items
            .get(&id)
            .filter(|(_, active)| *active)
            .map(|(item, _)| item.clone())
    }

    fn component(&self, id: ComponentId) -> Option<CatalogComponent> {
        let entries = self.entries.read().ok()?;
        entries
            .components
            .get(&id)
            .filter(|(_, active)| *active)
            .map(|(component, _)| component.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_active_only() {
        let directory = InMemoryItemDirectory::new();
        let sheet = directory.register_item("sheet 1mm");
        let coil = directory.register_component(sheet, "coil A");

        assert_eq!(directory.component(coil).unwrap().item_id, sheet);

        directory.deactivate_component(coil);
        assert!(directory.component(coil).is_none());
        assert!(directory.item(sheet).is_some());

        directory.deactivate_item(sheet);
        assert!(directory.item(sheet).is_none());
    }

    #[test]
    fn unknown_ids_are_absent() {
        let directory = InMemoryItemDirectory::new();
        assert!(directory.item(ItemId::new()).is_none());
        assert!(directory.component(ComponentId::new()).is_none());
    }
}
