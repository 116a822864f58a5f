//! Audit stamping and soft-delete tuple carried by every persisted entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Who created/modified/deleted an entity, and when.
///
/// Deletion is logical: it flips `active` and stamps `deleted_*`. Rows are never
/// removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub active: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub modified_by: Option<UserId>,
    pub modified_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<UserId>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Audit {
    pub fn created(actor: UserId, at: DateTime<Utc>) -> Self {
        Self {
            active: true,
            created_by: actor,
            created_at: at,
            modified_by: None,
            modified_at: None,
            deleted_by: None,
            deleted_at: None,
        }
    }

    pub fn touch(&mut self, actor: UserId, at: DateTime<Utc>) {
        self.modified_by = Some(actor);
        self.modified_at = Some(at);
    }

    pub fn deactivate(&mut self, actor: UserId, at: DateTime<Utc>) {
        self.active = false;
        self.deleted_by = Some(actor);
        self.deleted_at = Some(at);
        self.touch(actor, at);
    }

    pub fn reactivate(&mut self, actor: UserId, at: DateTime<Utc>) {
        self.active = true;
        self.deleted_by = None;
        self.deleted_at = None;
        self.touch(actor, at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deactivate_then_reactivate_keeps_creation_stamp() {
        let creator = UserId::new();
        let operator = UserId::new();
        let t0 = Utc::now();
        let mut audit = Audit::created(creator, t0);

        audit.deactivate(operator, t0);
        assert!(!audit.active);
        assert_eq!(audit.deleted_by, Some(operator));

        audit.reactivate(operator, t0);
        assert!(audit.active);
        assert_eq!(audit.deleted_by, None);
        assert_eq!(audit.created_by, creator);
        assert_eq!(audit.modified_by, Some(operator));
    }
}
