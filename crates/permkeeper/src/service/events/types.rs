use std::sync::Arc;

use serde::Serialize;

use crate::service::{EntityId, TemplateId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum ChangeCause {
    PermissionChange,
    TemplateApplied { template_id: TemplateId },
}

/// Emitted after grants were committed. Listeners typically resynchronize a
/// search index for the listed entities.
#[derive(Debug, Clone, Serialize)]
pub struct PermissionsChangedEvent {
    pub entity_ids: Arc<Vec<EntityId>>,
    /// At least one global grant changed.
    pub global: bool,
    #[serde(flatten)]
    pub cause: ChangeCause,
}

impl PermissionsChangedEvent {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity_ids.is_empty() && !self.global
    }
}
