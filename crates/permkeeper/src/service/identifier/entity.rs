use serde::{Deserialize, Serialize};

use super::{EntityId, OrganizationId};

/// Kind of a resource that can carry entity-scoped permissions.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    Project,
    Portfolio,
    Application,
}

/// A resource that permissions can be scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub organization_id: OrganizationId,
    /// Key matched against template key patterns.
    pub key: String,
    pub name: String,
    pub kind: ResourceKind,
    pub is_private: bool,
}

impl Entity {
    #[must_use]
    pub fn is_public(&self) -> bool {
        !self.is_private
    }
}
