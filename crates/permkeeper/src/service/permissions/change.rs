use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

use super::{InvalidPermissionKey, PermissionCatalog};
use crate::service::{Entity, EntityId, GroupId, UserId};

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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Grant,
    Revoke,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PermissionScope {
    Global,
    Project,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum GranteeKind {
    User,
    Group,
}

/// Principal that receives or loses a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Grantee {
    User(UserId),
    Group(GroupId),
    /// All authenticated and anonymous users.
    Anyone,
}

impl Display for Grantee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Grantee::User(id) => write!(f, "user {id}"),
            Grantee::Group(id) => write!(f, "group {id}"),
            Grantee::Anyone => write!(f, "group Anyone"),
        }
    }
}

/// The group side of [`Grantee`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum GroupGrantee {
    Group(GroupId),
    Anyone,
}

impl From<GroupGrantee> for Grantee {
    fn from(value: GroupGrantee) -> Self {
        match value {
            GroupGrantee::Group(id) => Grantee::Group(id),
            GroupGrantee::Anyone => Grantee::Anyone,
        }
    }
}

impl From<UserId> for Grantee {
    fn from(value: UserId) -> Self {
        Grantee::User(value)
    }
}

impl Display for GroupGrantee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&Grantee::from(*self), f)
    }
}

/// Typed grantee of a [`PermissionChange`].
pub trait GranteeRef: Into<Grantee> + Copy + Debug + Display + Send + Sync + 'static {
    fn is_anyone(&self) -> bool {
        false
    }
}

impl GranteeRef for Grantee {
    fn is_anyone(&self) -> bool {
        matches!(self, Grantee::Anyone)
    }
}

impl GranteeRef for UserId {}

impl GranteeRef for GroupGrantee {
    fn is_anyone(&self) -> bool {
        matches!(self, GroupGrantee::Anyone)
    }
}

/// One requested grant or revoke.
///
/// The permission key is validated on construction against the global catalog
/// if no entity is given, and against the project catalog otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionChange<G = Grantee> {
    operation: Operation,
    permission: String,
    entity: Option<Entity>,
    grantee: G,
}

pub type UserPermissionChange = PermissionChange<UserId>;
pub type GroupPermissionChange = PermissionChange<GroupGrantee>;

impl<G: GranteeRef> PermissionChange<G> {
    pub fn try_new(
        operation: Operation,
        permission: impl Into<String>,
        entity: Option<Entity>,
        grantee: G,
        catalog: &PermissionCatalog,
    ) -> Result<Self, InvalidPermissionKey> {
        let permission = permission.into();
        let scope = if entity.is_some() {
            PermissionScope::Project
        } else {
            PermissionScope::Global
        };
        catalog.check(scope, &permission)?;

        Ok(Self {
            operation,
            permission,
            entity,
            grantee,
        })
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    #[must_use]
    pub fn permission(&self) -> &str {
        &self.permission
    }

    #[must_use]
    pub fn entity(&self) -> Option<&Entity> {
        self.entity.as_ref()
    }

    #[must_use]
    pub fn entity_id(&self) -> Option<EntityId> {
        self.entity.as_ref().map(|e| e.id)
    }

    #[must_use]
    pub fn grantee(&self) -> G {
        self.grantee
    }

    #[must_use]
    pub fn scope(&self) -> PermissionScope {
        if self.entity.is_some() {
            PermissionScope::Project
        } else {
            PermissionScope::Global
        }
    }

    fn with_grantee<H: GranteeRef>(self, grantee: H) -> PermissionChange<H> {
        PermissionChange {
            operation: self.operation,
            permission: self.permission,
            entity: self.entity,
            grantee,
        }
    }
}

/// A change routed to the applier responsible for its grantee type.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::From)]
pub enum RoutedPermissionChange {
    User(UserPermissionChange),
    Group(GroupPermissionChange),
}

impl PermissionChange<Grantee> {
    #[must_use]
    pub fn route(self) -> RoutedPermissionChange {
        match self.grantee {
            Grantee::User(id) => RoutedPermissionChange::User(self.with_grantee(id)),
            Grantee::Group(id) => {
                RoutedPermissionChange::Group(self.with_grantee(GroupGrantee::Group(id)))
            }
            Grantee::Anyone => RoutedPermissionChange::Group(self.with_grantee(GroupGrantee::Anyone)),
        }
    }
}
