use std::sync::LazyLock;

use strum::IntoEnumIterator;

use super::{InvalidPermissionKey, PermissionScope};
use crate::{
    CONFIG,
    service::{ResourceKind, resource_kinds::ResourceKindRegistry},
};

/// Catalog built from the installation configuration.
pub static PERMISSION_CATALOG: LazyLock<PermissionCatalog> =
    LazyLock::new(|| PermissionCatalog::new(&CONFIG.enabled_resource_kinds));

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum GlobalPermission {
    /// Administer System
    Admin,
    GateAdmin,
    ProfileAdmin,
    Provisioning,
    Scan,
    ApplicationCreator,
    PortfolioCreator,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ProjectPermission {
    Admin,
    CodeViewer,
    IssueAdmin,
    SecurityHotspotAdmin,
    Scan,
    /// Browse
    User,
}

/// Permissions everyone holds implicitly on a public entity.
pub const PUBLIC_PERMISSIONS: [ProjectPermission; 2] =
    [ProjectPermission::User, ProjectPermission::CodeViewer];

#[must_use]
pub fn is_public_permission(key: &str) -> bool {
    PUBLIC_PERMISSIONS.iter().any(|p| p.as_ref() == key)
}

/// Valid permission keys per scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCatalog {
    global: Vec<GlobalPermission>,
    project: Vec<ProjectPermission>,
}

impl PermissionCatalog {
    #[must_use]
    pub fn new(resource_kinds: &dyn ResourceKindRegistry) -> Self {
        let global = GlobalPermission::iter()
            .filter(|p| match p {
                GlobalPermission::ApplicationCreator => {
                    resource_kinds.is_enabled(ResourceKind::Application)
                }
                GlobalPermission::PortfolioCreator => {
                    resource_kinds.is_enabled(ResourceKind::Portfolio)
                }
                _ => true,
            })
            .collect();

        Self {
            global,
            project: ProjectPermission::iter().collect(),
        }
    }

    #[must_use]
    pub fn global_permissions(&self) -> &[GlobalPermission] {
        &self.global
    }

    #[must_use]
    pub fn project_permissions(&self) -> &[ProjectPermission] {
        &self.project
    }

    #[must_use]
    pub fn contains(&self, scope: PermissionScope, key: &str) -> bool {
        match scope {
            PermissionScope::Global => self.global.iter().any(|p| p.as_ref() == key),
            PermissionScope::Project => self.project.iter().any(|p| p.as_ref() == key),
        }
    }

    /// Fails if `key` is not valid for `scope`.
    pub fn check(&self, scope: PermissionScope, key: &str) -> Result<(), InvalidPermissionKey> {
        if self.contains(scope, key) {
            return Ok(());
        }

        let valid = match scope {
            PermissionScope::Global => self.global.iter().map(ToString::to_string).collect(),
            PermissionScope::Project => self.project.iter().map(ToString::to_string).collect(),
        };
        Err(InvalidPermissionKey::new(scope, key, valid))
    }
}
