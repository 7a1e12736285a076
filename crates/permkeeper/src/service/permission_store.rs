use serde::{Deserialize, Serialize};

use crate::{
    api::Result,
    service::{EntityId, Grantee, GroupGrantee, GroupId, OrganizationId, TemplateId, UserId},
};

mod error;
pub use error::*;

#[async_trait::async_trait]
pub trait Transaction<D>
where
    Self: Sized + Send + Sync,
{
    type Transaction<'a>: Send + Sync + 'a
    where
        Self: 'static;

    async fn begin_write(db_state: D) -> Result<Self>;

    async fn begin_read(db_state: D) -> Result<Self>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;

    fn transaction(&mut self) -> Self::Transaction<'_>;
}

/// A single permission grant. `entity_id` is `None` for global grants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub grantee: Grantee,
    pub permission: String,
    pub entity_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTemplate {
    pub id: TemplateId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub description: Option<String>,
    /// Regular expression matched against the full entity key.
    pub key_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateUserPermission {
    pub user_id: UserId,
    pub user_login: String,
    pub permission: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateGroupPermission {
    pub group: GroupGrantee,
    pub group_name: String,
    pub permission: String,
}

/// Permission granted to whoever creates an entity from the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateCharacteristic {
    pub permission: String,
    pub with_project_creator: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultTemplates {
    pub project: Option<TemplateId>,
    pub portfolio: Option<TemplateId>,
    pub application: Option<TemplateId>,
}

/// Persistent grant and template store.
#[async_trait::async_trait]
pub trait PermissionStore
where
    Self: std::fmt::Debug + Clone + Send + Sync + 'static,
{
    type Transaction: Transaction<Self::State>;
    type State: Clone + std::fmt::Debug + Send + Sync + 'static;

    // ---------------- Grants ----------------
    async fn select_global_grants<'a>(
        grantee: Grantee,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<String>, StoreBackendError>;

    async fn select_entity_grants<'a>(
        grantee: Grantee,
        entity_id: EntityId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<String>, StoreBackendError>;

    async fn insert_grant<'a>(
        grant: &Grant,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<(), StoreBackendError>;

    async fn delete_grant<'a>(
        grant: &Grant,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<(), StoreBackendError>;

    /// Count distinct users holding a global permission, directly or through a group,
    /// ignoring everything granted to `excluded`.
    async fn count_users_with_global_permission_excluding<'a>(
        permission: &str,
        excluded: Grantee,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<u64, StoreBackendError>;

    /// Delete all user grants on an entity. Returns the number of deleted grants.
    async fn delete_entity_user_grants<'a>(
        entity_id: EntityId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<u64, StoreBackendError>;

    /// Delete all group grants on an entity, including grants to Anyone.
    async fn delete_entity_group_grants<'a>(
        entity_id: EntityId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<u64, StoreBackendError>;

    async fn select_user_group_ids<'a>(
        user_id: UserId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<GroupId>, StoreBackendError>;

    // ---------------- Templates ----------------
    async fn select_templates_for_organization<'a>(
        organization_id: OrganizationId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<PermissionTemplate>, StoreBackendError>;

    async fn select_template_by_id<'a>(
        template_id: TemplateId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Option<PermissionTemplate>, StoreBackendError>;

    async fn select_template_user_rows<'a>(
        template_id: TemplateId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<TemplateUserPermission>, StoreBackendError>;

    async fn select_template_group_rows<'a>(
        template_id: TemplateId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<TemplateGroupPermission>, StoreBackendError>;

    async fn select_template_characteristics<'a>(
        template_id: TemplateId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<TemplateCharacteristic>, StoreBackendError>;

    async fn select_default_templates<'a>(
        organization_id: OrganizationId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Option<DefaultTemplates>, StoreBackendError>;
}
