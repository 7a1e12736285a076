//! Process-local store with snapshot isolation.
//!
//! A transaction works on a copy of the shared data. `commit` replaces the shared data
//! with the copy, unless another transaction committed in the meantime, in which case
//! the commit fails with a conflict.
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    api::{ErrorModel, Result},
    service::{
        DefaultTemplates, EntityId, Grant, Grantee, GroupId, OrganizationId,
        PermissionStore, PermissionTemplate, StoreBackendError, TemplateCharacteristic,
        TemplateGroupPermission, TemplateId, TemplateUserPermission, Transaction, UserId,
    },
};

#[derive(Debug, Clone, Default)]
pub struct InMemoryData {
    version: u64,
    grants: HashSet<Grant>,
    group_members: HashMap<GroupId, HashSet<UserId>>,
    templates: HashMap<TemplateId, PermissionTemplate>,
    template_users: HashMap<TemplateId, Vec<TemplateUserPermission>>,
    template_groups: HashMap<TemplateId, Vec<TemplateGroupPermission>>,
    template_characteristics: HashMap<TemplateId, Vec<TemplateCharacteristic>>,
    default_templates: HashMap<OrganizationId, DefaultTemplates>,
}

impl InMemoryData {
    fn users_of(&self, grantee: Grantee) -> HashSet<UserId> {
        match grantee {
            Grantee::User(user) => HashSet::from([user]),
            Grantee::Group(group) => self.group_members.get(&group).cloned().unwrap_or_default(),
            Grantee::Anyone => HashSet::new(),
        }
    }
}

/// Shared handle to the in-memory store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryState {
    data: Arc<Mutex<InMemoryData>>,
}

impl InMemoryState {
    fn lock(&self) -> MutexGuard<'_, InMemoryData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn modify(&self, f: impl FnOnce(&mut InMemoryData)) {
        let mut data = self.lock();
        f(&mut data);
        data.version += 1;
    }

    /// All committed grants.
    #[must_use]
    pub fn grants(&self) -> HashSet<Grant> {
        self.lock().grants.clone()
    }

    #[must_use]
    pub fn global_permissions_of(&self, grantee: Grantee) -> HashSet<String> {
        self.lock()
            .grants
            .iter()
            .filter(|g| g.grantee == grantee && g.entity_id.is_none())
            .map(|g| g.permission.clone())
            .collect()
    }

    pub fn seed_grant(&self, grant: Grant) {
        self.modify(|data| {
            data.grants.insert(grant);
        });
    }

    pub fn add_group_member(&self, group_id: GroupId, user_id: UserId) {
        self.modify(|data| {
            data.group_members.entry(group_id).or_default().insert(user_id);
        });
    }

    pub fn add_template(&self, template: PermissionTemplate) {
        self.modify(|data| {
            data.templates.insert(template.id, template);
        });
    }

    pub fn add_template_user_row(&self, template_id: TemplateId, row: TemplateUserPermission) {
        self.modify(|data| data.template_users.entry(template_id).or_default().push(row));
    }

    pub fn add_template_group_row(&self, template_id: TemplateId, row: TemplateGroupPermission) {
        self.modify(|data| data.template_groups.entry(template_id).or_default().push(row));
    }

    pub fn add_template_characteristic(
        &self,
        template_id: TemplateId,
        characteristic: TemplateCharacteristic,
    ) {
        self.modify(|data| {
            data.template_characteristics
                .entry(template_id)
                .or_default()
                .push(characteristic);
        });
    }

    pub fn set_default_templates(&self, organization_id: OrganizationId, defaults: DefaultTemplates) {
        self.modify(|data| {
            data.default_templates.insert(organization_id, defaults);
        });
    }
}

#[derive(Debug)]
pub struct InMemoryTransaction {
    state: InMemoryState,
    base_version: u64,
    staged: InMemoryData,
}

#[async_trait::async_trait]
impl Transaction<InMemoryState> for InMemoryTransaction {
    type Transaction<'a> = &'a mut InMemoryData;

    async fn begin_write(db_state: InMemoryState) -> Result<Self> {
        let staged = db_state.lock().clone();
        Ok(Self {
            base_version: staged.version,
            state: db_state,
            staged,
        })
    }

    async fn begin_read(db_state: InMemoryState) -> Result<Self> {
        Self::begin_write(db_state).await
    }

    async fn commit(self) -> Result<()> {
        let Self {
            state,
            base_version,
            mut staged,
        } = self;
        let mut data = state.lock();
        if data.version != base_version {
            return Err(ErrorModel::conflict(
                "Concurrent modification failed.",
                "TransactionFailed",
                None,
            ));
        }
        staged.version = base_version + 1;
        *data = staged;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }

    fn transaction(&mut self) -> Self::Transaction<'_> {
        &mut self.staged
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InMemoryBackend;

#[async_trait::async_trait]
impl PermissionStore for InMemoryBackend {
    type Transaction = InMemoryTransaction;
    type State = InMemoryState;

    async fn select_global_grants<'a>(
        grantee: Grantee,
        transaction: &'a mut InMemoryData,
    ) -> Result<Vec<String>, StoreBackendError> {
        Ok(transaction
            .grants
            .iter()
            .filter(|g| g.grantee == grantee && g.entity_id.is_none())
            .map(|g| g.permission.clone())
            .collect())
    }

    async fn select_entity_grants<'a>(
        grantee: Grantee,
        entity_id: EntityId,
        transaction: &'a mut InMemoryData,
    ) -> Result<Vec<String>, StoreBackendError> {
        Ok(transaction
            .grants
            .iter()
            .filter(|g| g.grantee == grantee && g.entity_id == Some(entity_id))
            .map(|g| g.permission.clone())
            .collect())
    }

    async fn insert_grant<'a>(
        grant: &Grant,
        transaction: &'a mut InMemoryData,
    ) -> Result<(), StoreBackendError> {
        transaction.grants.insert(grant.clone());
        Ok(())
    }

    async fn delete_grant<'a>(
        grant: &Grant,
        transaction: &'a mut InMemoryData,
    ) -> Result<(), StoreBackendError> {
        transaction.grants.remove(grant);
        Ok(())
    }

    async fn count_users_with_global_permission_excluding<'a>(
        permission: &str,
        excluded: Grantee,
        transaction: &'a mut InMemoryData,
    ) -> Result<u64, StoreBackendError> {
        let excluded_user = match excluded {
            Grantee::User(user) => Some(user),
            Grantee::Group(_) | Grantee::Anyone => None,
        };
        let users: HashSet<UserId> = transaction
            .grants
            .iter()
            .filter(|g| g.entity_id.is_none() && g.permission == permission && g.grantee != excluded)
            .flat_map(|g| transaction.users_of(g.grantee))
            .filter(|user| Some(*user) != excluded_user)
            .collect();
        Ok(users.len() as u64)
    }

    async fn delete_entity_user_grants<'a>(
        entity_id: EntityId,
        transaction: &'a mut InMemoryData,
    ) -> Result<u64, StoreBackendError> {
        let before = transaction.grants.len();
        transaction.grants.retain(|g| {
            !(g.entity_id == Some(entity_id) && matches!(g.grantee, Grantee::User(_)))
        });
        Ok((before - transaction.grants.len()) as u64)
    }

    async fn delete_entity_group_grants<'a>(
        entity_id: EntityId,
        transaction: &'a mut InMemoryData,
    ) -> Result<u64, StoreBackendError> {
        let before = transaction.grants.len();
        transaction.grants.retain(|g| {
            !(g.entity_id == Some(entity_id)
                && matches!(g.grantee, Grantee::Group(_) | Grantee::Anyone))
        });
        Ok((before - transaction.grants.len()) as u64)
    }

    async fn select_user_group_ids<'a>(
        user_id: UserId,
        transaction: &'a mut InMemoryData,
    ) -> Result<Vec<GroupId>, StoreBackendError> {
        Ok(transaction
            .group_members
            .iter()
            .filter(|(_, members)| members.contains(&user_id))
            .map(|(group, _)| *group)
            .collect())
    }

    async fn select_templates_for_organization<'a>(
        organization_id: OrganizationId,
        transaction: &'a mut InMemoryData,
    ) -> Result<Vec<PermissionTemplate>, StoreBackendError> {
        let mut templates: Vec<_> = transaction
            .templates
            .values()
            .filter(|t| t.organization_id == organization_id)
            .cloned()
            .collect();
        templates.sort_by_key(|t| t.name.to_lowercase());
        Ok(templates)
    }

    async fn select_template_by_id<'a>(
        template_id: TemplateId,
        transaction: &'a mut InMemoryData,
    ) -> Result<Option<PermissionTemplate>, StoreBackendError> {
        Ok(transaction.templates.get(&template_id).cloned())
    }

    async fn select_template_user_rows<'a>(
        template_id: TemplateId,
        transaction: &'a mut InMemoryData,
    ) -> Result<Vec<TemplateUserPermission>, StoreBackendError> {
        Ok(transaction
            .template_users
            .get(&template_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn select_template_group_rows<'a>(
        template_id: TemplateId,
        transaction: &'a mut InMemoryData,
    ) -> Result<Vec<TemplateGroupPermission>, StoreBackendError> {
        Ok(transaction
            .template_groups
            .get(&template_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn select_template_characteristics<'a>(
        template_id: TemplateId,
        transaction: &'a mut InMemoryData,
    ) -> Result<Vec<TemplateCharacteristic>, StoreBackendError> {
        Ok(transaction
            .template_characteristics
            .get(&template_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn select_default_templates<'a>(
        organization_id: OrganizationId,
        transaction: &'a mut InMemoryData,
    ) -> Result<Option<DefaultTemplates>, StoreBackendError> {
        Ok(transaction.default_templates.get(&organization_id).cloned())
    }
}
