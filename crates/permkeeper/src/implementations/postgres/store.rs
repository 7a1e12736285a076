use super::{
    PostgresBackend, PostgresState, PostgresTransaction,
    grant::{
        count_users_with_global_permission_excluding, delete_entity_group_grants,
        delete_entity_user_grants, delete_grant, insert_grant, select_grants,
        select_user_group_ids,
    },
    template::{
        select_default_templates, select_template_by_id, select_template_characteristics,
        select_template_group_rows, select_template_user_rows, select_templates_for_organization,
    },
};
use crate::service::{
    DefaultTemplates, EntityId, Grant, Grantee, GroupId, OrganizationId, PermissionStore,
    PermissionTemplate, StoreBackendError, TemplateCharacteristic, TemplateGroupPermission,
    TemplateId, TemplateUserPermission, Transaction, UserId,
};

#[async_trait::async_trait]
impl PermissionStore for PostgresBackend {
    type Transaction = PostgresTransaction;
    type State = PostgresState;

    async fn select_global_grants<'a>(
        grantee: Grantee,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<String>, StoreBackendError> {
        select_grants(grantee, None, &mut **transaction).await
    }

    async fn select_entity_grants<'a>(
        grantee: Grantee,
        entity_id: EntityId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<String>, StoreBackendError> {
        select_grants(grantee, Some(entity_id), &mut **transaction).await
    }

    async fn insert_grant<'a>(
        grant: &Grant,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<(), StoreBackendError> {
        insert_grant(grant, &mut **transaction).await
    }

    async fn delete_grant<'a>(
        grant: &Grant,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<(), StoreBackendError> {
        delete_grant(grant, &mut **transaction).await
    }

    async fn count_users_with_global_permission_excluding<'a>(
        permission: &str,
        excluded: Grantee,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<u64, StoreBackendError> {
        count_users_with_global_permission_excluding(permission, excluded, &mut **transaction)
            .await
    }

    async fn delete_entity_user_grants<'a>(
        entity_id: EntityId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<u64, StoreBackendError> {
        delete_entity_user_grants(entity_id, &mut **transaction).await
    }

    async fn delete_entity_group_grants<'a>(
        entity_id: EntityId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<u64, StoreBackendError> {
        delete_entity_group_grants(entity_id, &mut **transaction).await
    }

    async fn select_user_group_ids<'a>(
        user_id: UserId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<GroupId>, StoreBackendError> {
        select_user_group_ids(user_id, &mut **transaction).await
    }

    async fn select_templates_for_organization<'a>(
        organization_id: OrganizationId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<PermissionTemplate>, StoreBackendError> {
        select_templates_for_organization(organization_id, &mut **transaction).await
    }

    async fn select_template_by_id<'a>(
        template_id: TemplateId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Option<PermissionTemplate>, StoreBackendError> {
        select_template_by_id(template_id, &mut **transaction).await
    }

    async fn select_template_user_rows<'a>(
        template_id: TemplateId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<TemplateUserPermission>, StoreBackendError> {
        select_template_user_rows(template_id, &mut **transaction).await
    }

    async fn select_template_group_rows<'a>(
        template_id: TemplateId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<TemplateGroupPermission>, StoreBackendError> {
        select_template_group_rows(template_id, &mut **transaction).await
    }

    async fn select_template_characteristics<'a>(
        template_id: TemplateId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<TemplateCharacteristic>, StoreBackendError> {
        select_template_characteristics(template_id, &mut **transaction).await
    }

    async fn select_default_templates<'a>(
        organization_id: OrganizationId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Option<DefaultTemplates>, StoreBackendError> {
        select_default_templates(organization_id, &mut **transaction).await
    }
}
