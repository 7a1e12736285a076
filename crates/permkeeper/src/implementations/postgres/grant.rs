use uuid::Uuid;

use super::dbutils::DBErrorHandler;
use crate::service::{EntityId, Grant, Grantee, GroupId, StoreBackendError, UserId};

/// Column values identifying a grantee in `user_permission` or `group_permission`.
/// A `None` group is Anyone.
enum GranteeColumn {
    User(Uuid),
    Group(Option<Uuid>),
}

impl From<Grantee> for GranteeColumn {
    fn from(grantee: Grantee) -> Self {
        match grantee {
            Grantee::User(user) => Self::User(*user),
            Grantee::Group(group) => Self::Group(Some(*group)),
            Grantee::Anyone => Self::Group(None),
        }
    }
}

pub(crate) async fn select_grants<'c, E: sqlx::Executor<'c, Database = sqlx::Postgres>>(
    grantee: Grantee,
    entity_id: Option<EntityId>,
    connection: E,
) -> Result<Vec<String>, StoreBackendError> {
    let entity_id = entity_id.map(|id| *id);
    let query = match GranteeColumn::from(grantee) {
        GranteeColumn::User(user_id) => sqlx::query_scalar(
            r"
            SELECT permission FROM user_permission
            WHERE user_id = $1 AND entity_id IS NOT DISTINCT FROM $2
            ",
        )
        .bind(user_id),
        GranteeColumn::Group(group_id) => sqlx::query_scalar(
            r"
            SELECT permission FROM group_permission
            WHERE group_id IS NOT DISTINCT FROM $1 AND entity_id IS NOT DISTINCT FROM $2
            ",
        )
        .bind(group_id),
    };

    query
        .bind(entity_id)
        .fetch_all(connection)
        .await
        .map_err(|e| {
            e.into_store_backend_error()
                .append_detail(format!("Error fetching permissions of {grantee}"))
        })
}

pub(crate) async fn insert_grant<'c, E: sqlx::Executor<'c, Database = sqlx::Postgres>>(
    grant: &Grant,
    connection: E,
) -> Result<(), StoreBackendError> {
    let entity_id = grant.entity_id.map(|id| *id);
    let query = match GranteeColumn::from(grant.grantee) {
        GranteeColumn::User(user_id) => sqlx::query(
            r"
            INSERT INTO user_permission (user_id, permission, entity_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(user_id),
        GranteeColumn::Group(group_id) => sqlx::query(
            r"
            INSERT INTO group_permission (group_id, permission, entity_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(group_id),
    };

    query
        .bind(&grant.permission)
        .bind(entity_id)
        .execute(connection)
        .await
        .map_err(|e| {
            e.into_store_backend_error().append_detail(format!(
                "Error granting '{}' to {}",
                grant.permission, grant.grantee
            ))
        })?;
    Ok(())
}

pub(crate) async fn delete_grant<'c, E: sqlx::Executor<'c, Database = sqlx::Postgres>>(
    grant: &Grant,
    connection: E,
) -> Result<(), StoreBackendError> {
    let entity_id = grant.entity_id.map(|id| *id);
    let query = match GranteeColumn::from(grant.grantee) {
        GranteeColumn::User(user_id) => sqlx::query(
            r"
            DELETE FROM user_permission
            WHERE user_id = $1 AND permission = $2 AND entity_id IS NOT DISTINCT FROM $3
            ",
        )
        .bind(user_id),
        GranteeColumn::Group(group_id) => sqlx::query(
            r"
            DELETE FROM group_permission
            WHERE group_id IS NOT DISTINCT FROM $1
                AND permission = $2
                AND entity_id IS NOT DISTINCT FROM $3
            ",
        )
        .bind(group_id),
    };

    query
        .bind(&grant.permission)
        .bind(entity_id)
        .execute(connection)
        .await
        .map_err(|e| {
            e.into_store_backend_error().append_detail(format!(
                "Error revoking '{}' from {}",
                grant.permission, grant.grantee
            ))
        })?;
    Ok(())
}

pub(crate) async fn count_users_with_global_permission_excluding<
    'c,
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
>(
    permission: &str,
    excluded: Grantee,
    connection: E,
) -> Result<u64, StoreBackendError> {
    let (excluded_user, excluded_group) = match GranteeColumn::from(excluded) {
        GranteeColumn::User(user_id) => (Some(user_id), None),
        GranteeColumn::Group(group_id) => (None, group_id),
    };

    let count: i64 = sqlx::query_scalar(
        r"
        SELECT COUNT(DISTINCT holders.user_id) FROM (
            SELECT up.user_id FROM user_permission up
            WHERE up.permission = $1 AND up.entity_id IS NULL
            UNION ALL
            SELECT gm.user_id FROM group_permission gp
            JOIN group_membership gm ON gm.group_id = gp.group_id
            WHERE gp.permission = $1
                AND gp.entity_id IS NULL
                AND gp.group_id IS DISTINCT FROM $3
        ) holders
        WHERE holders.user_id IS DISTINCT FROM $2
        ",
    )
    .bind(permission)
    .bind(excluded_user)
    .bind(excluded_group)
    .fetch_one(connection)
    .await
    .map_err(|e| {
        e.into_store_backend_error()
            .append_detail(format!("Error counting holders of '{permission}'"))
    })?;

    Ok(count.unsigned_abs())
}

pub(crate) async fn delete_entity_user_grants<
    'c,
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
>(
    entity_id: EntityId,
    connection: E,
) -> Result<u64, StoreBackendError> {
    let result = sqlx::query("DELETE FROM user_permission WHERE entity_id = $1")
        .bind(*entity_id)
        .execute(connection)
        .await
        .map_err(DBErrorHandler::into_store_backend_error)?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_entity_group_grants<
    'c,
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
>(
    entity_id: EntityId,
    connection: E,
) -> Result<u64, StoreBackendError> {
    let result = sqlx::query("DELETE FROM group_permission WHERE entity_id = $1")
        .bind(*entity_id)
        .execute(connection)
        .await
        .map_err(DBErrorHandler::into_store_backend_error)?;
    Ok(result.rows_affected())
}

pub(crate) async fn select_user_group_ids<
    'c,
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
>(
    user_id: UserId,
    connection: E,
) -> Result<Vec<GroupId>, StoreBackendError> {
    let ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT group_id FROM group_membership WHERE user_id = $1")
            .bind(*user_id)
            .fetch_all(connection)
            .await
            .map_err(DBErrorHandler::into_store_backend_error)?;
    Ok(ids.into_iter().map(GroupId::from).collect())
}
