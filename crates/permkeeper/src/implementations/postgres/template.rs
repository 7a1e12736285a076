use uuid::Uuid;

use super::dbutils::DBErrorHandler;
use crate::service::{
    DatabaseIntegrityError, DefaultTemplates, GroupGrantee, GroupId, OrganizationId,
    PermissionTemplate, StoreBackendError, TemplateCharacteristic, TemplateGroupPermission,
    TemplateId, TemplateUserPermission, UserId,
};

#[derive(sqlx::FromRow, Debug)]
struct TemplateRow {
    id: Uuid,
    organization_id: Uuid,
    name: String,
    description: Option<String>,
    key_pattern: Option<String>,
}

impl From<TemplateRow> for PermissionTemplate {
    fn from(
        TemplateRow {
            id,
            organization_id,
            name,
            description,
            key_pattern,
        }: TemplateRow,
    ) -> Self {
        Self {
            id: TemplateId::from(id),
            organization_id: OrganizationId::from(organization_id),
            name,
            description,
            key_pattern,
        }
    }
}

#[derive(sqlx::FromRow, Debug)]
struct TemplateUserRow {
    user_id: Uuid,
    user_login: String,
    permission: String,
}

#[derive(sqlx::FromRow, Debug)]
struct TemplateGroupRow {
    group_id: Option<Uuid>,
    group_name: Option<String>,
    permission: String,
}

impl TryFrom<TemplateGroupRow> for TemplateGroupPermission {
    type Error = DatabaseIntegrityError;

    fn try_from(row: TemplateGroupRow) -> Result<Self, Self::Error> {
        let (group, group_name) = match (row.group_id, row.group_name) {
            (None, _) => (GroupGrantee::Anyone, "Anyone".to_string()),
            (Some(id), Some(name)) => (GroupGrantee::Group(GroupId::from(id)), name),
            (Some(id), None) => {
                return Err(DatabaseIntegrityError::new(format!(
                    "Template group permission references missing group '{id}'"
                )));
            }
        };
        Ok(Self {
            group,
            group_name,
            permission: row.permission,
        })
    }
}

#[derive(sqlx::FromRow, Debug)]
struct DefaultTemplatesRow {
    project_template_id: Option<Uuid>,
    portfolio_template_id: Option<Uuid>,
    application_template_id: Option<Uuid>,
}

pub(crate) async fn select_templates_for_organization<
    'c,
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
>(
    organization_id: OrganizationId,
    connection: E,
) -> Result<Vec<PermissionTemplate>, StoreBackendError> {
    let rows: Vec<TemplateRow> = sqlx::query_as(
        r"
        SELECT id, organization_id, name, description, key_pattern
        FROM permission_template
        WHERE organization_id = $1
        ORDER BY lower(name)
        ",
    )
    .bind(*organization_id)
    .fetch_all(connection)
    .await
    .map_err(|e| {
        e.into_store_backend_error()
            .append_detail(format!("Error fetching templates of organization {organization_id}"))
    })?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn select_template_by_id<'c, E: sqlx::Executor<'c, Database = sqlx::Postgres>>(
    template_id: TemplateId,
    connection: E,
) -> Result<Option<PermissionTemplate>, StoreBackendError> {
    let row: Option<TemplateRow> = sqlx::query_as(
        r"
        SELECT id, organization_id, name, description, key_pattern
        FROM permission_template
        WHERE id = $1
        ",
    )
    .bind(*template_id)
    .fetch_optional(connection)
    .await
    .map_err(DBErrorHandler::into_store_backend_error)?;
    Ok(row.map(Into::into))
}

pub(crate) async fn select_template_user_rows<
    'c,
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
>(
    template_id: TemplateId,
    connection: E,
) -> Result<Vec<TemplateUserPermission>, StoreBackendError> {
    let rows: Vec<TemplateUserRow> = sqlx::query_as(
        r"
        SELECT tup.user_id, u.login AS user_login, tup.permission
        FROM template_user_permission tup
        JOIN app_user u ON u.id = tup.user_id
        WHERE tup.template_id = $1
        ",
    )
    .bind(*template_id)
    .fetch_all(connection)
    .await
    .map_err(DBErrorHandler::into_store_backend_error)?;

    Ok(rows
        .into_iter()
        .map(|row| TemplateUserPermission {
            user_id: UserId::from(row.user_id),
            user_login: row.user_login,
            permission: row.permission,
        })
        .collect())
}

pub(crate) async fn select_template_group_rows<
    'c,
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
>(
    template_id: TemplateId,
    connection: E,
) -> Result<Vec<TemplateGroupPermission>, StoreBackendError> {
    let rows: Vec<TemplateGroupRow> = sqlx::query_as(
        r"
        SELECT tgp.group_id, g.name AS group_name, tgp.permission
        FROM template_group_permission tgp
        LEFT JOIN app_group g ON g.id = tgp.group_id
        WHERE tgp.template_id = $1
        ",
    )
    .bind(*template_id)
    .fetch_all(connection)
    .await
    .map_err(DBErrorHandler::into_store_backend_error)?;

    rows.into_iter()
        .map(|row| TemplateGroupPermission::try_from(row).map_err(Into::into))
        .collect()
}

pub(crate) async fn select_template_characteristics<
    'c,
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
>(
    template_id: TemplateId,
    connection: E,
) -> Result<Vec<TemplateCharacteristic>, StoreBackendError> {
    let rows: Vec<(String, bool)> = sqlx::query_as(
        r"
        SELECT permission, with_project_creator
        FROM template_characteristic
        WHERE template_id = $1
        ",
    )
    .bind(*template_id)
    .fetch_all(connection)
    .await
    .map_err(DBErrorHandler::into_store_backend_error)?;

    Ok(rows
        .into_iter()
        .map(|(permission, with_project_creator)| TemplateCharacteristic {
            permission,
            with_project_creator,
        })
        .collect())
}

pub(crate) async fn select_default_templates<
    'c,
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
>(
    organization_id: OrganizationId,
    connection: E,
) -> Result<Option<DefaultTemplates>, StoreBackendError> {
    let row: Option<DefaultTemplatesRow> = sqlx::query_as(
        r"
        SELECT project_template_id, portfolio_template_id, application_template_id
        FROM default_templates
        WHERE organization_id = $1
        ",
    )
    .bind(*organization_id)
    .fetch_optional(connection)
    .await
    .map_err(DBErrorHandler::into_store_backend_error)?;

    Ok(row.map(|row| DefaultTemplates {
        project: row.project_template_id.map(TemplateId::from),
        portfolio: row.portfolio_template_id.map(TemplateId::from),
        application: row.application_template_id.map(TemplateId::from),
    }))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use sqlx::PgPool;

    use super::*;
    use crate::implementations::postgres::grant::test::{create_group, create_user};

    async fn create_template(
        pool: &PgPool,
        organization_id: OrganizationId,
        name: &str,
        key_pattern: Option<&str>,
    ) -> TemplateId {
        let id = TemplateId::new_random();
        sqlx::query(
            "INSERT INTO permission_template (id, organization_id, name, key_pattern) VALUES ($1, $2, $3, $4)",
        )
        .bind(*id)
        .bind(*organization_id)
        .bind(name)
        .bind(key_pattern)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[test]
    fn test_group_row_without_group_name_is_integrity_error() {
        let anyone = TemplateGroupPermission::try_from(TemplateGroupRow {
            group_id: None,
            group_name: None,
            permission: "user".to_string(),
        })
        .unwrap();
        assert_eq!(anyone.group, GroupGrantee::Anyone);
        assert_eq!(anyone.group_name, "Anyone");

        let err = TemplateGroupPermission::try_from(TemplateGroupRow {
            group_id: Some(Uuid::now_v7()),
            group_name: None,
            permission: "scan".to_string(),
        })
        .unwrap_err();
        assert!(err.to_string().contains("references missing group"));
    }

    #[sqlx::test]
    async fn test_template_rows(pool: PgPool) {
        let org = OrganizationId::new_random();
        let template = create_template(&pool, org, "Default", None).await;
        create_template(&pool, org, "apps", Some("app-.*")).await;
        let alice = create_user(&pool, "alice").await;
        let devs = create_group(&pool, "devs", &[alice]).await;

        sqlx::query(
            "INSERT INTO template_user_permission (template_id, user_id, permission) VALUES ($1, $2, 'admin')",
        )
        .bind(*template)
        .bind(*alice)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            r"INSERT INTO template_group_permission (template_id, group_id, permission)
              VALUES ($1, $2, 'scan'), ($1, NULL, 'user')",
        )
        .bind(*template)
        .bind(*devs)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO template_characteristic (template_id, permission, with_project_creator) VALUES ($1, 'admin', true)",
        )
        .bind(*template)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO default_templates (organization_id, project_template_id) VALUES ($1, $2)",
        )
        .bind(*org)
        .bind(*template)
        .execute(&pool)
        .await
        .unwrap();

        let templates = select_templates_for_organization(org, &pool).await.unwrap();
        assert_eq!(
            templates.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["apps", "Default"]
        );

        let users = select_template_user_rows(template, &pool).await.unwrap();
        assert_eq!(users[0].user_login, "alice");

        let mut groups = select_template_group_rows(template, &pool).await.unwrap();
        groups.sort_by(|a, b| a.group_name.cmp(&b.group_name));
        assert_eq!(groups[0].group, GroupGrantee::Anyone);
        assert_eq!(groups[0].group_name, "Anyone");
        assert_eq!(groups[1].group, GroupGrantee::Group(devs));

        assert_eq!(
            select_template_characteristics(template, &pool).await.unwrap(),
            vec![TemplateCharacteristic {
                permission: "admin".to_string(),
                with_project_creator: true,
            }]
        );
        assert_eq!(
            select_default_templates(org, &pool).await.unwrap(),
            Some(DefaultTemplates {
                project: Some(template),
                portfolio: None,
                application: None,
            })
        );
        assert_eq!(
            select_default_templates(OrganizationId::new_random(), &pool)
                .await
                .unwrap(),
            None
        );
    }
}
