use std::{path::Path, sync::Arc};

use anyhow::Context;
use permkeeper::{
    CONFIG,
    implementations::postgres::{
        PostgresBackend, PostgresState, get_reader_pool, get_writer_pool, migrations,
    },
    service::{
        Entity, Grantee, Operation, PERMISSION_CATALOG, PermissionChange,
        GroupId, PermissionTemplateService, PermissionUpdater, TemplateId, UserId,
        events::{ChangeNotifier, LoggingListener},
    },
    tracing,
};
use serde::de::DeserializeOwned;

use crate::CONFIG_BIN;

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub(crate) fn grantee_from_args(
    user: Option<UserId>,
    group: Option<GroupId>,
    anyone: bool,
) -> anyhow::Result<Grantee> {
    match (user, group, anyone) {
        (Some(user), None, false) => Ok(Grantee::User(user)),
        (None, Some(group), false) => Ok(Grantee::Group(group)),
        (None, None, true) => Ok(Grantee::Anyone),
        _ => anyhow::bail!("Exactly one of --user, --group or --anyone is required"),
    }
}

fn notifier() -> ChangeNotifier {
    ChangeNotifier::new(vec![Arc::new(LoggingListener)])
}

pub(crate) async fn migrate() -> anyhow::Result<()> {
    println!("Migrating database...");
    let write_pool = get_writer_pool(CONFIG.to_pool_opts()).await?;
    migrations::migrate(&write_pool).await?;
    println!("Database migration complete.");
    Ok(())
}

async fn state() -> anyhow::Result<PostgresState> {
    if CONFIG_BIN.debug.migrate_before_run {
        migrate().await?;
    }

    let read_pool = get_reader_pool(CONFIG.to_pool_opts()).await?;
    let write_pool = get_writer_pool(CONFIG.to_pool_opts()).await?;
    if !migrations::check_migration_status(&write_pool).await? {
        anyhow::bail!("Database is not migrated. Run `permkeeper migrate` first.");
    }
    Ok(PostgresState::from_pools(read_pool, write_pool))
}

pub(crate) async fn apply_template(template_id: TemplateId, entities: &Path) -> anyhow::Result<()> {
    let entities: Vec<Entity> = read_json(entities)?;
    let service = PermissionTemplateService::new(Arc::new(CONFIG.enabled_resource_kinds), notifier());

    let applied = service
        .reapply_and_commit::<PostgresBackend>(state().await?, template_id, &entities)
        .await
        .inspect_err(|e| tracing::error!("Failed to apply template: {e}"))?;
    println!("{}", serde_json::to_string_pretty(&applied)?);
    Ok(())
}

pub(crate) async fn apply_default_template(
    entity: &Path,
    creator: Option<UserId>,
) -> anyhow::Result<()> {
    let entity: Entity = read_json(entity)?;
    let service = PermissionTemplateService::new(Arc::new(CONFIG.enabled_resource_kinds), notifier());

    let applied = service
        .apply_default_and_commit::<PostgresBackend>(
            state().await?,
            &entity,
            creator,
        )
        .await
        .inspect_err(|e| tracing::error!("Failed to apply default template: {e}"))?;
    println!("{}", serde_json::to_string_pretty(&applied)?);
    Ok(())
}

pub(crate) async fn change(
    operation: Operation,
    permission: String,
    grantee: Grantee,
    entity: Option<&Path>,
) -> anyhow::Result<()> {
    let entity = entity.map(read_json::<Entity>).transpose()?;
    let change =
        PermissionChange::try_new(operation, permission, entity, grantee, &PERMISSION_CATALOG)?;

    let summary = PermissionUpdater::new(notifier())
        .apply_and_commit::<PostgresBackend>(state().await?, vec![change])
        .await
        .inspect_err(|e| tracing::error!("Failed to apply permission change: {e}"))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
