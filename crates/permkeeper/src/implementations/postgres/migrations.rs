use sqlx::PgPool;

/// Apply all embedded migrations.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    Ok(())
}

/// Whether every embedded migration has been applied.
pub async fn check_migration_status(pool: &PgPool) -> anyhow::Result<bool> {
    let applied: Vec<i64> = sqlx::query_scalar(
        "SELECT version FROM _sqlx_migrations WHERE success ORDER BY version",
    )
    .fetch_all(pool)
    .await?;
    Ok(sqlx::migrate!()
        .iter()
        .all(|migration| applied.contains(&migration.version)))
}
