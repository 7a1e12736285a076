use std::str::FromStr;

use anyhow::Context;
use sqlx::{
    PgPool, Postgres,
    postgres::{PgConnectOptions, PgPoolOptions},
};

use self::dbutils::DBErrorHandler;
use crate::{CONFIG, api::Result, service::Transaction};

pub(crate) mod dbutils;
mod grant;
pub mod migrations;
mod store;
mod template;

/// Read and write pools of the Postgres store.
#[derive(Clone, Debug)]
pub struct PostgresState {
    pub read_pool: PgPool,
    pub write_pool: PgPool,
}

impl PostgresState {
    #[must_use]
    pub fn from_pools(read_pool: PgPool, write_pool: PgPool) -> Self {
        Self {
            read_pool,
            write_pool,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PostgresBackend;

fn connect_options(url: Option<&str>, host: Option<&str>) -> anyhow::Result<PgConnectOptions> {
    let mut opts = match url {
        Some(url) => PgConnectOptions::from_str(url).context("Invalid Postgres connection URL")?,
        None => {
            let mut opts = PgConnectOptions::new();
            if let Some(host) = host {
                opts = opts.host(host);
            }
            if let Some(port) = CONFIG.pg_port {
                opts = opts.port(port);
            }
            if let Some(user) = CONFIG.pg_user.as_deref() {
                opts = opts.username(user);
            }
            if let Some(password) = CONFIG.pg_password.as_deref() {
                opts = opts.password(password);
            }
            if let Some(database) = CONFIG.pg_database.as_deref() {
                opts = opts.database(database);
            }
            opts
        }
    };
    if let Some(ssl_mode) = CONFIG.pg_ssl_mode {
        opts = opts.ssl_mode(ssl_mode.into());
    }
    Ok(opts)
}

/// Connect the read pool. Falls back to the write connection settings if no read
/// connection is configured.
pub async fn get_reader_pool(pool_opts: PgPoolOptions) -> anyhow::Result<PgPool> {
    let opts = connect_options(
        CONFIG
            .pg_database_url_read
            .as_deref()
            .or(CONFIG.pg_database_url_write.as_deref()),
        CONFIG.pg_host_r.as_deref().or(CONFIG.pg_host_w.as_deref()),
    )?;
    pool_opts
        .max_connections(CONFIG.pg_read_pool_connections)
        .connect_with(opts)
        .await
        .context("Failed to connect read pool")
}

pub async fn get_writer_pool(pool_opts: PgPoolOptions) -> anyhow::Result<PgPool> {
    let opts = connect_options(
        CONFIG.pg_database_url_write.as_deref(),
        CONFIG.pg_host_w.as_deref(),
    )?;
    pool_opts
        .max_connections(CONFIG.pg_write_pool_connections)
        .connect_with(opts)
        .await
        .context("Failed to connect write pool")
}

#[derive(Debug)]
pub struct PostgresTransaction {
    transaction: sqlx::Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl Transaction<PostgresState> for PostgresTransaction {
    type Transaction<'a> = &'a mut sqlx::Transaction<'static, Postgres>;

    async fn begin_write(db_state: PostgresState) -> Result<Self> {
        let transaction = db_state
            .write_pool
            .begin()
            .await
            .map_err(|e| e.into_error_model("Error starting transaction"))?;
        Ok(Self { transaction })
    }

    async fn begin_read(db_state: PostgresState) -> Result<Self> {
        let transaction = db_state
            .read_pool
            .begin()
            .await
            .map_err(|e| e.into_error_model("Error starting transaction"))?;
        Ok(Self { transaction })
    }

    async fn commit(self) -> Result<()> {
        self.transaction
            .commit()
            .await
            .map_err(|e| e.into_error_model("Error committing transaction"))
    }

    async fn rollback(self) -> Result<()> {
        self.transaction
            .rollback()
            .await
            .map_err(|e| e.into_error_model("Error rolling back transaction"))
    }

    fn transaction(&mut self) -> Self::Transaction<'_> {
        &mut self.transaction
    }
}
