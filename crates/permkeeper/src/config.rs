use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use veil::Redact;

pub static CONFIG: LazyLock<DynAppConfig> = LazyLock::new(get_config);

#[derive(Clone, Deserialize, Serialize, PartialEq, Redact)]
pub struct DynAppConfig {
    /// Resource kinds besides projects that are enabled for this installation.
    /// Enabling a kind adds its creator permission to the global catalog and
    /// makes its default template resolvable.
    #[serde(default)]
    pub enabled_resource_kinds: EnabledResourceKinds,

    // ------------- POSTGRES -------------
    #[redact]
    pub pg_database_url_read: Option<String>,
    #[redact]
    pub pg_database_url_write: Option<String>,
    pub pg_host_r: Option<String>,
    pub pg_host_w: Option<String>,
    pub pg_port: Option<u16>,
    pub pg_user: Option<String>,
    #[redact]
    pub pg_password: Option<String>,
    pub pg_database: Option<String>,
    pub pg_ssl_mode: Option<PgSslMode>,
    pub pg_read_pool_connections: u32,
    pub pg_write_pool_connections: u32,
    /// Seconds to wait for a connection from the pool.
    pub pg_acquire_timeout: u64,
}

impl Default for DynAppConfig {
    fn default() -> Self {
        Self {
            enabled_resource_kinds: EnabledResourceKinds::default(),
            pg_database_url_read: None,
            pg_database_url_write: None,
            pg_host_r: None,
            pg_host_w: None,
            pg_port: None,
            pg_user: None,
            pg_password: None,
            pg_database: None,
            pg_ssl_mode: None,
            pg_read_pool_connections: 10,
            pg_write_pool_connections: 5,
            pg_acquire_timeout: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct EnabledResourceKinds {
    #[serde(default)]
    pub portfolio: bool,
    #[serde(default)]
    pub application: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PgSslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

#[cfg(feature = "sqlx-postgres")]
impl From<PgSslMode> for sqlx::postgres::PgSslMode {
    fn from(value: PgSslMode) -> Self {
        match value {
            PgSslMode::Disable => sqlx::postgres::PgSslMode::Disable,
            PgSslMode::Allow => sqlx::postgres::PgSslMode::Allow,
            PgSslMode::Prefer => sqlx::postgres::PgSslMode::Prefer,
            PgSslMode::Require => sqlx::postgres::PgSslMode::Require,
            PgSslMode::VerifyCa => sqlx::postgres::PgSslMode::VerifyCa,
            PgSslMode::VerifyFull => sqlx::postgres::PgSslMode::VerifyFull,
        }
    }
}

#[cfg(feature = "sqlx-postgres")]
impl DynAppConfig {
    #[must_use]
    pub fn to_pool_opts(&self) -> sqlx::postgres::PgPoolOptions {
        sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_secs(self.pg_acquire_timeout))
    }
}

fn get_config() -> DynAppConfig {
    let defaults = figment::providers::Serialized::defaults(DynAppConfig::default());

    #[cfg(not(test))]
    let prefixes = &["PERMKEEPER__"];
    #[cfg(test)]
    let prefixes = &["PERMKEEPER_TEST__"];

    let mut config = figment::Figment::from(defaults);
    for prefix in prefixes {
        let env = figment::providers::Env::prefixed(prefix).split("__");
        config = config.merge(env);
    }

    match config.extract::<DynAppConfig>() {
        Ok(c) => c,
        Err(e) => {
            panic!("Failed to extract permkeeper config: {e}");
        }
    }
}
