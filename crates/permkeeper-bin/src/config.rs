use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

pub(crate) static CONFIG_BIN: LazyLock<DynAppConfig> = LazyLock::new(get_config);

#[derive(Clone, Deserialize, Serialize, Debug, Default)]
pub(crate) struct DynAppConfig {
    pub(crate) debug: DebugConfig,
}

#[derive(Clone, Deserialize, Serialize, Debug, Default)]
pub(crate) struct DebugConfig {
    /// Migrate the database before running a command that needs it.
    /// Not recommended in production if multiple instances share a database.
    pub(crate) migrate_before_run: bool,
    /// Include file and line number in log output.
    pub(crate) extended_logs: bool,
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
            panic!("Failed to extract permkeeper binary config: {e}");
        }
    }
}
