#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![forbid(unsafe_code)]
mod config;
pub mod service;
pub use config::{CONFIG, DynAppConfig, EnabledResourceKinds, PgSslMode};

pub mod implementations;

pub mod api;

pub use async_trait;
#[cfg(feature = "sqlx")]
pub use sqlx;
pub use tokio;
pub use tracing;
