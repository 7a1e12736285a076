pub mod in_memory;
#[cfg(feature = "sqlx-postgres")]
pub mod postgres;
