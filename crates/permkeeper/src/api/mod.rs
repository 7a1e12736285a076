mod error;

pub(crate) use error::error_chain_fmt;
pub use error::ErrorModel;

pub type Result<T, E = ErrorModel> = std::result::Result<T, E>;
