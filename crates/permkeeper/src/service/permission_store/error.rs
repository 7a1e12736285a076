use std::{
    error::Error as StdError,
    fmt::{Display, Formatter},
};

use http::StatusCode;

use crate::api::{ErrorModel, error_chain_fmt};

macro_rules! impl_error_stack_methods {
    ($error_type:ty) => {
        impl $error_type {
            #[must_use]
            pub fn append_details(mut self, details: impl IntoIterator<Item = String>) -> Self {
                self.stack.extend(details);
                self
            }

            #[must_use]
            pub fn append_detail(mut self, detail: impl Into<String>) -> Self {
                self.stack.push(detail.into());
                self
            }

            pub fn append_detail_mut(&mut self, detail: impl Into<String>) {
                self.stack.push(detail.into());
            }
        }
    };
}

macro_rules! impl_from_with_detail {
    ($from_type:ty => $to_type:ident::$variant:ident, $detail:expr) => {
        impl From<$from_type> for $to_type {
            fn from(err: $from_type) -> Self {
                $to_type::$variant(err.append_detail($detail))
            }
        }
    };
}

/// Defines an error enum whose variants are all transparent wrappers.
///
/// Generates `From<Variant>` for each variant (appending `stack_message` to the
/// variant's stack) and `From<Enum> for ErrorModel`.
macro_rules! define_transparent_error {
    (
        $(#[$meta:meta])*
        $vis:vis enum $error_name:ident,
        stack_message: $stack_msg:expr,
        variants: [
            $($variant:ident),* $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(thiserror::Error, Debug)]
        $vis enum $error_name {
            $(
                #[error(transparent)]
                $variant($variant),
            )*
        }

        pastey::paste! {
            const [<$error_name:snake:upper _STACK>]: &str = $stack_msg;

            $(
                impl_from_with_detail!($variant => $error_name::$variant, [<$error_name:snake:upper _STACK>]);
            )*

            impl $error_name {
                #[must_use]
                pub fn append_detail(mut self, detail: impl Into<String>) -> Self {
                    match &mut self {
                        $(
                            $error_name::$variant(e) => {
                                e.append_detail_mut(detail);
                            }
                        )*
                    }
                    self
                }

                pub fn append_detail_mut(&mut self, detail: impl Into<String>) -> &mut Self {
                    match self {
                        $(
                            $error_name::$variant(e) => {
                                e.append_detail_mut(detail);
                            }
                        )*
                    }
                    self
                }
            }

            impl From<$error_name> for ErrorModel {
                fn from(err: $error_name) -> Self {
                    match err {
                        $(
                            $error_name::$variant(e) => e.into(),
                        )*
                    }
                }
            }
        }
    };
}

pub(crate) use define_transparent_error;
pub(crate) use impl_error_stack_methods;
pub(crate) use impl_from_with_detail;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum StoreBackendErrorType {
    Unexpected,
    ConcurrentModification,
}

/// Failure of the persistent grant or template store.
#[derive(Debug)]
pub struct StoreBackendError {
    pub r#type: StoreBackendErrorType,
    pub stack: Vec<String>,
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl_error_stack_methods!(StoreBackendError);

impl StoreBackendError {
    pub fn new<E>(source: E, r#type: impl Into<StoreBackendErrorType>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            r#type: r#type.into(),
            stack: Vec::new(),
            source: Box::new(source),
        }
    }

    pub fn new_unexpected<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::new(source, StoreBackendErrorType::Unexpected)
    }
}

impl StdError for StoreBackendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.source as &(dyn StdError + 'static))
    }
}

impl Display for StoreBackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "StoreBackendError ({}): {}", self.r#type, self.source)?;

        if !self.stack.is_empty() {
            writeln!(f, "Stack:")?;
            for detail in &self.stack {
                writeln!(f, "  {detail}")?;
            }
        }

        if let Some(source) = self.source.source() {
            writeln!(f, "Caused by:")?;
            error_chain_fmt(source, f)?;
        }

        Ok(())
    }
}

impl From<StoreBackendError> for ErrorModel {
    fn from(err: StoreBackendError) -> Self {
        let StoreBackendError {
            r#type,
            stack,
            source,
        } = err;

        let code = match r#type {
            StoreBackendErrorType::Unexpected => StatusCode::SERVICE_UNAVAILABLE,
            StoreBackendErrorType::ConcurrentModification => StatusCode::CONFLICT,
        }
        .as_u16();

        ErrorModel::builder()
            .r#type("StoreBackendError")
            .code(code)
            .message(format!("Permission store error ({type}): {source}"))
            .stack(stack)
            .build()
    }
}

/// A row read from the store violates an invariant the schema should guarantee.
#[derive(Debug)]
pub struct DatabaseIntegrityError {
    pub message: String,
    pub stack: Vec<String>,
}

impl_error_stack_methods!(DatabaseIntegrityError);

impl DatabaseIntegrityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: Vec::new(),
        }
    }
}

impl StdError for DatabaseIntegrityError {}

impl Display for DatabaseIntegrityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DatabaseIntegrityError: {}", self.message)
    }
}

impl From<DatabaseIntegrityError> for StoreBackendError {
    fn from(err: DatabaseIntegrityError) -> Self {
        let stack = err.stack.clone();
        StoreBackendError::new_unexpected(err).append_details(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrent_modification_maps_to_conflict() {
        let err = StoreBackendError::new(
            std::io::Error::other("could not serialize access"),
            StoreBackendErrorType::ConcurrentModification,
        )
        .append_detail("Database Transaction failed.");

        let model = ErrorModel::from(err);
        assert_eq!(model.code, StatusCode::CONFLICT.as_u16());
        assert_eq!(model.r#type, "StoreBackendError");
        assert_eq!(model.stack, vec!["Database Transaction failed.".to_string()]);
    }

    #[test]
    fn test_integrity_error_keeps_stack() {
        let err = StoreBackendError::from(
            DatabaseIntegrityError::new("template row without name").append_detail("row 7"),
        );
        assert_eq!(err.r#type, StoreBackendErrorType::Unexpected);
        assert_eq!(err.stack, vec!["row 7".to_string()]);
        assert!(err.to_string().contains("template row without name"));
    }
}
