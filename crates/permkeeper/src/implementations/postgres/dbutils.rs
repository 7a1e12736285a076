use crate::{
    api::ErrorModel,
    service::{StoreBackendError, StoreBackendErrorType},
};

pub(crate) trait DBErrorHandler
where
    Self: ToString + Sized + Send + Sync + std::error::Error + 'static,
{
    fn into_error_model(self, message: impl Into<String>) -> ErrorModel {
        ErrorModel::internal(message, "DatabaseError", Some(Box::new(self)))
    }

    fn into_store_backend_error(self) -> StoreBackendError;
}

fn is_transaction_failure(code: Option<&str>) -> bool {
    // https://www.postgresql.org/docs/current/errcodes-appendix.html
    matches!(
        code,
        Some(
            "2D000" | "25000" | "25001" | "25P01" | "25P02" | "25P03" | "40000" | "40001"
                | "40002" | "40003" | "40004"
        )
    )
}

impl DBErrorHandler for sqlx::Error {
    fn into_error_model(self, message: impl Into<String>) -> ErrorModel {
        match self {
            Self::Database(ref db) if is_transaction_failure(db.code().as_deref()) => {
                ErrorModel::conflict(
                    "Concurrent modification failed.",
                    "TransactionFailed",
                    Some(Box::new(self)),
                )
            }
            _ => ErrorModel::internal(message, "DatabaseError", Some(Box::new(self))),
        }
    }

    fn into_store_backend_error(self) -> StoreBackendError {
        match self {
            Self::Database(ref db) if is_transaction_failure(db.code().as_deref()) => {
                StoreBackendError::new(self, StoreBackendErrorType::ConcurrentModification)
                    .append_detail("Database Transaction failed.")
            }
            _ => StoreBackendError::new_unexpected(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_unexpected() {
        let err = sqlx::Error::RowNotFound.into_store_backend_error();
        assert_eq!(err.r#type, StoreBackendErrorType::Unexpected);
        assert_eq!(
            sqlx::Error::PoolTimedOut
                .into_error_model("Error starting transaction")
                .code,
            500
        );
    }

    #[test]
    fn test_serialization_failures_are_transaction_failures() {
        assert!(is_transaction_failure(Some("40001")));
        assert!(is_transaction_failure(Some("25P02")));
        assert!(!is_transaction_failure(Some("23505")));
        assert!(!is_transaction_failure(None));
    }
}
