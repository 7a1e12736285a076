use http::StatusCode;
use itertools::Itertools;

use super::{GranteeKind, PermissionScope};
use crate::{
    api::ErrorModel,
    service::{
        StoreBackendError, define_transparent_error, impl_error_stack_methods,
        impl_from_with_detail,
    },
};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error(
    "Invalid {scope} permission '{key}'. Valid values are [{}]",
    .valid.iter().join(", ")
)]
pub struct InvalidPermissionKey {
    pub scope: PermissionScope,
    pub key: String,
    pub valid: Vec<String>,
    pub stack: Vec<String>,
}
impl_error_stack_methods!(InvalidPermissionKey);

impl InvalidPermissionKey {
    #[must_use]
    pub fn new(scope: PermissionScope, key: impl Into<String>, valid: Vec<String>) -> Self {
        Self {
            scope,
            key: key.into(),
            valid,
            stack: Vec::new(),
        }
    }
}

impl From<InvalidPermissionKey> for ErrorModel {
    fn from(err: InvalidPermissionKey) -> Self {
        ErrorModel::builder()
            .r#type("InvalidPermissionKey")
            .code(StatusCode::BAD_REQUEST.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("No permission can be granted to Anyone on a private component")]
    AnyoneOnPrivateEntity,
    #[error("Permission {permission} can't be removed from a public component")]
    PublicPermissionOnPublicEntity { permission: String },
    #[error("It is not possible to add the '{permission}' permission to group 'Anyone'.")]
    AdministerToAnyone { permission: String },
    #[error("Last {grantee_kind} with permission '{permission}'. Permission cannot be removed.")]
    LastAdministrator {
        grantee_kind: GranteeKind,
        permission: String,
    },
}

impl RejectionReason {
    fn error_type(&self) -> &'static str {
        match self {
            RejectionReason::AnyoneOnPrivateEntity
            | RejectionReason::PublicPermissionOnPublicEntity { .. } => "VisibilityViolation",
            RejectionReason::AdministerToAnyone { .. } => "AnyoneCannotAdminister",
            RejectionReason::LastAdministrator { .. } => "LastAdministrator",
        }
    }
}

/// A permission change that is well-formed but violates a business rule.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("{reason}")]
pub struct PermissionChangeRejected {
    pub reason: RejectionReason,
    pub stack: Vec<String>,
}
impl_error_stack_methods!(PermissionChangeRejected);

impl PermissionChangeRejected {
    #[must_use]
    pub fn new(reason: RejectionReason) -> Self {
        Self {
            reason,
            stack: Vec::new(),
        }
    }
}

impl From<PermissionChangeRejected> for ErrorModel {
    fn from(err: PermissionChangeRejected) -> Self {
        ErrorModel::builder()
            .r#type(err.reason.error_type())
            .code(StatusCode::BAD_REQUEST.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

define_transparent_error! {
    pub enum ApplyPermissionChangeError,
    stack_message: "Error applying permission change",
    variants: [
        PermissionChangeRejected,
        StoreBackendError,
    ]
}
