//! Single permission changes for users and groups.
//!
//! A [`PermissionChange`] is validated against the [`PermissionCatalog`] when it is
//! built. [`PermissionChangeApplier`] decides whether it is legal, already in effect,
//! or must be written, and [`PermissionUpdater`] applies batches of changes and
//! notifies listeners afterwards.
mod applier;
mod catalog;
mod change;
mod error;
mod updater;

pub use applier::{
    GranteeStrategy, GroupPermissionApplier, GroupStrategy, PermissionChangeApplier,
    UserPermissionApplier, UserStrategy,
};
pub use catalog::{
    GlobalPermission, PERMISSION_CATALOG, PUBLIC_PERMISSIONS, PermissionCatalog,
    ProjectPermission, is_public_permission,
};
pub use change::{
    Grantee, GranteeKind, GranteeRef, GroupGrantee, GroupPermissionChange, Operation,
    PermissionChange, PermissionScope, RoutedPermissionChange, UserPermissionChange,
};
pub use error::{
    ApplyPermissionChangeError, InvalidPermissionKey, PermissionChangeRejected, RejectionReason,
};
pub use updater::{ChangeSummary, PermissionUpdater};
