use std::{collections::HashSet, fmt::Debug, marker::PhantomData};

use super::{
    ApplyPermissionChangeError, GlobalPermission, GranteeKind, GranteeRef, GroupGrantee,
    Operation, PermissionChange, PermissionChangeRejected, RejectionReason, is_public_permission,
};
use crate::service::{
    EntityId, Grant, PermissionStore, StoreBackendError, Transaction, UserId,
};

/// Grantee-type specific half of the change algorithm.
///
/// The provided store methods translate the typed grantee into a [`Grant`]. Implementors
/// only need to supply the types and the guard applied before a grant is written.
#[async_trait::async_trait]
pub trait GranteeStrategy: Debug + Send + Sync + 'static {
    type Grantee: GranteeRef;

    const KIND: GranteeKind;

    /// Grantee-specific guard, evaluated after the idempotence check of a grant.
    fn check_grant(
        _change: &PermissionChange<Self::Grantee>,
    ) -> Result<(), PermissionChangeRejected> {
        Ok(())
    }

    async fn load_existing<C: PermissionStore>(
        grantee: Self::Grantee,
        entity_id: Option<EntityId>,
        transaction: &mut C::Transaction,
    ) -> Result<HashSet<String>, StoreBackendError> {
        let permissions = match entity_id {
            Some(entity_id) => {
                C::select_entity_grants(grantee.into(), entity_id, transaction.transaction())
                    .await?
            }
            None => C::select_global_grants(grantee.into(), transaction.transaction()).await?,
        };
        Ok(permissions.into_iter().collect())
    }

    async fn insert_row<C: PermissionStore>(
        change: &PermissionChange<Self::Grantee>,
        transaction: &mut C::Transaction,
    ) -> Result<(), StoreBackendError> {
        C::insert_grant(&grant_of(change), transaction.transaction()).await
    }

    async fn delete_row<C: PermissionStore>(
        change: &PermissionChange<Self::Grantee>,
        transaction: &mut C::Transaction,
    ) -> Result<(), StoreBackendError> {
        C::delete_grant(&grant_of(change), transaction.transaction()).await
    }
}

fn grant_of<G: GranteeRef>(change: &PermissionChange<G>) -> Grant {
    Grant {
        grantee: change.grantee().into(),
        permission: change.permission().to_string(),
        entity_id: change.entity_id(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UserStrategy;

impl GranteeStrategy for UserStrategy {
    type Grantee = UserId;

    const KIND: GranteeKind = GranteeKind::User;
}

#[derive(Debug, Clone, Copy)]
pub struct GroupStrategy;

impl GranteeStrategy for GroupStrategy {
    type Grantee = GroupGrantee;

    const KIND: GranteeKind = GranteeKind::Group;

    fn check_grant(
        change: &PermissionChange<GroupGrantee>,
    ) -> Result<(), PermissionChangeRejected> {
        if change.grantee().is_anyone() && change.permission() == GlobalPermission::Admin.as_ref()
        {
            return Err(PermissionChangeRejected::new(
                RejectionReason::AdministerToAnyone {
                    permission: change.permission().to_string(),
                },
            ));
        }
        Ok(())
    }
}

/// Applies single permission changes for one grantee type.
#[derive(Debug, Clone, Copy)]
pub struct PermissionChangeApplier<S> {
    _strategy: PhantomData<S>,
}

pub type UserPermissionApplier = PermissionChangeApplier<UserStrategy>;
pub type GroupPermissionApplier = PermissionChangeApplier<GroupStrategy>;

impl<S> Default for PermissionChangeApplier<S> {
    fn default() -> Self {
        Self {
            _strategy: PhantomData,
        }
    }
}

impl<S: GranteeStrategy> PermissionChangeApplier<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Permissions the grantee of `change` currently holds at the change's scope.
    pub async fn load_existing<C: PermissionStore>(
        &self,
        change: &PermissionChange<S::Grantee>,
        transaction: &mut C::Transaction,
    ) -> Result<HashSet<String>, StoreBackendError> {
        S::load_existing::<C>(change.grantee(), change.entity_id(), transaction)
            .await
            .map_err(|e| {
                e.append_detail(format!(
                    "Failed to load existing permissions of {}",
                    change.grantee()
                ))
            })
    }

    /// Apply `change` given the grantee's `existing` permissions.
    ///
    /// Returns `true` if a grant was written or deleted, `false` if the change was
    /// already in effect.
    pub async fn apply<C: PermissionStore>(
        &self,
        existing: &HashSet<String>,
        change: &PermissionChange<S::Grantee>,
        transaction: &mut C::Transaction,
    ) -> Result<bool, ApplyPermissionChangeError> {
        ensure_consistency_with_visibility(change)?;
        if is_implicitly_already_done(change) {
            tracing::debug!(
                permission = change.permission(),
                grantee = %change.grantee(),
                operation = %change.operation(),
                "Permission change is implied by entity visibility"
            );
            return Ok(false);
        }

        match change.operation() {
            Operation::Grant => self.grant::<C>(existing, change, transaction).await,
            Operation::Revoke => self.revoke::<C>(existing, change, transaction).await,
        }
    }

    /// Load the grantee's permissions and apply `change` in one go.
    pub async fn load_and_apply<C: PermissionStore>(
        &self,
        change: &PermissionChange<S::Grantee>,
        transaction: &mut C::Transaction,
    ) -> Result<bool, ApplyPermissionChangeError> {
        let existing = self.load_existing::<C>(change, transaction).await?;
        self.apply::<C>(&existing, change, transaction).await
    }

    async fn grant<C: PermissionStore>(
        &self,
        existing: &HashSet<String>,
        change: &PermissionChange<S::Grantee>,
        transaction: &mut C::Transaction,
    ) -> Result<bool, ApplyPermissionChangeError> {
        if existing.contains(change.permission()) {
            return Ok(false);
        }
        S::check_grant(change)?;
        S::insert_row::<C>(change, transaction).await?;
        Ok(true)
    }

    async fn revoke<C: PermissionStore>(
        &self,
        existing: &HashSet<String>,
        change: &PermissionChange<S::Grantee>,
        transaction: &mut C::Transaction,
    ) -> Result<bool, ApplyPermissionChangeError> {
        if !existing.contains(change.permission()) {
            return Ok(false);
        }

        if change.entity().is_none() && change.permission() == GlobalPermission::Admin.as_ref() {
            let remaining = C::count_users_with_global_permission_excluding(
                change.permission(),
                change.grantee().into(),
                transaction.transaction(),
            )
            .await?;
            if remaining == 0 {
                return Err(PermissionChangeRejected::new(RejectionReason::LastAdministrator {
                    grantee_kind: S::KIND,
                    permission: change.permission().to_string(),
                })
                .into());
            }
        }

        S::delete_row::<C>(change, transaction).await?;
        Ok(true)
    }
}

fn ensure_consistency_with_visibility<G: GranteeRef>(
    change: &PermissionChange<G>,
) -> Result<(), PermissionChangeRejected> {
    let Some(entity) = change.entity() else {
        return Ok(());
    };

    match change.operation() {
        Operation::Grant if entity.is_private && change.grantee().is_anyone() => Err(
            PermissionChangeRejected::new(RejectionReason::AnyoneOnPrivateEntity),
        ),
        Operation::Revoke if entity.is_public() && is_public_permission(change.permission()) => {
            Err(PermissionChangeRejected::new(
                RejectionReason::PublicPermissionOnPublicEntity {
                    permission: change.permission().to_string(),
                },
            ))
        }
        _ => Ok(()),
    }
}

fn is_implicitly_already_done<G: GranteeRef>(change: &PermissionChange<G>) -> bool {
    let Some(entity) = change.entity() else {
        return false;
    };

    match change.operation() {
        Operation::Grant => entity.is_public() && is_public_permission(change.permission()),
        Operation::Revoke => entity.is_private && change.grantee().is_anyone(),
    }
}
