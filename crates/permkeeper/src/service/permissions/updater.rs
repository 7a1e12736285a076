use std::sync::Arc;

use serde::Serialize;

use super::{
    ApplyPermissionChangeError, GroupPermissionApplier, PermissionChange,
    RoutedPermissionChange, UserPermissionApplier,
};
use crate::{
    api::Result,
    service::{
        EntityId, PermissionStore, Transaction,
        events::{ChangeCause, ChangeNotifier, PermissionsChangedEvent},
    },
};

/// Outcome of a batch of permission changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    /// Number of changes that wrote or deleted a grant.
    pub applied: usize,
    /// Number of changes that were already in effect.
    pub unchanged: usize,
    pub global_changed: bool,
    /// Entities with at least one changed grant, in order of first change.
    pub changed_entities: Vec<EntityId>,
}

impl ChangeSummary {
    fn record(&mut self, changed: bool, entity_id: Option<EntityId>) {
        if !changed {
            self.unchanged += 1;
            return;
        }
        self.applied += 1;
        match entity_id {
            Some(id) if !self.changed_entities.contains(&id) => self.changed_entities.push(id),
            Some(_) => {}
            None => self.global_changed = true,
        }
    }
}

/// Routes change requests to the applier of their grantee type and notifies
/// listeners about what actually changed.
#[derive(Debug, Clone, Default)]
pub struct PermissionUpdater {
    users: UserPermissionApplier,
    groups: GroupPermissionApplier,
    notifier: ChangeNotifier,
}

impl PermissionUpdater {
    #[must_use]
    pub fn new(notifier: ChangeNotifier) -> Self {
        Self {
            users: UserPermissionApplier::new(),
            groups: GroupPermissionApplier::new(),
            notifier,
        }
    }

    /// Apply all changes inside `transaction` in order. Stops at the first error.
    /// Does not commit.
    pub async fn apply<C: PermissionStore>(
        &self,
        changes: Vec<PermissionChange>,
        transaction: &mut C::Transaction,
    ) -> Result<ChangeSummary, ApplyPermissionChangeError> {
        let mut summary = ChangeSummary::default();
        for change in changes {
            let (changed, entity_id) = match change.route() {
                RoutedPermissionChange::User(change) => (
                    self.users.load_and_apply::<C>(&change, transaction).await?,
                    change.entity_id(),
                ),
                RoutedPermissionChange::Group(change) => (
                    self.groups.load_and_apply::<C>(&change, transaction).await?,
                    change.entity_id(),
                ),
            };
            summary.record(changed, entity_id);
        }
        Ok(summary)
    }

    /// Apply all changes in a new write transaction, commit, and notify listeners.
    /// Nothing is written if any change fails.
    #[tracing::instrument(skip_all, fields(changes = changes.len()))]
    pub async fn apply_and_commit<C: PermissionStore>(
        &self,
        state: C::State,
        changes: Vec<PermissionChange>,
    ) -> Result<ChangeSummary> {
        let mut t = C::Transaction::begin_write(state).await?;
        let summary = match self.apply::<C>(changes, &mut t).await {
            Ok(summary) => summary,
            Err(e) => {
                t.rollback().await?;
                return Err(e.into());
            }
        };
        t.commit().await?;

        tracing::info!(
            applied = summary.applied,
            unchanged = summary.unchanged,
            "Committed permission changes"
        );
        self.notifier
            .permissions_changed(PermissionsChangedEvent {
                entity_ids: Arc::new(summary.changed_entities.clone()),
                global: summary.global_changed,
                cause: ChangeCause::PermissionChange,
            })
            .await;

        Ok(summary)
    }
}
