use std::{
    fmt::{Debug, Display},
    sync::Arc,
};

use futures::TryFutureExt;

use super::types::PermissionsChangedEvent;

/// Invoked after permission changes were committed.
///
/// Listener failures are logged by the [`ChangeNotifier`] and never fail the
/// operation that triggered them. Longer running work should be deferred to a
/// background task.
#[async_trait::async_trait]
pub trait PermissionChangeListener: Send + Sync + Debug + Display {
    async fn permissions_changed(&self, event: PermissionsChangedEvent) -> anyhow::Result<()>;
}

/// Collection of listeners notified after successful permission changes.
#[derive(Clone, Default)]
pub struct ChangeNotifier(pub(crate) Vec<Arc<dyn PermissionChangeListener>>);

impl Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Listeners").field(&self.0.len()).finish()
    }
}

impl Display for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChangeNotifier with [")?;
        for (idx, listener) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{listener}")?;
        }
        write!(f, "]")
    }
}

impl ChangeNotifier {
    #[must_use]
    pub fn new(listeners: Vec<Arc<dyn PermissionChangeListener>>) -> Self {
        Self(listeners)
    }

    pub fn append(&mut self, listener: Arc<dyn PermissionChangeListener>) -> &mut Self {
        self.0.push(listener);
        self
    }

    /// Fan the event out to all listeners. Empty events are not dispatched.
    pub async fn permissions_changed(&self, event: PermissionsChangedEvent) {
        if event.is_empty() {
            return;
        }

        futures::future::join_all(self.0.iter().map(|listener| {
            listener
                .permissions_changed(event.clone())
                .map_err(|e| {
                    tracing::warn!(
                        "Listener '{}' encountered error on permissions_changed: {e:?}",
                        listener.to_string(),
                    );
                })
        }))
        .await;
    }
}
