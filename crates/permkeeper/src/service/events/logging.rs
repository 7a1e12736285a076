use std::fmt::Display;

use itertools::Itertools;

use super::{ChangeCause, PermissionChangeListener, PermissionsChangedEvent};

/// Logs every committed permission change.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl Display for LoggingListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LoggingListener")
    }
}

#[async_trait::async_trait]
impl PermissionChangeListener for LoggingListener {
    async fn permissions_changed(&self, event: PermissionsChangedEvent) -> anyhow::Result<()> {
        let entities = event.entity_ids.iter().join(",");
        match &event.cause {
            ChangeCause::PermissionChange => tracing::info!(
                event_source = "permissions",
                global = event.global,
                entities = %entities,
                "Permissions changed"
            ),
            ChangeCause::TemplateApplied { template_id } => tracing::info!(
                event_source = "permissions",
                %template_id,
                entities = %entities,
                "Permission template applied"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::service::{EntityId, TemplateId};

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_logs_template_application() {
        let entity_id = EntityId::new_random();
        LoggingListener
            .permissions_changed(PermissionsChangedEvent {
                entity_ids: Arc::new(vec![entity_id]),
                global: false,
                cause: ChangeCause::TemplateApplied {
                    template_id: TemplateId::new_random(),
                },
            })
            .await
            .unwrap();

        assert!(logs_contain("Permission template applied"));
        assert!(logs_contain(&entity_id.to_string()));
    }
}
