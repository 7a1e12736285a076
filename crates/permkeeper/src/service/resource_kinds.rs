use std::fmt::Debug;

use crate::{config::EnabledResourceKinds, service::ResourceKind};

/// Knows which resource kinds are installed.
pub trait ResourceKindRegistry: Debug + Send + Sync {
    fn is_enabled(&self, kind: ResourceKind) -> bool;
}

impl ResourceKindRegistry for EnabledResourceKinds {
    fn is_enabled(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Project => true,
            ResourceKind::Portfolio => self.portfolio,
            ResourceKind::Application => self.application,
        }
    }
}
