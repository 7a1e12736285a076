use std::sync::Arc;

use serde::Serialize;

use super::{DefaultTemplateMissing, ResolveDefaultTemplatesError};
use crate::service::{
    DefaultTemplates, OrganizationId, PermissionStore, ResourceKind, TemplateId, Transaction,
    resource_kinds::ResourceKindRegistry,
};

/// Effective default templates of an organization.
///
/// `portfolio` and `application` are `None` if the resource kind is not enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedDefaultTemplates {
    pub project: TemplateId,
    pub portfolio: Option<TemplateId>,
    pub application: Option<TemplateId>,
}

impl ResolvedDefaultTemplates {
    #[must_use]
    pub fn for_kind(&self, kind: ResourceKind) -> Option<TemplateId> {
        match kind {
            ResourceKind::Project => Some(self.project),
            ResourceKind::Portfolio => self.portfolio,
            ResourceKind::Application => self.application,
        }
    }

    /// Resolve stored defaults. Enabled kinds without an explicit default fall back
    /// to the project default.
    pub fn resolve(
        stored: &DefaultTemplates,
        resource_kinds: &dyn ResourceKindRegistry,
    ) -> Result<Self, DefaultTemplateMissing> {
        let project = stored
            .project
            .ok_or_else(|| DefaultTemplateMissing::new(ResourceKind::Project))?;
        let fallback = |kind: ResourceKind, configured: Option<TemplateId>| {
            resource_kinds
                .is_enabled(kind)
                .then(|| configured.unwrap_or(project))
        };

        Ok(Self {
            project,
            portfolio: fallback(ResourceKind::Portfolio, stored.portfolio),
            application: fallback(ResourceKind::Application, stored.application),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DefaultTemplateResolver {
    resource_kinds: Arc<dyn ResourceKindRegistry>,
}

impl DefaultTemplateResolver {
    #[must_use]
    pub fn new(resource_kinds: Arc<dyn ResourceKindRegistry>) -> Self {
        Self { resource_kinds }
    }

    pub async fn resolve<C: PermissionStore>(
        &self,
        organization_id: OrganizationId,
        transaction: &mut C::Transaction,
    ) -> Result<ResolvedDefaultTemplates, ResolveDefaultTemplatesError> {
        let stored = C::select_default_templates(organization_id, transaction.transaction())
            .await?
            .ok_or_else(|| DefaultTemplateMissing::new(ResourceKind::Project))?;

        Ok(ResolvedDefaultTemplates::resolve(
            &stored,
            self.resource_kinds.as_ref(),
        )?)
    }
}
