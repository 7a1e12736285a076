use std::{collections::HashSet, sync::Arc};

use regex::Regex;
use serde::Serialize;

use super::{
    AmbiguousTemplateMatch, DefaultTemplateMissing, DefaultTemplateNotFound,
    DefaultTemplateResolver, InvalidTemplateKeyPattern, PermissionTemplateError,
    TemplateNotFound,
};
use crate::{
    api::Result,
    service::{
        Entity, EntityId, GlobalPermission, Grant, Grantee, GroupGrantee, GroupId,
        OrganizationId, PermissionStore, PermissionTemplate, ProjectPermission, ResourceKind,
        TemplateId, Transaction, UserId,
        events::{ChangeCause, ChangeNotifier, PermissionsChangedEvent},
        is_public_permission,
        resource_kinds::ResourceKindRegistry,
    },
};

/// A grant written while applying a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedGrant {
    pub grantee: Grantee,
    /// Login or group name stored on the template row. `None` for creator grants.
    pub grantee_name: Option<String>,
    pub permission: String,
}

/// Report of a template application to a single entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedTemplate {
    pub template_id: TemplateId,
    pub template_name: String,
    pub entity_id: EntityId,
    pub grants: Vec<AppliedGrant>,
}

/// Finds the template governing an entity and copies its grants onto entities.
#[derive(Debug, Clone)]
pub struct PermissionTemplateService {
    resolver: DefaultTemplateResolver,
    notifier: ChangeNotifier,
}

impl PermissionTemplateService {
    #[must_use]
    pub fn new(resource_kinds: Arc<dyn ResourceKindRegistry>, notifier: ChangeNotifier) -> Self {
        Self {
            resolver: DefaultTemplateResolver::new(resource_kinds),
            notifier,
        }
    }

    /// Template whose key pattern matches the entity key, else the organization's
    /// default for the entity kind.
    ///
    /// Returns `Ok(None)` only if the default template id points to a template that
    /// does not exist.
    pub async fn find_template<C: PermissionStore>(
        &self,
        entity: &Entity,
        transaction: &mut C::Transaction,
    ) -> Result<Option<PermissionTemplate>, PermissionTemplateError> {
        let lookup = self
            .lookup::<C>(entity.organization_id, &entity.key, entity.kind, transaction)
            .await?;
        Ok(lookup.found())
    }

    /// Like [`Self::find_template`], but a dangling default is an error.
    pub async fn resolve_template<C: PermissionStore>(
        &self,
        entity: &Entity,
        transaction: &mut C::Transaction,
    ) -> Result<PermissionTemplate, PermissionTemplateError> {
        match self
            .lookup::<C>(entity.organization_id, &entity.key, entity.kind, transaction)
            .await?
        {
            TemplateLookup::Matched(template) | TemplateLookup::Default(template) => Ok(template),
            TemplateLookup::DanglingDefault(id) => Err(DefaultTemplateNotFound::new(id).into()),
        }
    }

    async fn lookup<C: PermissionStore>(
        &self,
        organization_id: OrganizationId,
        key: &str,
        kind: ResourceKind,
        transaction: &mut C::Transaction,
    ) -> Result<TemplateLookup, PermissionTemplateError> {
        let templates =
            C::select_templates_for_organization(organization_id, transaction.transaction())
                .await?;

        let mut matching = Vec::new();
        for template in templates {
            if key_pattern_matches(&template, key)? {
                matching.push(template);
            }
        }
        if matching.len() > 1 {
            return Err(AmbiguousTemplateMatch::new(
                key,
                matching.into_iter().map(|t| t.name).collect(),
            )
            .into());
        }
        if let Some(template) = matching.pop() {
            tracing::debug!(template = %template.name, key, "Template selected by key pattern");
            return Ok(TemplateLookup::Matched(template));
        }

        let defaults = self.resolver.resolve::<C>(organization_id, transaction).await?;
        let default_id = defaults
            .for_kind(kind)
            .ok_or_else(|| DefaultTemplateMissing::new(kind))?;
        Ok(
            match C::select_template_by_id(default_id, transaction.transaction()).await? {
                Some(template) => TemplateLookup::Default(template),
                None => TemplateLookup::DanglingDefault(default_id),
            },
        )
    }

    /// Copy the grants of `template` onto `entity`. Does not remove existing grants
    /// and does not commit.
    #[tracing::instrument(skip_all, fields(template = %template.name, entity = %entity.key))]
    pub async fn apply_template<C: PermissionStore>(
        &self,
        template: &PermissionTemplate,
        entity: &Entity,
        creator: Option<UserId>,
        transaction: &mut C::Transaction,
    ) -> Result<AppliedTemplate, PermissionTemplateError> {
        let user_rows =
            C::select_template_user_rows(template.id, transaction.transaction()).await?;
        let group_rows =
            C::select_template_group_rows(template.id, transaction.transaction()).await?;

        let mut grants = Vec::new();

        for row in user_rows
            .iter()
            .filter(|row| permission_valid_for_entity(entity, &row.permission))
        {
            grants.push(AppliedGrant {
                grantee: Grantee::User(row.user_id),
                grantee_name: Some(row.user_login.clone()),
                permission: row.permission.clone(),
            });
        }

        for row in group_rows.iter().filter(|row| {
            group_valid_for_entity(entity, row.group)
                && permission_valid_for_entity(entity, &row.permission)
        }) {
            grants.push(AppliedGrant {
                grantee: row.group.into(),
                grantee_name: Some(row.group_name.clone()),
                permission: row.permission.clone(),
            });
        }

        if let Some(creator) = creator {
            let characteristics =
                C::select_template_characteristics(template.id, transaction.transaction())
                    .await?;
            let already_granted: HashSet<&str> = user_rows
                .iter()
                .filter(|row| row.user_id == creator)
                .map(|row| row.permission.as_str())
                .collect();

            for characteristic in characteristics.iter().filter(|c| {
                c.with_project_creator
                    && permission_valid_for_entity(entity, &c.permission)
                    && !already_granted.contains(c.permission.as_str())
            }) {
                grants.push(AppliedGrant {
                    grantee: Grantee::User(creator),
                    grantee_name: None,
                    permission: characteristic.permission.clone(),
                });
            }
        }

        for grant in &grants {
            C::insert_grant(
                &Grant {
                    grantee: grant.grantee,
                    permission: grant.permission.clone(),
                    entity_id: Some(entity.id),
                },
                transaction.transaction(),
            )
            .await
            .map_err(|e| {
                e.append_detail(format!(
                    "Failed to copy permission '{}' of template '{}'",
                    grant.permission, template.name
                ))
            })?;
        }

        tracing::debug!(grants = grants.len(), "Applied permission template");
        Ok(AppliedTemplate {
            template_id: template.id,
            template_name: template.name.clone(),
            entity_id: entity.id,
            grants,
        })
    }

    /// Apply the template governing a newly created entity. Does not commit.
    pub async fn apply_default<C: PermissionStore>(
        &self,
        entity: &Entity,
        creator: Option<UserId>,
        transaction: &mut C::Transaction,
    ) -> Result<AppliedTemplate, PermissionTemplateError> {
        let template = self.resolve_template::<C>(entity, transaction).await?;
        self.apply_template::<C>(&template, entity, creator, transaction)
            .await
    }

    /// [`Self::apply_default`] in its own write transaction, followed by a notification.
    pub async fn apply_default_and_commit<C: PermissionStore>(
        &self,
        state: C::State,
        entity: &Entity,
        creator: Option<UserId>,
    ) -> Result<AppliedTemplate> {
        let mut t = C::Transaction::begin_write(state).await?;
        let applied = match self.apply_default::<C>(entity, creator, &mut t).await {
            Ok(applied) => applied,
            Err(e) => {
                t.rollback().await?;
                return Err(e.into());
            }
        };
        t.commit().await?;

        self.notify_applied(applied.template_id, vec![entity.id]).await;
        Ok(applied)
    }

    /// Replace all grants of `entities` with the grants of the template `template_id`.
    /// Creator characteristics are not applied. Does not commit.
    pub async fn reapply_to_entities<C: PermissionStore>(
        &self,
        template_id: TemplateId,
        entities: &[Entity],
        transaction: &mut C::Transaction,
    ) -> Result<Vec<AppliedTemplate>, PermissionTemplateError> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let template = C::select_template_by_id(template_id, transaction.transaction())
            .await?
            .ok_or_else(|| TemplateNotFound::new(template_id))?;

        let mut applied = Vec::with_capacity(entities.len());
        for entity in entities {
            let groups = C::delete_entity_group_grants(entity.id, transaction.transaction()).await?;
            let users = C::delete_entity_user_grants(entity.id, transaction.transaction()).await?;
            tracing::debug!(
                entity = %entity.key,
                deleted_group_grants = groups,
                deleted_user_grants = users,
                "Cleared entity grants before applying template"
            );
            applied.push(
                self.apply_template::<C>(&template, entity, None, transaction)
                    .await?,
            );
        }
        Ok(applied)
    }

    /// [`Self::reapply_to_entities`] in its own write transaction. Listeners are
    /// notified once for all entities after the commit.
    #[tracing::instrument(skip(self, state, entities), fields(entities = entities.len()))]
    pub async fn reapply_and_commit<C: PermissionStore>(
        &self,
        state: C::State,
        template_id: TemplateId,
        entities: &[Entity],
    ) -> Result<Vec<AppliedTemplate>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let mut t = C::Transaction::begin_write(state).await?;
        let applied = match self
            .reapply_to_entities::<C>(template_id, entities, &mut t)
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                t.rollback().await?;
                return Err(e.into());
            }
        };
        t.commit().await?;

        tracing::info!(
            %template_id,
            entities = applied.len(),
            "Re-applied permission template"
        );
        self.notify_applied(template_id, entities.iter().map(|e| e.id).collect())
            .await;
        Ok(applied)
    }

    /// Whether the template governing `entity` grants any permission to the creator.
    /// A dangling default template counts as `false`.
    pub async fn has_default_template_with_permission_on_project_creator<C: PermissionStore>(
        &self,
        entity: &Entity,
        transaction: &mut C::Transaction,
    ) -> Result<bool, PermissionTemplateError> {
        let Some(template) = self.find_template::<C>(entity, transaction).await? else {
            return Ok(false);
        };
        let characteristics =
            C::select_template_characteristics(template.id, transaction.transaction()).await?;
        Ok(characteristics.iter().any(|c| c.with_project_creator))
    }

    /// Whether `user` would be able to scan a project with key `project_key` created by
    /// them. A user already holding the global `scan` permission always can. Otherwise the
    /// template governing the project decides. `None` is an anonymous user, who can only
    /// obtain permissions granted to Anyone.
    pub async fn would_user_have_scan_permission_with_default_template<C: PermissionStore>(
        &self,
        user: Option<UserId>,
        organization_id: OrganizationId,
        project_key: &str,
        transaction: &mut C::Transaction,
    ) -> Result<bool, PermissionTemplateError> {
        let groups: HashSet<GroupId> = match user {
            Some(user) => C::select_user_group_ids(user, transaction.transaction())
                .await?
                .into_iter()
                .collect(),
            None => HashSet::new(),
        };

        let global_scan = GlobalPermission::Scan.as_ref();
        let global_grantees = std::iter::once(Grantee::Anyone)
            .chain(user.map(Grantee::User))
            .chain(groups.iter().copied().map(Grantee::Group));
        for grantee in global_grantees {
            let global = C::select_global_grants(grantee, transaction.transaction()).await?;
            if global.iter().any(|p| p == global_scan) {
                return Ok(true);
            }
        }

        let Some(template) = self
            .lookup::<C>(organization_id, project_key, ResourceKind::Project, transaction)
            .await?
            .found()
        else {
            return Ok(false);
        };

        let scan = ProjectPermission::Scan.as_ref();
        let group_rows =
            C::select_template_group_rows(template.id, transaction.transaction()).await?;
        if group_rows
            .iter()
            .any(|row| row.group == GroupGrantee::Anyone && row.permission == scan)
        {
            return Ok(true);
        }

        let Some(user) = user else {
            return Ok(false);
        };

        let user_rows =
            C::select_template_user_rows(template.id, transaction.transaction()).await?;
        if user_rows
            .iter()
            .any(|row| row.user_id == user && row.permission == scan)
        {
            return Ok(true);
        }

        if group_rows.iter().any(|row| {
            row.permission == scan
                && matches!(row.group, GroupGrantee::Group(id) if groups.contains(&id))
        }) {
            return Ok(true);
        }

        let characteristics =
            C::select_template_characteristics(template.id, transaction.transaction()).await?;
        Ok(characteristics
            .iter()
            .any(|c| c.with_project_creator && c.permission == scan))
    }

    async fn notify_applied(&self, template_id: TemplateId, entity_ids: Vec<EntityId>) {
        self.notifier
            .permissions_changed(PermissionsChangedEvent {
                entity_ids: Arc::new(entity_ids),
                global: false,
                cause: ChangeCause::TemplateApplied { template_id },
            })
            .await;
    }
}

enum TemplateLookup {
    Matched(PermissionTemplate),
    Default(PermissionTemplate),
    DanglingDefault(TemplateId),
}

impl TemplateLookup {
    fn found(self) -> Option<PermissionTemplate> {
        match self {
            TemplateLookup::Matched(t) | TemplateLookup::Default(t) => Some(t),
            TemplateLookup::DanglingDefault(_) => None,
        }
    }
}

fn key_pattern_matches(
    template: &PermissionTemplate,
    key: &str,
) -> Result<bool, InvalidTemplateKeyPattern> {
    let Some(pattern) = template
        .key_pattern
        .as_deref()
        .filter(|p| !p.trim().is_empty())
    else {
        return Ok(false);
    };
    let regex = Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| InvalidTemplateKeyPattern::new(&template.name, pattern, e))?;
    Ok(regex.is_match(key))
}

/// Public permissions are implied on public entities and never copied onto them.
fn permission_valid_for_entity(entity: &Entity, permission: &str) -> bool {
    entity.is_private || !is_public_permission(permission)
}

fn group_valid_for_entity(entity: &Entity, group: GroupGrantee) -> bool {
    match group {
        GroupGrantee::Anyone => entity.is_public(),
        GroupGrantee::Group(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::{fmt::Display, sync::Mutex};

    use maplit::hashset;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        api::ErrorModel,
        config::EnabledResourceKinds,
        implementations::in_memory::{InMemoryBackend, InMemoryState, InMemoryTransaction},
        service::{
            DefaultTemplates, GroupId, TemplateCharacteristic, TemplateGroupPermission,
            TemplateUserPermission, events::PermissionChangeListener,
        },
    };

    #[derive(Debug, Default)]
    struct Recorder(Mutex<Vec<PermissionsChangedEvent>>);

    impl Display for Recorder {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "Recorder")
        }
    }

    #[async_trait::async_trait]
    impl PermissionChangeListener for Recorder {
        async fn permissions_changed(&self, event: PermissionsChangedEvent) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn service(kinds: EnabledResourceKinds) -> PermissionTemplateService {
        PermissionTemplateService::new(Arc::new(kinds), ChangeNotifier::default())
    }

    fn template(
        organization_id: OrganizationId,
        name: &str,
        key_pattern: Option<&str>,
    ) -> PermissionTemplate {
        PermissionTemplate {
            id: TemplateId::new_random(),
            organization_id,
            name: name.to_string(),
            description: None,
            key_pattern: key_pattern.map(ToString::to_string),
        }
    }

    fn project(organization_id: OrganizationId, key: &str, is_private: bool) -> Entity {
        Entity {
            id: EntityId::new_random(),
            organization_id,
            key: key.to_string(),
            name: key.to_string(),
            kind: ResourceKind::Project,
            is_private,
        }
    }

    fn user_row(user_id: UserId, permission: &str) -> TemplateUserPermission {
        TemplateUserPermission {
            user_id,
            user_login: format!("login-{user_id}"),
            permission: permission.to_string(),
        }
    }

    fn group_row(group: GroupGrantee, permission: &str) -> TemplateGroupPermission {
        TemplateGroupPermission {
            group,
            group_name: match group {
                GroupGrantee::Anyone => "Anyone".to_string(),
                GroupGrantee::Group(id) => format!("group-{id}"),
            },
            permission: permission.to_string(),
        }
    }

    fn creator_characteristic(permission: &str) -> TemplateCharacteristic {
        TemplateCharacteristic {
            permission: permission.to_string(),
            with_project_creator: true,
        }
    }

    fn entity_grants(state: &InMemoryState, entity_id: EntityId) -> HashSet<(Grantee, String)> {
        state
            .grants()
            .into_iter()
            .filter(|g| g.entity_id == Some(entity_id))
            .map(|g| (g.grantee, g.permission))
            .collect()
    }

    /// State with a project default template that has no rows.
    fn state_with_default(organization_id: OrganizationId) -> (InMemoryState, PermissionTemplate) {
        let state = InMemoryState::default();
        let default = template(organization_id, "Default", None);
        state.add_template(default.clone());
        state.set_default_templates(
            organization_id,
            DefaultTemplates {
                project: Some(default.id),
                ..Default::default()
            },
        );
        (state, default)
    }

    async fn find(
        state: &InMemoryState,
        service: &PermissionTemplateService,
        entity: &Entity,
    ) -> Result<Option<PermissionTemplate>, PermissionTemplateError> {
        let mut t = InMemoryTransaction::begin_read(state.clone()).await.unwrap();
        service.find_template::<InMemoryBackend>(entity, &mut t).await
    }

    #[tokio::test]
    async fn test_pattern_match_wins_over_default() {
        let org = OrganizationId::new_random();
        let (state, _) = state_with_default(org);
        let matching = template(org, "Mobile", Some("mobile\\..*"));
        state.add_template(matching.clone());
        state.add_template(template(org, "Blank", Some("  ")));
        let service = service(EnabledResourceKinds::default());

        let found = find(&state, &service, &project(org, "mobile.ios", true))
            .await
            .unwrap();
        assert_eq!(found, Some(matching));
    }

    #[tokio::test]
    async fn test_pattern_must_match_full_key() {
        let org = OrganizationId::new_random();
        let (state, default) = state_with_default(org);
        state.add_template(template(org, "Mobile", Some("mobile")));
        let service = service(EnabledResourceKinds::default());

        let found = find(&state, &service, &project(org, "mobile.ios", true))
            .await
            .unwrap();
        assert_eq!(found, Some(default));
    }

    #[tokio::test]
    async fn test_templates_of_other_organizations_are_ignored() {
        let org = OrganizationId::new_random();
        let (state, default) = state_with_default(org);
        state.add_template(template(OrganizationId::new_random(), "Other", Some(".*")));
        let service = service(EnabledResourceKinds::default());

        let found = find(&state, &service, &project(org, "anything", true))
            .await
            .unwrap();
        assert_eq!(found, Some(default));
    }

    #[tokio::test]
    async fn test_multiple_matches_are_ambiguous() {
        let org = OrganizationId::new_random();
        let (state, _) = state_with_default(org);
        state.add_template(template(org, "Zulu", Some(".*")));
        state.add_template(template(org, "alpha", Some("my-.*")));
        let service = service(EnabledResourceKinds::default());

        let err = find(&state, &service, &project(org, "my-key", true))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"The "my-key" key matches multiple permission templates: "alpha", "Zulu"."#
        );
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_an_error() {
        let org = OrganizationId::new_random();
        let (state, _) = state_with_default(org);
        state.add_template(template(org, "Broken", Some("(unclosed")));
        let service = service(EnabledResourceKinds::default());

        let err = find(&state, &service, &project(org, "key", true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PermissionTemplateError::InvalidTemplateKeyPattern(_)
        ));
        assert_eq!(ErrorModel::from(err).code, 400);
    }

    #[tokio::test]
    async fn test_missing_project_default_is_an_error() {
        let org = OrganizationId::new_random();
        let state = InMemoryState::default();
        let service = service(EnabledResourceKinds::default());

        let err = find(&state, &service, &project(org, "key", true))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Default template for project is missing");
    }

    #[tokio::test]
    async fn test_disabled_kind_without_default_is_an_error() {
        let org = OrganizationId::new_random();
        let (state, _) = state_with_default(org);
        let service = service(EnabledResourceKinds::default());
        let mut portfolio = project(org, "pf", true);
        portfolio.kind = ResourceKind::Portfolio;

        let err = find(&state, &service, &portfolio).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Attempt to create a view when Governance plugin is not installed"
        );
    }

    #[tokio::test]
    async fn test_enabled_kind_falls_back_to_project_default() {
        let org = OrganizationId::new_random();
        let (state, default) = state_with_default(org);
        let service = service(EnabledResourceKinds {
            portfolio: true,
            application: true,
        });
        let mut application = project(org, "app", true);
        application.kind = ResourceKind::Application;

        assert_eq!(
            find(&state, &service, &application).await.unwrap(),
            Some(default)
        );
    }

    #[tokio::test]
    async fn test_dangling_default_is_none_for_find_and_error_for_resolve() {
        let org = OrganizationId::new_random();
        let state = InMemoryState::default();
        state.set_default_templates(
            org,
            DefaultTemplates {
                project: Some(TemplateId::new_random()),
                ..Default::default()
            },
        );
        let service = service(EnabledResourceKinds::default());
        let entity = project(org, "key", true);

        assert_eq!(find(&state, &service, &entity).await.unwrap(), None);
        let mut t = InMemoryTransaction::begin_read(state.clone()).await.unwrap();
        let err = service
            .resolve_template::<InMemoryBackend>(&entity, &mut t)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot retrieve default permission template");
    }

    #[tokio::test]
    async fn test_apply_to_private_project_with_creator() {
        let org = OrganizationId::new_random();
        let (state, default) = state_with_default(org);
        let admins = GroupId::new_random();
        let reviewer = UserId::new_random();
        let creator = UserId::new_random();
        state.add_template_group_row(default.id, group_row(GroupGrantee::Group(admins), "admin"));
        state.add_template_group_row(default.id, group_row(GroupGrantee::Anyone, "scan"));
        state.add_template_user_row(default.id, user_row(reviewer, "codeviewer"));
        state.add_template_characteristic(default.id, creator_characteristic("admin"));
        let entity = project(org, "backend", true);
        let service = service(EnabledResourceKinds::default());

        let mut t = InMemoryTransaction::begin_write(state.clone()).await.unwrap();
        let applied = service
            .apply_default::<InMemoryBackend>(&entity, Some(creator), &mut t)
            .await
            .unwrap();
        t.commit().await.unwrap();

        assert_eq!(applied.template_id, default.id);
        assert_eq!(
            entity_grants(&state, entity.id),
            hashset! {
                (Grantee::Group(admins), "admin".to_string()),
                (Grantee::User(reviewer), "codeviewer".to_string()),
                (Grantee::User(creator), "admin".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_apply_to_public_project_skips_public_permissions() {
        let org = OrganizationId::new_random();
        let (state, default) = state_with_default(org);
        let group = GroupId::new_random();
        let user = UserId::new_random();
        state.add_template_group_row(default.id, group_row(GroupGrantee::Anyone, "user"));
        state.add_template_group_row(default.id, group_row(GroupGrantee::Anyone, "scan"));
        state.add_template_group_row(default.id, group_row(GroupGrantee::Group(group), "codeviewer"));
        state.add_template_user_row(default.id, user_row(user, "user"));
        state.add_template_user_row(default.id, user_row(user, "issueadmin"));
        let entity = project(org, "website", false);
        let service = service(EnabledResourceKinds::default());

        let mut t = InMemoryTransaction::begin_write(state.clone()).await.unwrap();
        service
            .apply_default::<InMemoryBackend>(&entity, None, &mut t)
            .await
            .unwrap();
        t.commit().await.unwrap();

        assert_eq!(
            entity_grants(&state, entity.id),
            hashset! {
                (Grantee::Anyone, "scan".to_string()),
                (Grantee::User(user), "issueadmin".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_creator_characteristics_skip_existing_rows_and_missing_creator() {
        let org = OrganizationId::new_random();
        let (state, default) = state_with_default(org);
        let creator = UserId::new_random();
        state.add_template_user_row(default.id, user_row(creator, "admin"));
        state.add_template_characteristic(default.id, creator_characteristic("admin"));
        state.add_template_characteristic(default.id, creator_characteristic("issueadmin"));
        state.add_template_characteristic(
            default.id,
            TemplateCharacteristic {
                permission: "scan".to_string(),
                with_project_creator: false,
            },
        );
        let service = service(EnabledResourceKinds::default());

        let with_creator = project(org, "one", true);
        let without_creator = project(org, "two", true);
        let mut t = InMemoryTransaction::begin_write(state.clone()).await.unwrap();
        let applied = service
            .apply_default::<InMemoryBackend>(&with_creator, Some(creator), &mut t)
            .await
            .unwrap();
        service
            .apply_default::<InMemoryBackend>(&without_creator, None, &mut t)
            .await
            .unwrap();
        t.commit().await.unwrap();

        assert_eq!(applied.grants.len(), 2);
        assert_eq!(
            entity_grants(&state, with_creator.id),
            hashset! {
                (Grantee::User(creator), "admin".to_string()),
                (Grantee::User(creator), "issueadmin".to_string()),
            }
        );
        assert_eq!(
            entity_grants(&state, without_creator.id),
            hashset! {(Grantee::User(creator), "admin".to_string())}
        );
    }

    #[tokio::test]
    async fn test_apply_default_and_commit_notifies() {
        let org = OrganizationId::new_random();
        let (state, default) = state_with_default(org);
        state.add_template_user_row(default.id, user_row(UserId::new_random(), "scan"));
        let recorder = Arc::new(Recorder::default());
        let service = PermissionTemplateService::new(
            Arc::new(EnabledResourceKinds::default()),
            ChangeNotifier::new(vec![recorder.clone()]),
        );
        let entity = project(org, "svc", true);

        service
            .apply_default_and_commit::<InMemoryBackend>(state.clone(), &entity, None)
            .await
            .unwrap();

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(*events[0].entity_ids, vec![entity.id]);
        assert_eq!(
            events[0].cause,
            ChangeCause::TemplateApplied {
                template_id: default.id
            }
        );
    }

    #[tokio::test]
    async fn test_reapply_replaces_existing_grants() {
        let org = OrganizationId::new_random();
        let (state, _) = state_with_default(org);
        let target = template(org, "Strict", None);
        state.add_template(target.clone());
        let group = GroupId::new_random();
        state.add_template_group_row(target.id, group_row(GroupGrantee::Group(group), "issueadmin"));
        state.add_template_characteristic(target.id, creator_characteristic("admin"));

        let first = project(org, "a", true);
        let second = project(org, "b", true);
        let untouched = project(org, "c", true);
        for entity in [&first, &second, &untouched] {
            state.seed_grant(Grant {
                grantee: Grantee::User(UserId::new_random()),
                permission: "admin".to_string(),
                entity_id: Some(entity.id),
            });
        }
        let global = Grant {
            grantee: Grantee::Group(group),
            permission: "scan".to_string(),
            entity_id: None,
        };
        state.seed_grant(global.clone());

        let recorder = Arc::new(Recorder::default());
        let service = PermissionTemplateService::new(
            Arc::new(EnabledResourceKinds::default()),
            ChangeNotifier::new(vec![recorder.clone()]),
        );
        let applied = service
            .reapply_and_commit::<InMemoryBackend>(
                state.clone(),
                target.id,
                &[first.clone(), second.clone()],
            )
            .await
            .unwrap();

        assert_eq!(applied.len(), 2);
        for entity in [&first, &second] {
            assert_eq!(
                entity_grants(&state, entity.id),
                hashset! {(Grantee::Group(group), "issueadmin".to_string())}
            );
        }
        assert_eq!(entity_grants(&state, untouched.id).len(), 1);
        assert!(state.grants().contains(&global));
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reapply_with_no_entities_is_noop() {
        let state = InMemoryState::default();
        let recorder = Arc::new(Recorder::default());
        let service = PermissionTemplateService::new(
            Arc::new(EnabledResourceKinds::default()),
            ChangeNotifier::new(vec![recorder.clone()]),
        );

        let applied = service
            .reapply_and_commit::<InMemoryBackend>(state.clone(), TemplateId::new_random(), &[])
            .await
            .unwrap();
        assert!(applied.is_empty());
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reapply_unknown_template_rolls_back() {
        let org = OrganizationId::new_random();
        let state = InMemoryState::default();
        let entity = project(org, "a", true);
        let grant = Grant {
            grantee: Grantee::User(UserId::new_random()),
            permission: "admin".to_string(),
            entity_id: Some(entity.id),
        };
        state.seed_grant(grant.clone());
        let service = service(EnabledResourceKinds::default());

        let err = service
            .reapply_and_commit::<InMemoryBackend>(state.clone(), TemplateId::new_random(), &[entity])
            .await
            .unwrap_err();
        assert_eq!(err.r#type, "TemplateNotFound");
        assert!(state.grants().contains(&grant));
    }

    #[tokio::test]
    async fn test_has_creator_permission() {
        let org = OrganizationId::new_random();
        let (state, default) = state_with_default(org);
        let service = service(EnabledResourceKinds::default());
        let entity = project(org, "p", true);
        let mut t = InMemoryTransaction::begin_read(state.clone()).await.unwrap();

        assert!(
            !service
                .has_default_template_with_permission_on_project_creator::<InMemoryBackend>(
                    &entity, &mut t
                )
                .await
                .unwrap()
        );

        state.add_template_characteristic(default.id, creator_characteristic("scan"));
        let mut t = InMemoryTransaction::begin_read(state.clone()).await.unwrap();
        assert!(
            service
                .has_default_template_with_permission_on_project_creator::<InMemoryBackend>(
                    &entity, &mut t
                )
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_would_user_have_scan_permission() {
        let org = OrganizationId::new_random();
        let (state, default) = state_with_default(org);
        let member = UserId::new_random();
        let outsider = UserId::new_random();
        let scanners = GroupId::new_random();
        state.add_group_member(scanners, member);
        state.add_template_group_row(default.id, group_row(GroupGrantee::Group(scanners), "scan"));
        let service = service(EnabledResourceKinds::default());

        let check = |user: Option<UserId>| {
            let state = state.clone();
            let service = service.clone();
            async move {
                let mut t = InMemoryTransaction::begin_read(state).await.unwrap();
                service
                    .would_user_have_scan_permission_with_default_template::<InMemoryBackend>(
                        user, org, "new-project", &mut t,
                    )
                    .await
                    .unwrap()
            }
        };

        assert!(check(Some(member)).await);
        assert!(!check(Some(outsider)).await);
        assert!(!check(None).await);

        state.add_template_characteristic(default.id, creator_characteristic("scan"));
        assert!(check(Some(outsider)).await);
        assert!(!check(None).await);

        state.add_template_group_row(default.id, group_row(GroupGrantee::Anyone, "scan"));
        assert!(check(None).await);
    }

    #[tokio::test]
    async fn test_scan_check_with_unknown_default_is_false() {
        let org = OrganizationId::new_random();
        let state = InMemoryState::default();
        state.set_default_templates(
            org,
            DefaultTemplates {
                project: Some(TemplateId::new_random()),
                ..Default::default()
            },
        );
        let service = service(EnabledResourceKinds::default());
        let mut t = InMemoryTransaction::begin_read(state.clone()).await.unwrap();
        assert!(
            !service
                .would_user_have_scan_permission_with_default_template::<InMemoryBackend>(
                    Some(UserId::new_random()),
                    org,
                    "p",
                    &mut t,
                )
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_global_scan_grant_allows_scan_without_template() {
        let org = OrganizationId::new_random();
        let state = InMemoryState::default();
        state.set_default_templates(
            org,
            DefaultTemplates {
                project: Some(TemplateId::new_random()),
                ..Default::default()
            },
        );
        let member = UserId::new_random();
        let scanners = GroupId::new_random();
        state.add_group_member(scanners, member);
        state.seed_grant(Grant {
            grantee: Grantee::Group(scanners),
            permission: "scan".to_string(),
            entity_id: None,
        });
        // Scan on some project does not count.
        let outsider = UserId::new_random();
        state.seed_grant(Grant {
            grantee: Grantee::User(outsider),
            permission: "scan".to_string(),
            entity_id: Some(EntityId::new_random()),
        });
        let service = service(EnabledResourceKinds::default());

        let check = |user: Option<UserId>| {
            let state = state.clone();
            let service = service.clone();
            async move {
                let mut t = InMemoryTransaction::begin_read(state).await.unwrap();
                service
                    .would_user_have_scan_permission_with_default_template::<InMemoryBackend>(
                        user, org, "new-project", &mut t,
                    )
                    .await
                    .unwrap()
            }
        };

        assert!(check(Some(member)).await);
        assert!(!check(Some(outsider)).await);
        assert!(!check(None).await);

        state.seed_grant(Grant {
            grantee: Grantee::Anyone,
            permission: "scan".to_string(),
            entity_id: None,
        });
        assert!(check(None).await);
        assert!(check(Some(outsider)).await);
    }
}
