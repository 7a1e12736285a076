//! Permission templates.
//!
//! A template is a named set of user, group and creator permissions. When an entity
//! is created, the template whose key pattern matches the entity key is copied onto
//! it, falling back to the organization's default template for the entity kind.
mod default_resolver;
mod error;
mod service;

pub use default_resolver::{DefaultTemplateResolver, ResolvedDefaultTemplates};
pub use error::{
    AmbiguousTemplateMatch, DefaultTemplateMissing, DefaultTemplateNotFound,
    InvalidTemplateKeyPattern, PermissionTemplateError, ResolveDefaultTemplatesError,
    TemplateNotFound,
};
pub use service::{AppliedGrant, AppliedTemplate, PermissionTemplateService};
