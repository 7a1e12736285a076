use http::StatusCode;
use itertools::Itertools;

use crate::{
    api::ErrorModel,
    service::{
        ResourceKind, StoreBackendError, TemplateId, define_transparent_error,
        impl_error_stack_methods, impl_from_with_detail,
    },
};

fn missing_default_message(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Project => "Default template for project is missing",
        ResourceKind::Portfolio | ResourceKind::Application => {
            "Attempt to create a view when Governance plugin is not installed"
        }
    }
}

/// No default template can be determined for a resource kind.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("{}", missing_default_message(*.kind))]
pub struct DefaultTemplateMissing {
    pub kind: ResourceKind,
    pub stack: Vec<String>,
}
impl_error_stack_methods!(DefaultTemplateMissing);

impl DefaultTemplateMissing {
    #[must_use]
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            stack: Vec::new(),
        }
    }
}

impl From<DefaultTemplateMissing> for ErrorModel {
    fn from(err: DefaultTemplateMissing) -> Self {
        ErrorModel::builder()
            .r#type("DefaultTemplateMissing")
            .code(StatusCode::INTERNAL_SERVER_ERROR.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

/// The configured default template does not exist.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Cannot retrieve default permission template")]
pub struct DefaultTemplateNotFound {
    pub template_id: TemplateId,
    pub stack: Vec<String>,
}
impl_error_stack_methods!(DefaultTemplateNotFound);

impl DefaultTemplateNotFound {
    #[must_use]
    pub fn new(template_id: TemplateId) -> Self {
        Self {
            template_id,
            stack: Vec::new(),
        }
    }
}

impl From<DefaultTemplateNotFound> for ErrorModel {
    fn from(err: DefaultTemplateNotFound) -> Self {
        let message = err.to_string();
        ErrorModel::builder()
            .r#type("DefaultTemplateNotFound")
            .code(StatusCode::INTERNAL_SERVER_ERROR.as_u16())
            .message(message)
            .stack(err.stack)
            .build()
            .append_detail(format!("Default template id: {}", err.template_id))
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error(
    "The \"{key}\" key matches multiple permission templates: {}.",
    .template_names.iter().map(|n| format!("\"{n}\"")).join(", ")
)]
pub struct AmbiguousTemplateMatch {
    pub key: String,
    /// Sorted case-insensitively.
    pub template_names: Vec<String>,
    pub stack: Vec<String>,
}
impl_error_stack_methods!(AmbiguousTemplateMatch);

impl AmbiguousTemplateMatch {
    #[must_use]
    pub fn new(key: impl Into<String>, mut template_names: Vec<String>) -> Self {
        template_names.sort_by_key(|n| n.to_lowercase());
        Self {
            key: key.into(),
            template_names,
            stack: Vec::new(),
        }
    }
}

impl From<AmbiguousTemplateMatch> for ErrorModel {
    fn from(err: AmbiguousTemplateMatch) -> Self {
        ErrorModel::builder()
            .r#type("AmbiguousTemplateMatch")
            .code(StatusCode::BAD_REQUEST.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

#[derive(thiserror::Error, Debug)]
#[error("Permission template '{template_name}' has an invalid key pattern `{pattern}`")]
pub struct InvalidTemplateKeyPattern {
    pub template_name: String,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
    pub stack: Vec<String>,
}
impl_error_stack_methods!(InvalidTemplateKeyPattern);

impl InvalidTemplateKeyPattern {
    #[must_use]
    pub fn new(
        template_name: impl Into<String>,
        pattern: impl Into<String>,
        source: regex::Error,
    ) -> Self {
        Self {
            template_name: template_name.into(),
            pattern: pattern.into(),
            source,
            stack: Vec::new(),
        }
    }
}

impl From<InvalidTemplateKeyPattern> for ErrorModel {
    fn from(err: InvalidTemplateKeyPattern) -> Self {
        let message = err.to_string();
        let InvalidTemplateKeyPattern { stack, source, .. } = err;
        ErrorModel::builder()
            .r#type("InvalidTemplateKeyPattern")
            .code(StatusCode::BAD_REQUEST.as_u16())
            .message(message)
            .stack(stack)
            .source(Some(Box::new(source)))
            .build()
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Permission template with id '{template_id}' does not exist")]
pub struct TemplateNotFound {
    pub template_id: TemplateId,
    pub stack: Vec<String>,
}
impl_error_stack_methods!(TemplateNotFound);

impl TemplateNotFound {
    #[must_use]
    pub fn new(template_id: TemplateId) -> Self {
        Self {
            template_id,
            stack: Vec::new(),
        }
    }
}

impl From<TemplateNotFound> for ErrorModel {
    fn from(err: TemplateNotFound) -> Self {
        let message = err.to_string();
        ErrorModel::not_found(message, "TemplateNotFound", None).append_details(err.stack)
    }
}

// --------------------------- RESOLVE DEFAULTS ERROR ---------------------------
define_transparent_error! {
    pub enum ResolveDefaultTemplatesError,
    stack_message: "Error resolving default permission templates",
    variants: [
        DefaultTemplateMissing,
        StoreBackendError,
    ]
}

// --------------------------- TEMPLATE ERROR ---------------------------
define_transparent_error! {
    pub enum PermissionTemplateError,
    stack_message: "Error applying permission template",
    variants: [
        DefaultTemplateMissing,
        DefaultTemplateNotFound,
        AmbiguousTemplateMatch,
        InvalidTemplateKeyPattern,
        TemplateNotFound,
        StoreBackendError,
    ]
}

impl From<ResolveDefaultTemplatesError> for PermissionTemplateError {
    fn from(err: ResolveDefaultTemplatesError) -> Self {
        match err {
            ResolveDefaultTemplatesError::DefaultTemplateMissing(e) => e.into(),
            ResolveDefaultTemplatesError::StoreBackendError(e) => e.into(),
        }
    }
}
