mod entity;
mod generic;

pub use entity::{Entity, ResourceKind};
pub use generic::{EntityId, GroupId, OrganizationId, TemplateId, UserId};
