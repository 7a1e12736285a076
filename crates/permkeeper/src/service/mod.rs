pub mod events;
mod identifier;
mod permission_store;
pub mod permissions;
pub mod resource_kinds;
pub mod templates;

pub use identifier::*;
pub use permission_store::*;
pub use permissions::*;
pub use resource_kinds::ResourceKindRegistry;
pub use templates::*;
