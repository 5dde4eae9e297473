//! Shared entities (server side): authoritative values and diff emission.
//!
//! Mutations run synchronously: the op is computed and handed to every
//! synced handle's queue before the mutating call returns.

mod entity;
mod list;
mod object;
mod registry;

pub use entity::SharedEntity;
pub use list::{ListItem, SharedList};
pub use object::SharedObject;
pub use registry::EntityRegistry;
