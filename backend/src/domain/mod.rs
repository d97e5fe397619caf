//! Domain Layer
//!
//! Stored rows and the errors the repositories raise.

mod entity;
mod stored_item;

pub use entity::{DomainError, DomainResult, Entity};
pub use stored_item::StoredItem;
