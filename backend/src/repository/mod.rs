//! Repository Layer
//!
//! Data access abstractions and implementations.

mod count_repo;
mod db;
mod item_positioning;
mod item_repo;
mod traits;


pub use count_repo::{CountReconciliation, CountRepository};
pub use db::{init_db, DbState, SharedConnection};
pub use item_positioning::ItemPositioningOperations;
pub use item_repo::ItemRepository;
pub use traits::Repository;
