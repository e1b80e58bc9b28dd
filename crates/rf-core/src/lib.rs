//! rusty-forum/crates/rf-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Rusty-Forum:
//! posts and replies, the storage port, the repository over it, and the
//! coordinator that turns committed mutations into realtime events.

pub mod coordinator;
pub mod error;
pub mod events;
pub mod models;
pub mod query;
pub mod repository;
pub mod traits;

// Re-exporting for easier access in other crates
pub use coordinator::*;
pub use error::*;
pub use events::*;
pub use models::*;
pub use query::*;
pub use repository::*;
pub use traits::*;
