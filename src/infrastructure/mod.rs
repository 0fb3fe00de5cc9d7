//! Infrastructure layer for the gateway
//!
//! This module contains the persistence contracts the gateway depends on and
//! their implementations.

pub mod memory;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::*;
