//! # Nudge Store
//!
//! Implementations of the storage and lookup ports from `nudge-core`:
//! - `MemoryUserStore` / `MemoryHistory`: in-process, seeded from JSON or code
//! - `SqliteHistory`: durable history + behavior log, survives restarts
//! - `StaticPersonas`, `ProfilePersonas`, `StaticVariants`: lookup collaborators

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryHistory, MemoryUserStore, ProfilePersonas, StaticPersonas, StaticVariants};
pub use sqlite::SqliteHistory;
