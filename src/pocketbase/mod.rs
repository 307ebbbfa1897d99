//! Thin REST client for PocketBase, the external system of record.
//!
//! PocketBase owns persistence, indexing and querying. This module only builds
//! requests and filter expressions and maps responses/errors into crate types.

mod client;
mod filter;

pub use client::{HealthStatus, ListParams, ListResult, PocketBaseClient};
pub use filter::{quote, Filter};

/// Collection names used by the knowledge base
pub mod collections {
    pub const INCIDENTS: &str = "incidents";
    pub const SOLUTIONS: &str = "solutions";
    pub const LESSONS: &str = "lessons_learned";
}
