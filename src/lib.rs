//! Incident knowledge base
//!
//! Incidents, their solutions and the lessons drawn from them, stored in
//! PocketBase (or sled/in-memory for local use) and served three ways: an
//! axum Admin API with WebSocket live updates, an MCP tool server over stdio,
//! and the Code Mode helper layer that agents call through.

pub mod agent;
pub mod api;
pub mod benchmarks;
pub mod config;
pub mod error;
pub mod export;
pub mod mcp;
pub mod metrics;
pub mod models;
pub mod pocketbase;
pub mod processing;
pub mod state;
pub mod websocket;

pub use error::{AppError, Result};
