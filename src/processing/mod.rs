//! Service layer: validation, persistence through the store, event publishing

mod service;

pub use service::{KnowledgeService, DEFAULT_SEARCH_LIMIT, MAX_PER_PAGE};
