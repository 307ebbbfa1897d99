//! Code Mode helper layer
//!
//! Agents discover tools through [`catalog`], call them through
//! [`router::ToolRouter`], and get back redacted, cached and chunked results
//! with every call recorded in the audit log and feedback board.

pub mod audit;
pub mod catalog;
pub mod chunk;
pub mod feedback;
pub mod redact;
pub mod router;
pub mod wrapper;

pub use audit::{AuditEntry, AuditLog};
pub use catalog::{search_tools, DetailLevel, ToolDescriptor};
pub use chunk::ChunkedResult;
pub use feedback::{FeedbackStore, ToolFeedback};
pub use redact::{redact, redact_value};
pub use router::{RouterMetrics, ToolRouter};
pub use wrapper::{CodeModeClient, ServiceInvoker, ToolInvoker, ToolOutput, ToolPayload};

use crate::config::AgentConfig;
use crate::processing::KnowledgeService;
use std::sync::Arc;

/// Router over the in-process service with audit and feedback at the configured paths
pub fn build_router(service: Arc<KnowledgeService>, config: &AgentConfig) -> ToolRouter {
    ToolRouter::new(Arc::new(ServiceInvoker::new(service)), config).with_recording(
        Arc::new(AuditLog::new(&config.audit_path)),
        Arc::new(FeedbackStore::new(&config.feedback_path)),
    )
}
