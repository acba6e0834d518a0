//! Semdex Runtime — end-to-end indexing and query orchestration.

pub mod indexing;
pub mod query;

pub use indexing::IndexingOrchestrator;
pub use query::{QueryOrchestrator, ResultCache};
