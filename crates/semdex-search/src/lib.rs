//! Semdex Search — thin client for the external k-NN search engine.

pub mod client;
pub mod query;

pub use client::{DeleteOutcome, OpenSearchClient, SearchEngine, SearchHit};
pub use query::{knn_query, multi_field_knn_query};
