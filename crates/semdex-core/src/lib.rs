//! Semdex Core — configuration, error type, bus message shapes.

pub mod config;
pub mod error;
pub mod messages;

pub use config::{DataPaths, EmbeddingProviderKind, ExtraModelInput, SemdexConfig};
pub use error::{Error, Result};
pub use messages::{
    CreateIndexRequest, CreateSnapshotRequest, QueryHit, QueryIndexReply, QueryIndexRequest,
    ResultObj,
};
