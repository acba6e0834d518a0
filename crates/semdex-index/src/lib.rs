//! Semdex Index — artefact shapes, per-index strategies, pad-length registry.
//!
//! Heterogeneous record shapes are dispatched through the `IndexStrategy`
//! contract so the indexing and query pipelines stay shape-agnostic.

pub mod artefact;
pub mod document;
pub mod mitre;
pub mod pad_registry;
pub mod security_book;
pub mod strategy;

pub use artefact::{Artefact, Document, MitreEntry, SecurityBook};
pub use document::DocumentStrategy;
pub use mitre::MitreStrategy;
pub use pad_registry::{PadLengthRecord, PadLengthRegistry};
pub use security_book::SecurityBookStrategy;
pub use strategy::{
    estimate_padding, sha256_hex, strategies, strategy_for_index, IndexStrategy, PadEstimate,
    SearchMode,
};
