//! Retrieval memory for the NV experiment agent.
//!
//! - One JSON record file per saved transcript snapshot ([`EmbeddingStore`]).
//! - Records are re-chunked by line and re-embedded at query time, ranked by
//!   `1 / (1 + L2 distance)` and pooled across records ([`ContextAssembler`]).
//! - Plot artifacts are derived from the data directory and the transcript, never stored.

mod cache;
mod context;
mod error;
mod hashing;
mod plots;
mod record;
mod similarity;

pub use cache::CachingEmbedder;
pub use context::{ContextAssembler, ContextHit, RetrievedContext};
pub use error::{MemoryError, Result};
pub use hashing::HashingEmbedder;
pub use plots::{
    PLOT_STEMS, PlotArtifact, VISION_MARKER, analyzed_plot_names, cited_plots, list_plots,
    plot_status, relevant_plots, unanalyzed_plots,
};
pub use record::{EmbeddingRecord, EmbeddingStore};
pub use similarity::{ScoredChunk, l2_distance, rank_chunks, similarity_from_distance, split_chunks};
