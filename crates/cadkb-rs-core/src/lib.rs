//! Operation knowledge base for CAD automation.
//!
//! Records every attempted automation operation with its outcome, indexes it
//! for similarity search, and derives statistics from the accumulated history.

pub mod analysis;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod operation;
pub mod prompt;
pub mod solutions;
pub mod tools;
pub mod transfer;

/// Aggregate statistics.
pub use analysis::{CountEntry, PatternAnalysis};
/// Embedding providers and their registry.
pub use embedding::{
    EmbeddingProvider, EmbeddingProviderRegistry, HashingEmbeddingProvider,
    HttpEmbeddingProvider, provider_from_config,
};
/// Error types.
pub use error::{EmbeddingError, KnowledgeError};
/// Knowledge base handle and query results.
pub use knowledge::{KnowledgeBase, KnowledgeOptions, ResetConfirmation, SimilarOperations};
/// Typed operation parameters and derived record fields.
pub use operation::{KnownOperation, context_summary, derive_tags, error_summary};
pub use prompt::{format_for_prompt, format_solutions_for_prompt};
/// Error solutions and their query result.
pub use solutions::SimilarSolutions;
/// Assistant-facing tool surface.
pub use tools::{KnowledgeTool, KnowledgeTools, ToolOutcome, ToolSpec};
/// Import and export summaries.
pub use transfer::{ExportSummary, ImportSummary};
