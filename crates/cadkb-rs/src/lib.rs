//! Public SDK surface for the operation knowledge store.
//!
//! This crate re-exports the building blocks and provides a small
//! initialization helper to keep consumer setup consistent.

/// Re-export for convenience.
pub use cadkb_rs_config as config;
/// Re-export for convenience.
pub use cadkb_rs_core as core;
/// Re-export for convenience.
pub use cadkb_rs_store as store;

pub use cadkb_rs_config::KnowledgeConfig;
pub use cadkb_rs_core::{
    KnowledgeBase, KnowledgeError, KnowledgeOptions, KnowledgeTools, KnownOperation,
    ResetConfirmation, SimilarSolutions,
};
pub use cadkb_rs_store::{ErrorSolution, OperationParameters, OperationRecord};

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// Binaries are expected to call this early in startup; repeated calls are
/// harmless.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::builder()
            .format_timestamp_millis()
            .parse_default_env()
            .try_init();
    }
}
