//! Test helpers shared across cadkb crates.

pub mod embedding;
pub mod records;
pub mod store;

pub use embedding::{FailingEmbedder, FixedEmbedder, SlowEmbedder, SwitchableEmbedder};
pub use records::sample_record;
pub use store::FailingStore;
