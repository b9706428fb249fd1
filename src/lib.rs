// Review topics: per-bank LDA topic discovery over customer reviews
//
// This is the library root. Each module is one stage of the pipeline, plus
// configuration, errors and the input/output boundary.

pub mod assign;
pub mod coherence;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod sources;
pub mod topic_modeling;
pub mod vectorize;

pub use config::TopicConfig;
pub use error::{Result, TopicError};
pub use orchestrator::PartitionOrchestrator;
