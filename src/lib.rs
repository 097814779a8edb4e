//! Phenoflow - Behavioral feature engine for digital phenotyping studies
//!
//! Phenoflow turns a participant's raw sensing and self-report streams into
//! analysis-ready behavioral features through a deterministic pipeline:
//! event retrieval → local-time alignment → survey scoring → daily frame →
//! imputation → binning/normalization → derived features (bouts, transitions,
//! trajectory similarity).
//!
//! ## Modules
//!
//! - **Client**: paged event retrieval from a sensing server
//! - **Feature Pipeline**: assemble and derive per-participant feature frames
//! - **Trajectory**: GPS day-trajectory similarity and routine clustering

pub mod bins;
pub mod bouts;
pub mod client;
pub mod error;
pub mod export;
pub mod frame;
pub mod impute;
pub mod localize;
pub mod normalize;
pub mod pipeline;
pub mod surveys;
pub mod trajectory;
pub mod transitions;
pub mod types;

pub use client::{EventSource, StaticSource};
pub use error::FeatureError;
pub use frame::{DailyFrame, FrameOptions};
pub use pipeline::{Participant, ParticipantPipeline};

#[cfg(feature = "api")]
pub use client::SensingClient;

/// Version stamped into exported feature reports
pub const PHENOFLOW_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for exported reports
pub const PRODUCER_NAME: &str = "phenoflow";
