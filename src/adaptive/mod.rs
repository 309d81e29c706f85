pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod modeling;
pub mod recommendation;
pub mod similarity;
pub mod taxonomy;
pub mod types;

pub use config::AdaptiveConfig;
pub use engine::AdaptiveEngine;
pub use error::{AdaptiveError, AdaptiveResult};
pub use types::*;
