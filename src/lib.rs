pub mod adaptive;
pub mod config;
pub mod logging;
pub mod storage;
pub mod workers;

pub use adaptive::{AdaptiveConfig, AdaptiveEngine};
