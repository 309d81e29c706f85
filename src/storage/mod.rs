//! Keyed persistence for user profiles and per-(user, topic) proficiency models.
//!
//! Two backends implement the same traits:
//! - [`InMemoryStore`] for tests and hosts without durable storage
//! - [`SqliteStore`] for an embedded single-file database
//!
//! Values are stored as JSON documents so the schema never has to follow the
//! shape of [`UserProfile`].

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use thiserror::Error;

use crate::adaptive::modeling::ProficiencyNetwork;
use crate::adaptive::types::{PerformanceRecord, UserProfile};

// ============================================================
// Errors
// ============================================================

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to acquire lock: {0}")]
    LockError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================
// Store traits
// ============================================================

/// Profile persistence keyed by `user_id`.
pub trait ProfileStore: Send + Sync {
    fn load_profile(&self, user_id: &str) -> StorageResult<Option<UserProfile>>;

    /// Insert or replace. Replacing keeps the profile's original insertion position.
    fn save_profile(&self, profile: &UserProfile) -> StorageResult<()>;

    /// All profiles in first-insertion order.
    fn list_profiles(&self) -> StorageResult<Vec<UserProfile>>;

    fn profile_count(&self) -> StorageResult<usize>;
}

/// Proficiency model and training-history persistence keyed by `(user_id, topic)`.
pub trait ModelStore: Send + Sync {
    fn load_model(&self, user_id: &str, topic: &str) -> StorageResult<Option<ProficiencyNetwork>>;

    fn save_model(&self, user_id: &str, topic: &str, model: &ProficiencyNetwork)
        -> StorageResult<()>;

    /// Oldest first.
    fn load_history(&self, user_id: &str, topic: &str) -> StorageResult<Vec<PerformanceRecord>>;

    /// Appends and returns the full history including the new record.
    fn append_history(
        &self,
        user_id: &str,
        topic: &str,
        record: &PerformanceRecord,
    ) -> StorageResult<Vec<PerformanceRecord>>;
}
