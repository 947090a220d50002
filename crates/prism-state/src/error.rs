//! Error types for prism-state operations.

use thiserror::Error;

/// Result type alias for prism-state operations.
pub type PrismResult<T> = Result<T, PrismError>;

/// Boxed error type accepted from user-provided effect factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during prism-state operations.
#[derive(Debug, Error)]
pub enum PrismError {
    /// `ArrayStrategy::ByKey` was configured without a key field.
    #[error("array strategy `ByKey` requires a non-empty key field")]
    MissingKeyField,

    /// An effect with the same ID is already registered on the state.
    #[error("effect with id {id:?} already exists")]
    DuplicateEffect {
        /// The conflicting effect ID.
        id: String,
    },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while saving or loading a snapshot.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An effect factory failed to reconstruct an effect during restore.
    #[error("effect factory error: {0}")]
    EffectFactory(#[source] BoxError),
}

impl PrismError {
    /// Create a duplicate-effect error.
    #[inline]
    pub fn duplicate_effect(id: impl Into<String>) -> Self {
        PrismError::DuplicateEffect { id: id.into() }
    }

    /// Wrap a user factory error.
    #[inline]
    pub fn factory(err: impl Into<BoxError>) -> Self {
        PrismError::EffectFactory(err.into())
    }
}

/// A per-entry failure recorded while restoring effects from a snapshot.
///
/// Restore accumulates these instead of aborting, so one bad entry cannot
/// take down the rest of the snapshot.
#[derive(Debug, Error)]
#[error("restoring effect {id:?}: {source}")]
pub struct EffectRestoreError {
    /// ID of the effect entry that failed.
    pub id: String,
    /// The underlying failure.
    #[source]
    pub source: PrismError,
}
