//! Error types for geoharvest services.

use thiserror::Error;

/// Result type alias using HarvestError.
pub type HarvestResult<T> = Result<T, HarvestError>;

/// Primary error type for tile acquisition operations.
///
/// The variants map onto the propagation policy: `Configuration` aborts the
/// run before any network activity, `Interrupted` triggers a final registry
/// flush, everything else is tile-scoped and caught at the orchestrator
/// boundary.
#[derive(Debug, Error)]
pub enum HarvestError {
    // === Fatal before network activity ===
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // === Tile-scoped errors ===
    #[error("Metadata resolution failed: {0}")]
    Metadata(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Format error: {0}")]
    Format(String),

    // === Operator stop ===
    #[error("Operation interrupted")]
    Interrupted,

    // === Infrastructure ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarvestError {
    /// Whether the error is contained at the tile boundary (the batch
    /// continues) or must propagate to the process boundary.
    pub fn is_tile_scoped(&self) -> bool {
        matches!(
            self,
            HarvestError::Metadata(_) | HarvestError::Transfer(_) | HarvestError::Format(_)
        )
    }
}
