use std::io;

/// All error types for ptex-atlas.
#[derive(thiserror::Error, Debug)]
pub enum PtexError {
    /// Invalid channel count, non-power-of-two side, oversized resolution.
    #[error("Format error: {0}")]
    Format(String),
    #[error("Allocation error: {0}")]
    Allocation(String),
    /// Malformed mesh input. Adjacency inconsistencies never surface here,
    /// the border filter falls back to self-reference instead.
    #[error("Topology error: {0}")]
    Topology(String),
    /// Subimage seek, read or split failure.
    #[error("Archive error: {0}")]
    Archive(String),
    /// Resample, blend, layout or copy primitive failure.
    #[error("Primitive error: {0}")]
    Primitive(String),
    #[error("Input error: {0}")]
    Input(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PtexError>;
