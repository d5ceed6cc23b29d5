//! Common utilities and data structures shared by the navigation mesh crates

mod geometry;
mod tick_watch;
mod triangle_utils;

pub use geometry::*;
pub use tick_watch::*;
pub use triangle_utils::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed or non-finite input, or a polygon reference that does not resolve.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// The query ran but could not produce a result (no polygon, no path).
    #[error("query failed: {0}")]
    Failure(String),

    /// Two polygons were expected to be adjacent but share no link.
    #[error("no link found: {0}")]
    NoLinkFound(String),

    #[error("node pool exhausted")]
    OutOfNodes,

    #[error("result buffer too small")]
    BufferTooSmall,

    #[error("invalid navigation mesh: {0}")]
    InvalidMesh(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidParam`] with a static message.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParam(msg.into())
    }

    /// Shorthand for an [`Error::Failure`] with a static message.
    pub fn failure(msg: impl Into<String>) -> Self {
        Error::Failure(msg.into())
    }

    /// Shorthand for an [`Error::InvalidMesh`].
    pub fn invalid_mesh(msg: impl Into<String>) -> Self {
        Error::InvalidMesh(msg.into())
    }
}

/// Result type for navigation operations
pub type Result<T> = std::result::Result<T, Error>;
