//! Common types for the transform module

use thiserror::Error;

/// Transform error types
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Empty image: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    #[error("Invalid target size: {width}x{height}")]
    InvalidTargetSize { width: u32, height: u32 },

    #[error("Long strip has no images")]
    EmptyStrip,
}

pub type Result<T> = std::result::Result<T, TransformError>;

/// Reject zero-sized rasters before any scale math divides by them
pub(crate) fn ensure_non_empty(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(TransformError::EmptyImage { width, height });
    }
    Ok(())
}

pub(crate) fn ensure_target(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(TransformError::InvalidTargetSize { width, height });
    }
    Ok(())
}
