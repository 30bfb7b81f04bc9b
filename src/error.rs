//! Central error handling for the raywave renderer
//!
//! Provides a unified RenderError enum with consistent categorization.
//! Fatal categories (device, allocation, scene, capacity, launch) terminate
//! the process from the binary; per-asset failures are logged and recovered
//! at the call site.

/// Centralized error type for all renderer operations
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Allocation error: {0}")]
    Allocation(String),

    #[error("Scene error: {0}")]
    Scene(String),

    #[error("Capacity error: {0}")]
    Capacity(String),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Convenience constructors for common error types
    pub fn device<T: ToString>(msg: T) -> Self {
        RenderError::Device(msg.to_string())
    }

    pub fn allocation<T: ToString>(msg: T) -> Self {
        RenderError::Allocation(msg.to_string())
    }

    pub fn scene<T: ToString>(msg: T) -> Self {
        RenderError::Scene(msg.to_string())
    }

    pub fn capacity<T: ToString>(msg: T) -> Self {
        RenderError::Capacity(msg.to_string())
    }

    pub fn launch<T: ToString>(msg: T) -> Self {
        RenderError::Launch(msg.to_string())
    }
}

/// Result type alias for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;
