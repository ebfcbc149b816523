//! Error types for GPU layout operations.

use thiserror::Error;

/// Errors that can occur during GPU layout operations.
#[derive(Error, Debug)]
pub enum LayoutError {
    /// A setting is outside its accepted range.
    #[error("invalid configuration for `{field}`: {message}")]
    InvalidConfig {
        field: &'static str,
        message: String,
    },

    /// Two bindings under one name disagree on element count or width.
    #[error("buffer `{name}` mismatch: expected {expected}, found {found}")]
    BufferMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// A program was asked for a buffer it does not bind.
    #[error("program `{program}` has no buffer named `{name}`")]
    UnknownBuffer { program: String, name: String },

    /// A program was given a parameter it does not declare.
    #[error("program `{program}` has no parameter named `{name}`")]
    UnknownParameter { program: String, name: String },

    /// Failed to initialize GPU device.
    #[error("GPU initialization failed: {0}")]
    GpuInit(String),

    /// The device lacks a limit or feature a kernel needs.
    #[error("GPU capability missing: {0}")]
    MissingCapability(String),

    /// Shader module or pipeline creation was rejected by the device.
    #[error("kernel `{program}` failed to compile: {message}")]
    ShaderCompilation { program: String, message: String },

    /// Failed to read back data from GPU.
    #[error("GPU readback failed: {0}")]
    Readback(String),

    /// Invalid graph data.
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Layout not initialized.
    #[error("Layout not initialized")]
    NotInitialized,

    /// Settings (de)serialization failed.
    #[error("settings serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LayoutError {
    pub(crate) fn config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }
}
