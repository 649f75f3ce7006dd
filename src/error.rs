// src/error.rs
//! Error handling for the physics bridge.
//!
//! - **Fatal**: `InvalidConfig` aborts world/scene construction.
//! - **Contract**: `InvalidHandle` / `EntityNotFound` are returned by body mutators
//!   instead of panicking, so a stale handle never tears down the frame.
//! - Raycast misses and dangling entities are *not* errors; they never reach this type.

use thiserror::Error;

/// Main error type for every fallible physics-bridge operation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PhysicsError {
    /// World construction rejected the configuration. Scene setup cannot continue.
    #[error("invalid physics configuration: {0}")]
    InvalidConfig(String),

    /// Body handle does not refer to a live body (already destroyed or from another world).
    #[error("invalid or stale rigid body handle")]
    InvalidHandle,

    /// Entity is not alive in the registry.
    #[error("entity not found in registry")]
    EntityNotFound,

    /// Config file could not be parsed.
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// Config file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PhysicsError {
    #[inline]
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    #[inline]
    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, PhysicsError::InvalidHandle)
    }
}

/// Result type for physics operations
pub type PhysicsResult<T> = Result<T, PhysicsError>;
