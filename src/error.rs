// src/error.rs
// Error taxonomy shared by the solver, the session controller and the renderers.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while building models, integrating, or rendering.
#[derive(Debug, Error)]
pub enum PendulumError {
    /// A physical constant or solver input is outside its domain.
    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        /// Name of the offending value (e.g. `l1`, `n_points`).
        name: &'static str,
        /// The rejected value.
        value: f64,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The adaptive solver could not finish the requested span.
    #[error("integration diverged at t = {t:.6}: {reason}")]
    IntegrationDiverged {
        /// Time reached before giving up.
        t: f64,
        /// What went wrong (step budget, step underflow, non-finite state).
        reason: String,
    },

    /// The output location for an export cannot be used.
    #[error("render target unavailable: {path}: {source}")]
    RenderTargetUnavailable {
        /// The path that could not be used.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The drawing backend failed.
    #[error("render failed: {0}")]
    Render(String),

    /// A background solve was lost before it produced a result.
    #[error("solve aborted: {0}")]
    Aborted(String),

    /// A scenario file could not be read or parsed.
    #[error("failed to load scenario {path}: {source}")]
    Config {
        /// The scenario file.
        path: PathBuf,
        /// The underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PendulumError {
    /// Shorthand for an [`PendulumError::InvalidParameter`].
    pub fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value,
            reason,
        }
    }

    /// Shorthand for an [`PendulumError::IntegrationDiverged`].
    pub fn diverged(t: f64, reason: impl Into<String>) -> Self {
        Self::IntegrationDiverged {
            t,
            reason: reason.into(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PendulumError>;
