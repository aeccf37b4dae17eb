use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type of the simulation kernel.
///
/// Configuration errors are raised while components are constructed and are fatal to the setup.
/// Contract violations are raised at run time when the caller (usually the external mediator)
/// breaks a precondition of a component; they indicate a bug and are never worth retrying.
/// Expected empty outcomes (an empty cell, a filtered-out active unit) are never errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid construction argument (non-positive chain time, charge filter on a composite level, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Run-time precondition violated by the caller (wrong active-unit count, causality, ...).
    #[error("contract violation: {0}")]
    Contract(String),

    /// Malformed data handed to a constructor or setter (NaN, wrong vector length, bad identifier).
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
}
