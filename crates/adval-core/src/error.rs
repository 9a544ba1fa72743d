use thiserror::Error;

/// Programmer-error-class input problems, surfaced at construction time.
///
/// Provider-side failures never appear here; those are folded into
/// [`crate::NormalizedResult`] so the public validate operation always
/// resolves.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("street line cannot be empty")]
    EmptyStreet,
    #[error("state must be a 2-letter code: '{value}'")]
    InvalidState { value: String },
    #[error("invalid provider '{value}', expected one of usps, smarty, google")]
    InvalidProvider { value: String },
    #[error("invalid dispatch mode '{value}', expected 'waterfall' or 'hedged'")]
    InvalidDispatchMode { value: String },
}

/// Invalid configuration detected while constructing the orchestrator.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("provider order cannot be empty")]
    EmptyProviderOrder,
    #[error("provider order lists '{provider}' more than once")]
    DuplicateProvider { provider: crate::ProviderId },
    #[error("cache capacity must be greater than zero")]
    ZeroCacheCapacity,
    #[error("circuit breaker failure threshold must be greater than zero")]
    ZeroFailureThreshold,
    #[error("{variable} has invalid value '{value}': {reason}")]
    InvalidVariable {
        variable: String,
        value: String,
        reason: String,
    },
}
