use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Input(#[from] adval_core::InputError),

    #[error(transparent)]
    Config(#[from] adval_core::ConfigError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Input(_) => 2,
            Self::Config(_) => 3,
            Self::Serialization(_) => 10,
        }
    }
}
