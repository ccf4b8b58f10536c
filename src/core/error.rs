use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("invalid configuration for {parameter}: {message}")]
    InvalidConfiguration {
        parameter: &'static str,
        message: String,
    },

    #[error("division by zero in {context}")]
    DivisionByZero { context: &'static str },

    #[error("invalid observation at period {period_index}: {message}")]
    InvalidObservation {
        period_index: usize,
        message: String,
    },

    #[error("failed to ingest price data: {0}")]
    Ingest(String),

    #[error("failed to export ledger: {0}")]
    Export(String),
}

impl SimError {
    pub fn invalid_configuration(parameter: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            parameter,
            message: message.into(),
        }
    }

    pub fn division_by_zero(context: &'static str) -> Self {
        Self::DivisionByZero { context }
    }

    pub fn invalid_observation(period_index: usize, message: impl Into<String>) -> Self {
        Self::InvalidObservation {
            period_index,
            message: message.into(),
        }
    }

    /// Parameter name for configuration errors, used when reporting back to a caller.
    pub fn parameter(&self) -> Option<&'static str> {
        match self {
            Self::InvalidConfiguration { parameter, .. } => Some(*parameter),
            _ => None,
        }
    }
}
