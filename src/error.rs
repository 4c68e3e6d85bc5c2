use thiserror::Error as ThisError;

#[derive(ThisError, Debug, Clone)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream could not be reached or returned nothing, and no earlier
    /// value exists to fall back on.
    #[error("Data unavailable: {0}")]
    Unavailable(String),

    #[error("Insufficient history: {available} observations, {required} required")]
    InsufficientData { required: usize, available: usize },

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
}

impl AppError {
    /// Short machine-readable label, used in API error bodies and logs
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Network(_) => "network",
            AppError::Parse(_) => "parse",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::Unavailable(_) => "unavailable",
            AppError::InsufficientData { .. } => "insufficient_data",
            AppError::UnknownSymbol(_) => "unknown_symbol",
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parse(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
