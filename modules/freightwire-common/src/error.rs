use thiserror::Error;

pub type Result<T> = std::result::Result<T, FreightwireError>;

#[derive(Error, Debug)]
pub enum FreightwireError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<sqlx::Error> for FreightwireError {
    fn from(e: sqlx::Error) -> Self {
        FreightwireError::Database(e.to_string())
    }
}
