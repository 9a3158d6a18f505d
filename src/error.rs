use thiserror::Error;

#[derive(Debug, Error)]
pub enum BodegaError {
    #[error("config load failed: {0}")]
    Config(String),

    #[error("invalid config: {0}")]
    ConfigValidation(String),

    #[error("data store error: {0}")]
    Store(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}
