//! Error Types for the Review Catalog

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Tools surface catalog failures through the dispatcher's error payload.
impl From<CatalogError> for AgentError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidArgument(msg) => Self::ToolValidation(msg),
            other => Self::ToolExecution(other.to_string()),
        }
    }
}
