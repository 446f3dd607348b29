pub mod collab;
pub mod gateway;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
    #[error("Collaborator dispatch failed: {0}")]
    DispatchError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
