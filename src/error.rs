//! Top-level application error for the binary entry point.

use thiserror::Error;

use crate::config::LoadError;
use crate::infra::error::InfraError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] LoadError),

    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}
