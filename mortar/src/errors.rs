//! Error types for the mortar agent

use thiserror::Error;

use brick_core::dispatch::DispatchError;
use brick_core::pool::PoolError;

/// Main error type for the mortar agent
#[derive(Error, Debug)]
pub enum MortarError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}
