//! Error types for the conductor service

use thiserror::Error;
use uuid::Uuid;

use brick_core::dispatch::DispatchError;
use brick_core::pool::PoolError;
use brick_core::store::StoreError;

use crate::infra::InfraError;

/// Main error type for the conductor
#[derive(Error, Debug)]
pub enum ConductorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error("brick {0} has no instance assigned")]
    BrickWithoutInstance(Uuid),

    #[error("brick {brick_id} cannot {operation} while {status}")]
    InvalidTransition {
        brick_id: Uuid,
        operation: &'static str,
        status: brick_core::states::BrickStatus,
    },

    #[error("brick {brick_id} already has in-flight work, {operation} refused")]
    BrickBusy {
        brick_id: Uuid,
        operation: &'static str,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

impl ConductorError {
    /// True when the caller should re-read state and retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConductorError::Pool(PoolError::NoFreeWorker)
                | ConductorError::Store(StoreError::StaleState { .. })
                | ConductorError::BrickBusy { .. }
        )
    }
}
