use crate::ecs::{SystemId, SystemRegistrationError};
use std::error::Error as StdError;
use thiserror::Error;

/// Boxed error returned by system hooks.
pub type HookError = Box<dyn StdError + Send + Sync + 'static>;

/// Lifecycle errors for an already-registered system.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("no system with id {id}")]
    Unknown { id: SystemId },

    #[error("system {id} has been destroyed")]
    Destroyed { id: SystemId },

    #[error("system '{name}' failed to start")]
    StartFailed {
        name: String,
        #[source]
        source: HookError,
    },
}

/// Umbrella error for World operations.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    Registration(#[from] SystemRegistrationError),

    #[error(transparent)]
    System(#[from] SystemError),
}
