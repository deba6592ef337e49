use std::io;
use thiserror::Error;

/// Errors from binding mutex handles to a shared word.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("mutex word is private to its context and cannot be connected to")]
    PrivateWord,

    #[error("shared word holds {value}, expected 0 (unlocked) or 1 (locked)")]
    InvalidWordValue { value: u32 },
}

/// Errors from building handler tables, sending messages and managing
/// worker threads.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("handler '{key}' is registered twice")]
    DuplicateKey { key: String },

    #[error("handler key '{key}' must start with '{prefix}' followed by a name")]
    MissingPrefix { key: String, prefix: &'static str },

    #[error("the other end of the channel is gone")]
    Disconnected,

    #[error("failed to encode message payload")]
    Encode(#[from] serde_json::Error),

    #[error("failed to spawn worker '{name}'")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("worker '{name}' panicked")]
    WorkerPanicked { name: String },
}
