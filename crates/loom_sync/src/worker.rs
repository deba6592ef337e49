//! Worker threads driven by named messages
//!
//! A `WorkerThread` owns an OS thread that blocks on its end of a channel and
//! routes every message through a [`Handlers`] table. The controller keeps the
//! other end: it sends commands and polls for replies without blocking.

use crate::channel::{self, Endpoint, Handlers, Outbox};
use crate::error::ChannelError;
use serde::Serialize;
use serde_json::Value;
use std::thread::{self, JoinHandle};

pub struct WorkerThread {
    name: String,
    endpoint: Endpoint,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Start a named worker. `init` runs on the new thread and builds the
    /// handler state; it receives the outbox for replies to the controller.
    pub fn spawn<S, F>(
        name: impl Into<String>,
        mut handlers: Handlers<S>,
        init: F,
    ) -> Result<Self, ChannelError>
    where
        S: 'static,
        F: FnOnce(Outbox) -> S + Send + 'static,
    {
        let name = name.into();
        let (controller, worker) = channel::pair();

        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let mut state = init(worker.outbox());
                tracing::debug!(worker = %thread_name, "worker started");
                let received = worker.listen(&mut handlers, &mut state);
                tracing::debug!(worker = %thread_name, received, "worker stopped");
            })
            .map_err(|source| ChannelError::Spawn {
                name: name.clone(),
                source,
            })?;

        Ok(Self {
            name,
            endpoint: controller,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send(
        &self,
        key: impl Into<String>,
        payload: impl Into<Value>,
    ) -> Result<(), ChannelError> {
        self.endpoint.send(key, payload)
    }

    pub fn send_serialized<T: Serialize>(
        &self,
        key: impl Into<String>,
        payload: &T,
    ) -> Result<(), ChannelError> {
        self.endpoint.send_serialized(key, payload)
    }

    pub fn outbox(&self) -> Outbox {
        self.endpoint.outbox()
    }

    /// Handle replies already sent by the worker. Never blocks.
    pub fn poll<S>(&self, handlers: &mut Handlers<S>, state: &mut S) -> usize {
        self.endpoint.poll(handlers, state)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Close the channel and wait for the thread to exit.
    pub fn terminate(mut self) -> Result<(), ChannelError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), ChannelError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.endpoint.close();
        handle.join().map_err(|_| ChannelError::WorkerPanicked {
            name: self.name.clone(),
        })
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!(worker = %self.name, error = %err, "worker did not shut down cleanly");
        }
    }
}

impl std::fmt::Debug for WorkerThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerThread")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}
