//! Named-message channel between two execution contexts
//!
//! Each message is an [`Envelope`] of `{key, payload}`. The receiving side
//! routes it to the handler registered under exactly that key; a key nobody
//! handles is dropped without error. Delivery is FIFO per direction.

use crate::error::ChannelError;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;

/// Every handler key starts with this.
pub const HANDLER_PREFIX: &str = "on";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub key: String,
    pub payload: Value,
}

#[derive(Debug)]
enum Frame {
    Message(Envelope),
    Close,
}

type Handler<S> = Box<dyn FnMut(&mut S, Value) + Send>;

/// Key → handler table operating on receiver state `S`.
pub struct Handlers<S> {
    table: HashMap<String, Handler<S>>,
}

impl<S> Handlers<S> {
    pub fn builder() -> HandlersBuilder<S> {
        HandlersBuilder {
            table: HashMap::new(),
            error: None,
        }
    }

    /// A table that ignores every message.
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Route `envelope` to its handler. Returns false for unmatched keys.
    pub fn dispatch(&mut self, state: &mut S, envelope: Envelope) -> bool {
        match self.table.get_mut(&envelope.key) {
            Some(handler) => {
                handler(state, envelope.payload);
                true
            }
            None => {
                tracing::trace!(key = %envelope.key, "no handler for message; ignored");
                false
            }
        }
    }
}

impl<S> fmt::Debug for Handlers<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Handlers").field("keys", &keys).finish()
    }
}

pub struct HandlersBuilder<S> {
    table: HashMap<String, Handler<S>>,
    error: Option<ChannelError>,
}

impl<S: 'static> HandlersBuilder<S> {
    /// Register a handler receiving the raw JSON payload.
    pub fn on<F>(mut self, key: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&mut S, Value) + Send + 'static,
    {
        let key = key.into();
        if self.error.is_some() {
            return self;
        }
        if key.len() <= HANDLER_PREFIX.len() || !key.starts_with(HANDLER_PREFIX) {
            self.error = Some(ChannelError::MissingPrefix {
                key,
                prefix: HANDLER_PREFIX,
            });
            return self;
        }
        if self.table.contains_key(&key) {
            self.error = Some(ChannelError::DuplicateKey { key });
            return self;
        }
        self.table.insert(key, Box::new(handler));
        self
    }

    /// Register a handler whose payload is decoded into `T` first. Payloads
    /// that fail to decode are logged and skipped.
    pub fn on_typed<T, F>(self, key: impl Into<String>, mut handler: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: FnMut(&mut S, T) + Send + 'static,
    {
        let key = key.into();
        let label = key.clone();
        self.on(key, move |state: &mut S, payload: Value| {
            match serde_json::from_value::<T>(payload) {
                Ok(value) => handler(state, value),
                Err(err) => {
                    tracing::warn!(key = %label, error = %err, "message payload did not decode");
                }
            }
        })
    }

    /// Finish the table, reporting the first invalid or duplicate key.
    pub fn build(self) -> Result<Handlers<S>, ChannelError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(Handlers { table: self.table }),
        }
    }
}

/// Two connected endpoints.
pub fn pair() -> (Endpoint, Endpoint) {
    let (left_tx, left_rx) = crossbeam_channel::unbounded();
    let (right_tx, right_rx) = crossbeam_channel::unbounded();
    (Endpoint::new(right_tx, left_rx), Endpoint::new(left_tx, right_rx))
}

/// Sending half that can be cloned and handed around.
#[derive(Clone)]
pub struct Outbox {
    sender: Sender<Frame>,
}

impl Outbox {
    pub fn send(
        &self,
        key: impl Into<String>,
        payload: impl Into<Value>,
    ) -> Result<(), ChannelError> {
        let envelope = Envelope {
            key: key.into(),
            payload: payload.into(),
        };
        self.sender
            .send(Frame::Message(envelope))
            .map_err(|_| ChannelError::Disconnected)
    }

    /// Serialize `payload` with serde and send it.
    pub fn send_serialized<T: Serialize>(
        &self,
        key: impl Into<String>,
        payload: &T,
    ) -> Result<(), ChannelError> {
        let value = serde_json::to_value(payload)?;
        self.send(key, value)
    }

    fn close(&self) {
        // The peer may already be gone, which is the outcome close wants.
        let _ = self.sender.send(Frame::Close);
    }
}

impl fmt::Debug for Outbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox").field("queued", &self.sender.len()).finish()
    }
}

/// One side of a channel: sends to the peer and receives from it.
pub struct Endpoint {
    outbox: Outbox,
    inbox: Receiver<Frame>,
    closed: Cell<bool>,
}

impl Endpoint {
    fn new(sender: Sender<Frame>, inbox: Receiver<Frame>) -> Self {
        Self {
            outbox: Outbox { sender },
            inbox,
            closed: Cell::new(false),
        }
    }

    pub fn send(
        &self,
        key: impl Into<String>,
        payload: impl Into<Value>,
    ) -> Result<(), ChannelError> {
        self.outbox.send(key, payload)
    }

    pub fn send_serialized<T: Serialize>(
        &self,
        key: impl Into<String>,
        payload: &T,
    ) -> Result<(), ChannelError> {
        self.outbox.send_serialized(key, payload)
    }

    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Handle everything already queued without blocking. Returns the number
    /// of messages received, matched or not.
    pub fn poll<S>(&self, handlers: &mut Handlers<S>, state: &mut S) -> usize {
        let mut received = 0;
        while !self.closed.get() {
            match self.inbox.try_recv() {
                Ok(Frame::Message(envelope)) => {
                    handlers.dispatch(state, envelope);
                    received += 1;
                }
                Ok(Frame::Close) | Err(TryRecvError::Disconnected) => self.closed.set(true),
                Err(TryRecvError::Empty) => break,
            }
        }
        received
    }

    /// Block handling messages until the peer closes or disappears. Returns
    /// the number of messages received.
    pub fn listen<S>(&self, handlers: &mut Handlers<S>, state: &mut S) -> usize {
        let mut received = 0;
        while !self.closed.get() {
            match self.inbox.recv() {
                Ok(Frame::Message(envelope)) => {
                    handlers.dispatch(state, envelope);
                    received += 1;
                }
                Ok(Frame::Close) | Err(_) => self.closed.set(true),
            }
        }
        received
    }

    /// Tell the peer no more messages are coming.
    pub fn close(&self) {
        self.outbox.close();
    }

    /// Whether the peer has closed or dropped its side.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("pending", &self.inbox.len())
            .field("closed", &self.closed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Inbox {
        seen: Vec<(String, Value)>,
    }

    fn recording(keys: &[&'static str]) -> Handlers<Inbox> {
        let mut builder = Handlers::builder();
        for &key in keys {
            builder = builder.on(key, move |inbox: &mut Inbox, payload| {
                inbox.seen.push((key.to_string(), payload));
            });
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_routes_by_exact_key() {
        let (left, right) = pair();
        let mut handlers = recording(&["onFoo", "onBar"]);
        let mut inbox = Inbox::default();

        left.send("onFoo", 42).unwrap();
        left.send("onfoo", 1).unwrap();
        left.send("onBar", "x").unwrap();

        assert_eq!(right.poll(&mut handlers, &mut inbox), 3);
        assert_eq!(
            inbox.seen,
            vec![
                ("onFoo".to_string(), json!(42)),
                ("onBar".to_string(), json!("x")),
            ]
        );
    }

    #[test]
    fn test_builder_rejects_bad_keys() {
        let duplicate = Handlers::<Inbox>::builder()
            .on("onTick", |_, _| {})
            .on("onTick", |_, _| {})
            .build();
        assert!(matches!(duplicate, Err(ChannelError::DuplicateKey { key }) if key == "onTick"));

        for bad in ["tick", "on", ""] {
            let result = Handlers::<Inbox>::builder().on(bad, |_, _| {}).build();
            assert!(
                matches!(result, Err(ChannelError::MissingPrefix { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_typed_handler_decodes_payload() {
        #[derive(Serialize, Deserialize)]
        struct Progress {
            done: u32,
        }

        let (left, right) = pair();
        let mut total = 0u32;
        let mut handlers = Handlers::builder()
            .on_typed("onProgress", |total: &mut u32, progress: Progress| {
                *total += progress.done;
            })
            .build()
            .unwrap();

        left.send_serialized("onProgress", &Progress { done: 3 }).unwrap();
        left.send("onProgress", "not an object").unwrap();
        left.send_serialized("onProgress", &Progress { done: 4 }).unwrap();

        right.poll(&mut handlers, &mut total);
        assert_eq!(total, 7);
    }

    #[test]
    fn test_close_and_disconnect_end_listening() {
        let (left, right) = pair();
        let mut handlers = recording(&["onPing"]);
        let mut inbox = Inbox::default();

        left.send("onPing", 1).unwrap();
        left.close();
        left.send("onPing", 2).unwrap();
        assert_eq!(right.listen(&mut handlers, &mut inbox), 1);
        assert!(right.is_closed());
        assert_eq!(right.poll(&mut handlers, &mut inbox), 0);

        let (left, right) = pair();
        drop(left);
        assert_eq!(right.poll(&mut handlers, &mut inbox), 0);
        assert!(right.is_closed());
        assert!(matches!(right.send("onPing", 3), Err(ChannelError::Disconnected)));
    }
}
