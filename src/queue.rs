//! Bounded blocking message queues
//!
//! Four independent instances hand work between the daemon's threads:
//! Worker, Sender, Responder, and Client. Each is a fixed-capacity FIFO
//! backed by a bounded crossbeam channel: producers block when the queue is
//! full, consumers block when it is empty, and both ends are safe for
//! concurrent multi-producer/multi-consumer use.
//!
//! A message that is obviously corrupt (empty payload, zero or odd
//! destination address) is rejected before it ever touches the queue; that
//! is a programming error upstream, not a transient condition.

use crate::error::{Error, Result};
use crate::protocol::Message;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

/// Fixed-capacity FIFO of [`Message`]s
///
/// Cloning yields another handle onto the same queue.
#[derive(Clone)]
pub struct MessageQueue {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl MessageQueue {
    /// Create a queue holding at most `capacity` messages
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidParameter(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        let (tx, rx) = bounded(capacity);
        Ok(Self { tx, rx })
    }

    /// Append a message, blocking while the queue is full
    ///
    /// Rejects without blocking when the message is empty or its
    /// destination address is zero or odd: such a message is corrupt or
    /// was never routed and must not enter the pipeline.
    pub fn post(&self, msg: &Message) -> Result<()> {
        if msg.is_empty() {
            return Err(Error::InvalidParameter(
                "refusing to queue an empty message".to_string(),
            ));
        }
        if msg.dst_addr == 0 || msg.dst_addr & 1 != 0 {
            return Err(Error::InvalidParameter(format!(
                "refusing to queue message with destination {:#04x}",
                msg.dst_addr
            )));
        }
        self.tx.send(*msg).map_err(|_| Error::QueueClosed)
    }

    /// Like [`post`](Self::post), but fail instead of blocking when full
    ///
    /// For producers that must never stall, such as a consumer posting
    /// back into its own input queue.
    pub fn try_post(&self, msg: &Message) -> Result<()> {
        if msg.is_empty() {
            return Err(Error::InvalidParameter(
                "refusing to queue an empty message".to_string(),
            ));
        }
        if msg.dst_addr == 0 || msg.dst_addr & 1 != 0 {
            return Err(Error::InvalidParameter(format!(
                "refusing to queue message with destination {:#04x}",
                msg.dst_addr
            )));
        }
        match self.tx.try_send(*msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(Error::QueueClosed),
        }
    }

    /// Remove and return the oldest message, blocking while empty
    pub fn get(&self) -> Result<Message> {
        self.rx.recv().map_err(|_| Error::QueueClosed)
    }

    /// Like [`get`](Self::get), but give up after `timeout`
    ///
    /// Returns `Ok(None)` on timeout so consumers can poll a shutdown flag
    /// between waits.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Option<Message>> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::QueueClosed),
        }
    }

    /// Drop every pending message
    ///
    /// Blocked producers resume as slots free up; consumers are not woken
    /// (there is nothing for them to consume). Used when the single
    /// downstream consumer has become unreachable.
    pub fn flush(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// Number of messages currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
