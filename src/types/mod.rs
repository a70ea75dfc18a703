//! Core types for the outbox client.
//!
//! This module provides:
//! - The queued message envelope
//! - Delivery and error event records
//! - The delivery worker state

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lettre::Message;
use uuid::Uuid;

use crate::errors::SmtpError;

/// A message waiting in, or taken from, the outbox.
#[derive(Debug)]
pub struct QueuedMessage {
    id: Uuid,
    message: Message,
    enqueued_at: DateTime<Utc>,
}

impl QueuedMessage {
    /// Wraps a message with a fresh identifier.
    pub fn new(message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            enqueued_at: Utc::now(),
        }
    }

    /// Returns the identifier returned by `Client::send`.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Returns when the message entered the outbox.
    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    /// Returns the raw Subject header, if any.
    pub fn subject(&self) -> Option<&str> {
        self.message.headers().get_raw("Subject")
    }
}

/// A message was accepted by the server.
#[derive(Debug, Clone)]
pub struct DeliveryEvent {
    /// The delivered message.
    pub message: Arc<QueuedMessage>,
    /// When the server accepted it.
    pub delivered_at: DateTime<Utc>,
}

impl DeliveryEvent {
    /// Creates an event stamped now.
    pub fn new(message: Arc<QueuedMessage>) -> Self {
        Self {
            message,
            delivered_at: Utc::now(),
        }
    }
}

/// A delivery cycle or a single message failed.
#[derive(Debug)]
pub struct ErrorEvent {
    /// The classified failure.
    pub error: SmtpError,
    /// The message involved, absent for session-level failures.
    pub message: Option<Arc<QueuedMessage>>,
    /// True if the message was put back at the head of the outbox.
    pub requeued: bool,
}

impl ErrorEvent {
    /// A failure not tied to any message (connect, TLS, login).
    pub fn session(error: SmtpError) -> Self {
        Self {
            error,
            message: None,
            requeued: false,
        }
    }

    /// A failure sending `message`.
    pub fn message(error: SmtpError, message: Arc<QueuedMessage>, requeued: bool) -> Self {
        Self {
            error,
            message: Some(message),
            requeued,
        }
    }
}

/// Delivery worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// No worker activity.
    Idle = 0,
    /// Opening the session.
    Connecting = 1,
    /// Logging in.
    Authenticating = 2,
    /// Sending queued messages.
    Draining = 3,
    /// Closing the session.
    Closing = 4,
    /// Suspended until a message arrives or the client shuts down.
    Waiting = 5,
}

impl WorkerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Connecting,
            2 => WorkerState::Authenticating,
            3 => WorkerState::Draining,
            4 => WorkerState::Closing,
            5 => WorkerState::Waiting,
            _ => WorkerState::Idle,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Connecting => "connecting",
            WorkerState::Authenticating => "authenticating",
            WorkerState::Draining => "draining",
            WorkerState::Closing => "closing",
            WorkerState::Waiting => "waiting",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
pub(crate) fn test_message(subject: &str) -> Message {
    Message::builder()
        .from("Sender <sender@example.com>".parse().unwrap())
        .to("rcpt@example.com".parse().unwrap())
        .subject(subject)
        .body(String::from("body"))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queued_message_subject_and_id() {
        let a = QueuedMessage::new(test_message("hello"));
        let b = QueuedMessage::new(test_message("hello"));
        assert_eq!(a.subject(), Some("hello"));
        assert_ne!(a.id(), b.id());
        assert!(a.enqueued_at() <= Utc::now());
    }

    #[test]
    fn test_error_event_constructors() {
        let session = ErrorEvent::session(SmtpError::connection("refused"));
        assert!(session.message.is_none());
        assert!(!session.requeued);

        let queued = Arc::new(QueuedMessage::new(test_message("x")));
        let event = ErrorEvent::message(SmtpError::connection_reset("eof"), queued, true);
        assert!(event.requeued);
        assert_eq!(event.message.unwrap().subject(), Some("x"));
    }

    #[test]
    fn test_worker_state_roundtrip() {
        for state in [
            WorkerState::Idle,
            WorkerState::Connecting,
            WorkerState::Authenticating,
            WorkerState::Draining,
            WorkerState::Closing,
            WorkerState::Waiting,
        ] {
            assert_eq!(WorkerState::from_u8(state as u8), state);
        }
        assert_eq!(WorkerState::Draining.to_string(), "draining");
    }
}
