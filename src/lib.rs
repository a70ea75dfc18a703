//! # SMTP Outbox
//!
//! An asynchronous mail-dispatch client with:
//! - A thread-safe outbox drained by one background delivery worker
//! - Plaintext, implicit TLS and STARTTLS sessions
//! - LOGIN, PLAIN, CRAM-MD5, CRAM-SHA1 and XOAUTH2 authentication
//! - Retry of transient failures with the failed message first in line
//! - Delivery and error callbacks
//!
//! The SMTP wire protocol and MIME encoding come from [`lettre`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smtp_outbox::{Client, Settings};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new();
//!     client.setup(Settings::gmail("me@gmail.com", "app-password"))?;
//!
//!     client.on_delivery(|event| {
//!         println!("Delivered {:?}", event.message.subject());
//!     });
//!     client.on_error(|event| {
//!         eprintln!("Delivery failed: {}", event.error);
//!     });
//!
//!     client.send_text(
//!         "friend@example.com",
//!         "me@gmail.com",
//!         "Hello from Rust!",
//!         "This is a test email.",
//!     )?;
//!
//!     // Dropping the client stops the worker and discards undelivered messages.
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Authentication
pub mod auth;

// TLS subsystem
pub mod tls;

// Session layer
pub mod transport;

// Queueing and delivery
pub mod events;
pub mod outbox;
pub mod worker;

// Resilience
pub mod resilience;

// Observability
pub mod observability;

// Client
pub mod client;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use auth::{Credentials, LoginMethod};
pub use client::Client;
pub use config::{
    EncryptionMode, EncryptionPolicy, RetryConfig, Settings, SettingsBuilder, VerificationMode,
};
pub use errors::{SmtpError, SmtpErrorKind, SmtpResult};
pub use events::{ClientEvents, DeliveryListener, ListenerId};
pub use observability::{DeliveryMetrics, MetricsSnapshot};
pub use tls::{TlsContext, TlsGuard, TlsSubsystem};
pub use transport::{LettreConnector, SessionConnector, SmtpSession};
pub use types::{DeliveryEvent, ErrorEvent, QueuedMessage, WorkerState};

pub use lettre::Message;
