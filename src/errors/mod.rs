//! Error types for the outbox client.
//!
//! Provides SMTP-aware error classification: reply codes and the
//! permanent/transient split the delivery worker uses to decide whether a
//! failed message is dropped or put back at the head of the outbox.

use std::fmt;
use thiserror::Error;

/// Result type for outbox operations.
pub type SmtpResult<T> = Result<T, SmtpError>;

/// SMTP error kinds categorizing different failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmtpErrorKind {
    // Connection errors
    /// Connection was refused.
    ConnectionRefused,
    /// Connection timed out.
    ConnectTimeout,
    /// Connection was reset or dropped mid-session.
    ConnectionReset,

    // TLS errors
    /// TLS handshake failed.
    TlsHandshakeFailed,
    /// A CA certificate could not be used.
    CertificateInvalid,

    // Authentication errors
    /// Credentials are invalid.
    CredentialsInvalid,
    /// Authentication method not supported.
    AuthMethodNotSupported,
    /// Authentication is required.
    AuthenticationRequired,

    // Protocol errors
    /// Invalid response from server.
    InvalidResponse,
    /// Unexpected response code.
    UnexpectedResponse,
    /// Server is shutting down (421).
    ServerShutdown,

    // Message errors
    /// Invalid sender address.
    InvalidFromAddress,
    /// Invalid recipient address.
    InvalidRecipientAddress,
    /// Message exceeds size limit.
    MessageTooLarge,
    /// Message could not be built or encoded.
    EncodingFailed,
    /// The session cannot carry this message, e.g. 8-bit content without 8BITMIME.
    UnsupportedEncoding,

    // Timeout errors
    /// Command or I/O timeout inside a session.
    CommandTimeout,

    // Client lifecycle errors
    /// `setup` was called on an already configured client.
    AlreadyInitialized,
    /// A message was sent before `setup`.
    NotInitialized,
    /// Configuration is invalid.
    ConfigurationInvalid,

    // Generic
    /// Unknown or internal error.
    Unknown,
}

impl fmt::Display for SmtpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtpErrorKind::ConnectionRefused => write!(f, "Connection refused"),
            SmtpErrorKind::ConnectTimeout => write!(f, "Connect timeout"),
            SmtpErrorKind::ConnectionReset => write!(f, "Connection reset"),
            SmtpErrorKind::TlsHandshakeFailed => write!(f, "TLS handshake failed"),
            SmtpErrorKind::CertificateInvalid => write!(f, "Invalid certificate"),
            SmtpErrorKind::CredentialsInvalid => write!(f, "Invalid credentials"),
            SmtpErrorKind::AuthMethodNotSupported => write!(f, "Auth method not supported"),
            SmtpErrorKind::AuthenticationRequired => write!(f, "Authentication required"),
            SmtpErrorKind::InvalidResponse => write!(f, "Invalid server response"),
            SmtpErrorKind::UnexpectedResponse => write!(f, "Unexpected response"),
            SmtpErrorKind::ServerShutdown => write!(f, "Server shutting down"),
            SmtpErrorKind::InvalidFromAddress => write!(f, "Invalid sender address"),
            SmtpErrorKind::InvalidRecipientAddress => write!(f, "Invalid recipient address"),
            SmtpErrorKind::MessageTooLarge => write!(f, "Message too large"),
            SmtpErrorKind::EncodingFailed => write!(f, "Encoding failed"),
            SmtpErrorKind::UnsupportedEncoding => write!(f, "Unsupported by session"),
            SmtpErrorKind::CommandTimeout => write!(f, "Command timeout"),
            SmtpErrorKind::AlreadyInitialized => write!(f, "Client already initialized"),
            SmtpErrorKind::NotInitialized => write!(f, "Client not initialized"),
            SmtpErrorKind::ConfigurationInvalid => write!(f, "Invalid configuration"),
            SmtpErrorKind::Unknown => write!(f, "Unknown error"),
        }
    }
}

/// SMTP error with detailed information.
#[derive(Error, Debug)]
pub struct SmtpError {
    /// Error kind.
    kind: SmtpErrorKind,
    /// Human-readable message.
    message: String,
    /// SMTP reply code if the server produced one.
    smtp_code: Option<u16>,
    /// Underlying cause.
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SmtpError {
    /// Creates a new SMTP error.
    pub fn new(kind: SmtpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            smtp_code: None,
            cause: None,
        }
    }

    /// Sets the SMTP reply code.
    pub fn with_smtp_code(mut self, code: u16) -> Self {
        self.smtp_code = Some(code);
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause<E: std::error::Error + Send + Sync + 'static>(mut self, cause: E) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> SmtpErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the SMTP reply code if available.
    pub fn smtp_code(&self) -> Option<u16> {
        self.smtp_code
    }

    /// Returns true if the message can never be delivered as it is.
    ///
    /// That is a 5xx reply, or a message the session refused to put on the
    /// wire at all. Such a message must never be retried: it would fail the
    /// same way on every cycle. Everything else, including errors that carry no
    /// reply code, is treated as transient.
    pub fn is_permanent(&self) -> bool {
        matches!(self.smtp_code, Some(code) if code / 100 == 5)
            || self.kind == SmtpErrorKind::UnsupportedEncoding
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        !self.is_permanent()
    }

    // Convenience constructors

    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::ConnectionRefused, message)
    }

    /// Creates a dropped-connection error.
    pub fn connection_reset(message: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::ConnectionReset, message)
    }

    /// Creates a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::TlsHandshakeFailed, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::CredentialsInvalid, message)
    }

    /// Creates a message error.
    pub fn message_error(kind: SmtpErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::ConfigurationInvalid, message)
    }

    /// Creates the error returned by a second `setup` call.
    pub fn already_initialized() -> Self {
        Self::new(
            SmtpErrorKind::AlreadyInitialized,
            "SMTP client is already initialized",
        )
    }

    /// Creates the error returned by `send` before `setup`.
    pub fn not_initialized() -> Self {
        Self::new(
            SmtpErrorKind::NotInitialized,
            "SMTP client is not initialized, call setup() first",
        )
    }

    /// Creates an error from an SMTP reply.
    pub fn from_smtp_response(code: u16, message: impl Into<String>) -> Self {
        let msg = message.into();
        let kind = match code {
            421 => SmtpErrorKind::ServerShutdown,
            450 | 451 | 452 => SmtpErrorKind::UnexpectedResponse,
            500 | 501 | 502 | 503 => SmtpErrorKind::InvalidResponse,
            530 => SmtpErrorKind::AuthenticationRequired,
            534 | 535 => SmtpErrorKind::CredentialsInvalid,
            550 | 551 => SmtpErrorKind::InvalidRecipientAddress,
            552 => SmtpErrorKind::MessageTooLarge,
            553 => SmtpErrorKind::InvalidFromAddress,
            400..=599 => SmtpErrorKind::UnexpectedResponse,
            _ => SmtpErrorKind::Unknown,
        };
        Self::new(kind, msg).with_smtp_code(code)
    }
}

impl fmt::Display for SmtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(code) = self.smtp_code {
            write!(f, " (SMTP {})", code)?;
        }
        Ok(())
    }
}

impl From<lettre::transport::smtp::Error> for SmtpError {
    fn from(error: lettre::transport::smtp::Error) -> Self {
        let message = error.to_string();
        let code = error
            .status()
            .and_then(|status| status.to_string().parse::<u16>().ok());

        let mapped = if let Some(code) = code {
            SmtpError::from_smtp_response(code, message)
        } else if error.is_timeout() {
            SmtpError::new(SmtpErrorKind::CommandTimeout, message)
        } else if error.is_tls() {
            SmtpError::tls(message)
        } else if error.is_client() {
            // Checked locally before any byte is sent; the session stays usable.
            SmtpError::new(SmtpErrorKind::UnsupportedEncoding, message)
        } else {
            SmtpError::connection_reset(message)
        };

        mapped.with_cause(error)
    }
}
