//! The outbox client.
//!
//! [`Client`] owns the settings, the outbox, the event sink and the delivery
//! worker. Sending never blocks on the network: messages are queued and the
//! worker reports outcomes through the listeners registered on the client.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::JoinHandle;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::Message;
use tokio::sync::watch;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::errors::{SmtpError, SmtpErrorKind, SmtpResult};
use crate::events::{ClientEvents, DeliveryListener, ListenerId};
use crate::observability::MetricsSnapshot;
use crate::tls::{TlsContext, TlsGuard, TlsSubsystem};
use crate::transport::{LettreConnector, SessionConnector};
use crate::types::{DeliveryEvent, ErrorEvent, QueuedMessage, WorkerState};
use crate::worker::{self, Shared, WorkerContext};

/// Configuration fixed by the first successful `setup`.
struct Configured {
    settings: Arc<Settings>,
    tls: Option<Arc<TlsContext>>,
    _tls_guard: Option<TlsGuard>,
}

/// Asynchronous SMTP outbox client.
pub struct Client {
    configured: OnceLock<Configured>,
    shared: Arc<Shared>,
    connector: Arc<dyn SessionConnector>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl Client {
    /// Creates a client that delivers through lettre.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(LettreConnector::new()))
    }

    /// Creates a client that opens sessions through `connector`.
    pub fn with_connector(connector: Arc<dyn SessionConnector>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            configured: OnceLock::new(),
            shared: Arc::new(Shared::default()),
            connector,
            worker: Mutex::new(None),
            shutdown,
        }
    }

    /// Configures the client. Only the first successful call takes effect.
    pub fn setup(&self, settings: Settings) -> SmtpResult<()> {
        if self.configured.get().is_some() {
            error!("SMTP client setup called more than once");
            return Err(SmtpError::already_initialized());
        }

        settings.validate()?;

        let encryption = settings.encryption();
        let (tls_guard, tls) = if encryption.mode().uses_tls() {
            if encryption.is_degraded() {
                warn!(
                    host = %settings.host(),
                    verification = ?encryption.effective_verification(),
                    "TLS certificate verification is degraded for this client"
                );
            }
            let guard = TlsSubsystem::acquire();
            let context = guard.context(settings.host(), encryption)?;
            (Some(guard), Some(context))
        } else {
            if settings.credentials().login_method().exposes_secret() {
                warn!(
                    host = %settings.host(),
                    method = %settings.credentials().login_method(),
                    "Credentials will be sent over an unencrypted session"
                );
            }
            (None, None)
        };

        let configured = Configured {
            settings: Arc::new(settings),
            tls,
            _tls_guard: tls_guard,
        };

        if self.configured.set(configured).is_err() {
            error!("SMTP client setup called more than once");
            return Err(SmtpError::already_initialized());
        }

        if let Some(configured) = self.configured.get() {
            debug!(
                address = %configured.settings.address(),
                encryption = ?configured.settings.encryption().mode(),
                login = %configured.settings.credentials().login_method(),
                "SMTP client configured"
            );
        }
        Ok(())
    }

    /// Returns true once `setup` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.configured.get().is_some()
    }

    /// Returns the settings passed to `setup`.
    pub fn settings(&self) -> Option<Arc<Settings>> {
        self.configured.get().map(|c| Arc::clone(&c.settings))
    }

    /// Queues a message and returns its identifier.
    pub fn send(&self, message: Message) -> SmtpResult<Uuid> {
        let configured = self.configured.get().ok_or_else(|| {
            error!("Message sent before the SMTP client was set up");
            SmtpError::not_initialized()
        })?;

        let queued = Arc::new(QueuedMessage::new(message));
        let id = queued.id();
        debug!(id = %id, subject = ?queued.subject(), "Message queued");

        self.shared.outbox.push(queued);
        self.shared.metrics.record_queued();
        self.shared.wake.notify_one();
        self.ensure_worker(configured);
        Ok(id)
    }

    /// Queues a UTF-8 plain-text message.
    pub fn send_text(&self, to: &str, from: &str, subject: &str, body: &str) -> SmtpResult<Uuid> {
        let to: Mailbox = to.parse().map_err(|e| {
            SmtpError::message_error(
                SmtpErrorKind::InvalidRecipientAddress,
                format!("Invalid recipient address '{}'", to),
            )
            .with_cause(e)
        })?;
        let from: Mailbox = from.parse().map_err(|e| {
            SmtpError::message_error(
                SmtpErrorKind::InvalidFromAddress,
                format!("Invalid sender address '{}'", from),
            )
            .with_cause(e)
        })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| {
                SmtpError::message_error(SmtpErrorKind::EncodingFailed, "Failed to build message")
                    .with_cause(e)
            })?;

        self.send(message)
    }

    /// Returns the number of queued messages.
    pub fn outbox_size(&self) -> usize {
        self.shared.outbox.len()
    }

    /// Returns what the delivery worker is doing.
    pub fn worker_state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Returns the event sink.
    pub fn events(&self) -> &ClientEvents {
        &self.shared.events
    }

    /// Registers a listener.
    pub fn add_listener(&self, listener: Arc<dyn DeliveryListener>) -> ListenerId {
        self.shared.events.add_listener(listener)
    }

    /// Registers a closure called for every delivered message.
    pub fn on_delivery<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&DeliveryEvent) + Send + Sync + 'static,
    {
        self.shared.events.on_delivery(f)
    }

    /// Registers a closure called for every failure.
    pub fn on_error<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.shared.events.on_error(f)
    }

    /// Unregisters a listener.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.events.remove_listener(id)
    }

    /// Returns a snapshot of the delivery metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Starts the worker unless one is already running.
    fn ensure_worker(&self, configured: &Configured) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(worker.as_ref(), Some(handle) if !handle.is_finished()) {
            return;
        }

        if let Some(finished) = worker.take() {
            if finished.join().is_err() {
                error!("Delivery worker panicked, restarting it");
            }
        }

        let context = WorkerContext {
            settings: Arc::clone(&configured.settings),
            tls: configured.tls.clone(),
            connector: Arc::clone(&self.connector),
            shared: Arc::clone(&self.shared),
        };
        match worker::spawn(context, self.shutdown.subscribe()) {
            Ok(handle) => *worker = Some(handle),
            Err(e) => error!(error = %e, "Failed to spawn delivery worker"),
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        self.shared.wake.notify_one();

        let handle = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Delivery worker panicked during shutdown");
            }
        }

        let dropped = self.shared.outbox.clear();
        if dropped > 0 {
            warn!(dropped = dropped, "Discarding undelivered messages on shutdown");
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("initialized", &self.is_initialized())
            .field("outbox_size", &self.outbox_size())
            .field("worker_state", &self.worker_state())
            .finish()
    }
}
