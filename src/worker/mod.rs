//! The delivery worker.
//!
//! One worker thread per client drains the outbox. Each drain cycle opens a
//! fresh session, upgrades it with STARTTLS when configured, logs in, then
//! sends queued messages one at a time:
//!
//! - accepted: a [`DeliveryEvent`] is emitted, then the worker pauses for the
//!   inter-message delay;
//! - rejected with a 5xx reply, or refused by the session before it reached
//!   the wire: the message is dropped, an [`ErrorEvent`] is emitted and
//!   draining continues, on a fresh session if the rejection closed this one;
//! - any other failure: the message goes back to the head of the outbox, an
//!   [`ErrorEvent`] is emitted and the cycle ends.
//!
//! When the outbox is empty the worker waits for a wake-up or shutdown. Every
//! await point races the shutdown signal.

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::{watch, Notify};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::{EncryptionMode, Settings};
use crate::events::ClientEvents;
use crate::observability::{DeliveryMetrics, Timer};
use crate::outbox::Outbox;
use crate::resilience::Backoff;
use crate::tls::TlsContext;
use crate::transport::{SessionConnector, SmtpSession};
use crate::types::{DeliveryEvent, ErrorEvent, QueuedMessage, WorkerState};

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "smtp-outbox-worker";

/// State shared between the client and its worker.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) outbox: Outbox,
    pub(crate) events: ClientEvents,
    pub(crate) metrics: DeliveryMetrics,
    pub(crate) wake: Notify,
    state: AtomicU8,
    in_flight: Mutex<Option<Arc<QueuedMessage>>>,
}

impl Shared {
    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        let previous = self.state.swap(state as u8, Ordering::AcqRel);
        if previous != state as u8 {
            debug!(from = %WorkerState::from_u8(previous), to = %state, "Worker state changed");
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<Arc<QueuedMessage>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pops the head and marks it as being sent.
    fn take_next(&self) -> Option<Arc<QueuedMessage>> {
        let mut in_flight = self.in_flight();
        let next = self.outbox.pop_front();
        *in_flight = next.clone();
        next
    }

    fn finish_in_flight(&self) {
        self.in_flight().take();
    }

    /// Puts the message being sent back at the head of the outbox.
    fn requeue_in_flight(&self) -> bool {
        let mut in_flight = self.in_flight();
        match in_flight.take() {
            Some(message) => {
                self.outbox.push_front(message);
                true
            }
            None => false,
        }
    }
}

/// Everything a worker needs, fixed at spawn time.
#[derive(Debug, Clone)]
pub(crate) struct WorkerContext {
    pub(crate) settings: Arc<Settings>,
    pub(crate) tls: Option<Arc<TlsContext>>,
    pub(crate) connector: Arc<dyn SessionConnector>,
    pub(crate) shared: Arc<Shared>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    /// The outbox was emptied.
    Drained,
    /// The session closed under a permanent rejection; reconnect right away.
    Reconnect,
    /// The cycle ended early, messages may remain.
    Aborted,
}

/// Spawns the worker thread.
pub(crate) fn spawn(
    context: WorkerContext,
    shutdown: watch::Receiver<bool>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!(error = %e, "Failed to start delivery worker runtime");
                    return;
                }
            };
            runtime.block_on(run(context, shutdown));
        })
}

async fn run(context: WorkerContext, mut shutdown: watch::Receiver<bool>) {
    let shared = Arc::clone(&context.shared);
    let mut backoff = Backoff::new(context.settings.retry().clone());
    debug!(host = %context.settings.host(), "Delivery worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        if shared.outbox.is_empty() {
            shared.set_state(WorkerState::Waiting);
            tokio::select! {
                _ = shared.wake.notified() => continue,
                _ = shutdown.changed() => break,
            }
        }

        let outcome = tokio::select! {
            outcome = run_cycle(&context) => outcome,
            _ = shutdown.changed() => {
                if shared.requeue_in_flight() {
                    debug!("Shutdown interrupted a send, message returned to the outbox");
                }
                break;
            }
        };

        match outcome {
            CycleOutcome::Drained => backoff.reset(),
            CycleOutcome::Reconnect => {
                backoff.reset();
                debug!(queued = shared.outbox.len(), "Reopening session to continue draining");
            }
            CycleOutcome::Aborted => {
                shared.metrics.record_cycle_aborted();
                if shared.outbox.is_empty() {
                    continue;
                }
                let delay = backoff.next_delay();
                shared.set_state(WorkerState::Idle);
                warn!(
                    queued = shared.outbox.len(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Drain cycle aborted, will reconnect"
                );
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
    }

    shared.set_state(WorkerState::Idle);
    debug!("Delivery worker stopped");
}

async fn run_cycle(context: &WorkerContext) -> CycleOutcome {
    let shared = &context.shared;
    let settings = &context.settings;
    let timer = Timer::start("drain_cycle");
    shared.metrics.record_cycle_started();

    shared.set_state(WorkerState::Connecting);
    let implicit_tls = match settings.encryption().mode() {
        EncryptionMode::ImplicitTls => context.tls.as_deref(),
        _ => None,
    };
    let connected = context
        .connector
        .connect(
            settings.host(),
            settings.port(),
            settings.io_timeout(),
            settings.hello_name(),
            implicit_tls,
        )
        .await;
    let mut session = match connected {
        Ok(session) => session,
        Err(e) => {
            shared.metrics.record_connection_failure();
            error!(address = %settings.address(), error = %e, "Failed to open SMTP session");
            shared.events.emit_error(&ErrorEvent::session(e));
            timer.stop();
            return CycleOutcome::Aborted;
        }
    };

    if settings.encryption().mode() == EncryptionMode::StartTls {
        if let Some(tls) = context.tls.as_deref() {
            let upgraded = session.start_tls(tls).await;
            shared.metrics.record_tls_upgrade(upgraded);
            if upgraded {
                debug!(host = %settings.host(), "Session upgraded with STARTTLS");
            } else {
                warn!(
                    host = %settings.host(),
                    "STARTTLS upgrade failed, continuing on the unencrypted session"
                );
            }
        }
    }

    let outcome = authenticate_and_drain(context, session.as_mut()).await;

    shared.set_state(WorkerState::Closing);
    if let Err(e) = session.close().await {
        warn!(error = %e, "Error closing SMTP session");
    }
    timer.stop();
    outcome
}

async fn authenticate_and_drain(
    context: &WorkerContext,
    session: &mut dyn SmtpSession,
) -> CycleOutcome {
    let shared = &context.shared;
    let settings = &context.settings;
    let credentials = settings.credentials();

    if credentials.login_method().requires_login() {
        shared.set_state(WorkerState::Authenticating);
        if let Err(e) = session
            .login(
                credentials.login_method(),
                credentials.username(),
                credentials.password(),
            )
            .await
        {
            shared.metrics.record_auth_failure();
            error!(
                method = %credentials.login_method(),
                username = %credentials.username(),
                error = %e,
                "SMTP login failed"
            );
            shared.events.emit_error(&ErrorEvent::session(e));
            return CycleOutcome::Aborted;
        }
    }

    shared.set_state(WorkerState::Draining);
    while let Some(queued) = shared.take_next() {
        if session.is_broken() {
            shared.requeue_in_flight();
            return CycleOutcome::Reconnect;
        }
        match session.send(queued.message()).await {
            Ok(()) => {
                shared.finish_in_flight();
                shared.metrics.record_delivered();
                info!(id = %queued.id(), subject = ?queued.subject(), "Message delivered");
                shared.events.emit_delivery(&DeliveryEvent::new(queued));

                let delay = settings.inter_message_delay();
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
            Err(e) if e.is_permanent() => {
                shared.finish_in_flight();
                shared.metrics.record_rejected();
                match e.smtp_code() {
                    Some(code) => warn!(
                        id = %queued.id(),
                        code = code,
                        error = %e,
                        "Message rejected permanently, dropping it"
                    ),
                    None => warn!(
                        id = %queued.id(),
                        kind = %e.kind(),
                        error = %e,
                        "Message cannot be sent over this session, dropping it"
                    ),
                }
                shared.events.emit_error(&ErrorEvent::message(e, queued, false));
            }
            Err(e) => {
                shared.requeue_in_flight();
                shared.metrics.record_requeued();
                warn!(
                    id = %queued.id(),
                    error = %e,
                    "Send failed, message returned to the head of the outbox"
                );
                shared.events.emit_error(&ErrorEvent::message(e, queued, true));
                return CycleOutcome::Aborted;
            }
        }
    }

    CycleOutcome::Drained
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::config::RetryConfig;
    use crate::mocks::MockConnector;
    use crate::types::test_message;
    use std::time::Duration;

    fn context(settings: Settings, connector: &Arc<MockConnector>) -> WorkerContext {
        WorkerContext {
            settings: Arc::new(settings),
            tls: None,
            connector: Arc::clone(connector) as Arc<dyn SessionConnector>,
            shared: Arc::new(Shared::default()),
        }
    }

    fn fast_settings() -> Settings {
        Settings::builder()
            .host("smtp.example.com")
            .inter_message_delay(Duration::ZERO)
            .retry(RetryConfig {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
                jitter: false,
            })
            .build()
            .unwrap()
    }

    fn enqueue(shared: &Shared, subject: &str) {
        shared
            .outbox
            .push(Arc::new(QueuedMessage::new(test_message(subject))));
    }

    #[tokio::test]
    async fn test_cycle_drains_in_order() {
        let connector = Arc::new(MockConnector::new());
        let ctx = context(fast_settings(), &connector);
        for subject in ["1", "2", "3"] {
            enqueue(&ctx.shared, subject);
        }

        assert_eq!(run_cycle(&ctx).await, CycleOutcome::Drained);
        assert_eq!(connector.delivered(), vec!["1", "2", "3"]);
        assert_eq!(connector.sessions_closed(), 1);
        assert!(ctx.shared.outbox.is_empty());
        assert_eq!(ctx.shared.metrics.snapshot().messages_delivered, 3);
    }

    #[tokio::test]
    async fn test_transient_failure_requeues_at_head() {
        let connector = Arc::new(MockConnector::new());
        connector.drop_connection_on("2", 1);
        let ctx = context(fast_settings(), &connector);
        for subject in ["1", "2", "3"] {
            enqueue(&ctx.shared, subject);
        }

        assert_eq!(run_cycle(&ctx).await, CycleOutcome::Aborted);
        assert_eq!(connector.delivered(), vec!["1"]);
        assert_eq!(ctx.shared.outbox.len(), 2);
        let head = ctx.shared.outbox.pop_front().unwrap();
        assert_eq!(head.subject(), Some("2"));
        assert_eq!(connector.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_drops_and_reconnects() {
        let connector = Arc::new(MockConnector::new());
        connector.reject_permanently("2", 550);
        let ctx = context(fast_settings(), &connector);
        for subject in ["1", "2", "3"] {
            enqueue(&ctx.shared, subject);
        }

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        ctx.shared.events.on_error(move |e| {
            sink.lock().unwrap().push((e.requeued, e.error.smtp_code()));
        });

        // The rejection closed the session, so "3" waits for the next one.
        assert_eq!(run_cycle(&ctx).await, CycleOutcome::Reconnect);
        assert_eq!(connector.delivered(), vec!["1"]);
        assert_eq!(ctx.shared.outbox.len(), 1);

        assert_eq!(run_cycle(&ctx).await, CycleOutcome::Drained);
        assert_eq!(connector.delivered(), vec!["1", "3"]);
        assert!(ctx.shared.outbox.is_empty());
        assert_eq!(*errors.lock().unwrap(), vec![(false, Some(550))]);

        let metrics = ctx.shared.metrics.snapshot();
        assert_eq!(metrics.messages_rejected, 1);
        assert_eq!(metrics.messages_requeued, 0);
        assert_eq!(connector.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn test_local_refusal_drops_and_keeps_session() {
        let connector = Arc::new(MockConnector::new());
        connector.refuse_locally("2");
        let ctx = context(fast_settings(), &connector);
        for subject in ["1", "2", "3"] {
            enqueue(&ctx.shared, subject);
        }

        assert_eq!(run_cycle(&ctx).await, CycleOutcome::Drained);
        assert_eq!(connector.delivered(), vec!["1", "3"]);
        assert_eq!(connector.sessions_opened(), 1);
        assert_eq!(ctx.shared.metrics.snapshot().messages_rejected, 1);
    }

    #[tokio::test]
    async fn test_login_failure_aborts_before_sending() {
        let connector = Arc::new(MockConnector::new());
        connector.fail_next_login(crate::errors::SmtpError::from_smtp_response(
            535,
            "Authentication credentials invalid",
        ));
        let settings = fast_settings()
            .into_builder()
            .credentials(Credentials::login("user", "wrong"))
            .build()
            .unwrap();
        let ctx = context(settings, &connector);
        enqueue(&ctx.shared, "1");

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        ctx.shared.events.on_error(move |e| {
            sink.lock().unwrap().push((e.message.is_none(), e.error.smtp_code()));
        });

        assert_eq!(run_cycle(&ctx).await, CycleOutcome::Aborted);
        assert!(connector.delivered().is_empty());
        assert_eq!(ctx.shared.outbox.len(), 1);
        assert_eq!(connector.sessions_closed(), 1);
        assert_eq!(*errors.lock().unwrap(), vec![(true, Some(535))]);
    }

    #[tokio::test]
    async fn test_connect_failure_keeps_messages() {
        let connector = Arc::new(MockConnector::new());
        connector.fail_next_connect(crate::errors::SmtpError::connection("refused"));
        let ctx = context(fast_settings(), &connector);
        enqueue(&ctx.shared, "1");

        assert_eq!(run_cycle(&ctx).await, CycleOutcome::Aborted);
        assert_eq!(ctx.shared.outbox.len(), 1);
        assert_eq!(connector.sessions_opened(), 0);
        assert_eq!(ctx.shared.metrics.snapshot().connection_failures, 1);
    }

    #[tokio::test]
    async fn test_shutdown_returns_in_flight_message() {
        let connector = Arc::new(MockConnector::new());
        connector.set_send_delay(Duration::from_secs(30));
        let ctx = context(fast_settings(), &connector);
        enqueue(&ctx.shared, "slow");
        enqueue(&ctx.shared, "next");

        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(run(ctx.clone(), rx));
        while connector.sessions_opened() == 0 || ctx.shared.outbox.len() != 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tx.send_replace(true);
        worker.await.unwrap();

        assert!(connector.delivered().is_empty());
        assert_eq!(ctx.shared.outbox.len(), 2);
        assert_eq!(ctx.shared.outbox.pop_front().unwrap().subject(), Some("slow"));
        assert_eq!(ctx.shared.state(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_worker_waits_for_wake() {
        let connector = Arc::new(MockConnector::new());
        let ctx = context(fast_settings(), &connector);
        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(run(ctx.clone(), rx));

        while ctx.shared.state() != WorkerState::Waiting {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        enqueue(&ctx.shared, "late");
        ctx.shared.wake.notify_one();
        while connector.delivered().is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        tx.send_replace(true);
        worker.await.unwrap();
        assert_eq!(connector.delivered(), vec!["late"]);
    }
}
