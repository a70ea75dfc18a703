//! Mock implementations for testing.
//!
//! Provides a scripted session connector for London-School TDD: tests decide
//! which connects, logins, upgrades and sends fail, then inspect what the
//! delivery worker did.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lettre::Message;
use secrecy::SecretString;
use tokio::sync::watch;

use crate::auth::LoginMethod;
use crate::errors::{SmtpError, SmtpErrorKind, SmtpResult};
use crate::tls::TlsContext;
use crate::transport::{SessionConnector, SmtpSession};

#[derive(Debug)]
struct MockState {
    connect_failures: VecDeque<SmtpError>,
    login_failures: VecDeque<SmtpError>,
    starttls_result: bool,
    permanent_rejections: HashMap<String, u16>,
    local_refusals: HashSet<String>,
    connection_drops: HashMap<String, usize>,
    send_delay: Option<Duration>,
    delivered: Vec<String>,
    logins: Vec<(LoginMethod, String)>,
    starttls_attempts: usize,
    implicit_tls_connects: usize,
    sessions_opened: usize,
    sessions_closed: usize,
    active_sessions: usize,
    max_concurrent_sessions: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            connect_failures: VecDeque::new(),
            login_failures: VecDeque::new(),
            starttls_result: true,
            permanent_rejections: HashMap::new(),
            local_refusals: HashSet::new(),
            connection_drops: HashMap::new(),
            send_delay: None,
            delivered: Vec::new(),
            logins: Vec::new(),
            starttls_attempts: 0,
            implicit_tls_connects: 0,
            sessions_opened: 0,
            sessions_closed: 0,
            active_sessions: 0,
            max_concurrent_sessions: 0,
        }
    }
}

type SharedState = Arc<Mutex<MockState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn subject_of(message: &Message) -> String {
    message
        .headers()
        .get_raw("Subject")
        .unwrap_or_default()
        .to_string()
}

/// Mock session connector for testing.
#[derive(Debug)]
pub struct MockConnector {
    state: SharedState,
    /// Connections wait while the gate is closed.
    gate: watch::Sender<bool>,
}

impl MockConnector {
    /// Creates a connector whose sessions accept everything.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            gate,
        }
    }

    /// Makes the next connect attempt fail.
    pub fn fail_next_connect(&self, error: SmtpError) -> &Self {
        lock(&self.state).connect_failures.push_back(error);
        self
    }

    /// Makes the next login fail.
    pub fn fail_next_login(&self, error: SmtpError) -> &Self {
        lock(&self.state).login_failures.push_back(error);
        self
    }

    /// Sets the outcome of every STARTTLS attempt.
    pub fn set_starttls_result(&self, upgraded: bool) -> &Self {
        lock(&self.state).starttls_result = upgraded;
        self
    }

    /// Rejects every send of the message with this subject.
    ///
    /// Like any failed reply, the rejection breaks the session.
    pub fn reject_permanently(&self, subject: &str, code: u16) -> &Self {
        lock(&self.state)
            .permanent_rejections
            .insert(subject.to_string(), code);
        self
    }

    /// Refuses the message with this subject before it reaches the wire.
    /// The session stays usable.
    pub fn refuse_locally(&self, subject: &str) -> &Self {
        lock(&self.state)
            .local_refusals
            .insert(subject.to_string());
        self
    }

    /// Drops the connection the next `times` sends of this subject.
    pub fn drop_connection_on(&self, subject: &str, times: usize) -> &Self {
        lock(&self.state)
            .connection_drops
            .insert(subject.to_string(), times);
        self
    }

    /// Makes every send take this long.
    pub fn set_send_delay(&self, delay: Duration) -> &Self {
        lock(&self.state).send_delay = Some(delay);
        self
    }

    /// Holds new connections until [`MockConnector::release_connections`].
    pub fn hold_connections(&self) {
        self.gate.send_replace(false);
    }

    /// Lets held connections proceed.
    pub fn release_connections(&self) {
        self.gate.send_replace(true);
    }

    /// Returns the subjects of delivered messages, in order.
    pub fn delivered(&self) -> Vec<String> {
        lock(&self.state).delivered.clone()
    }

    /// Returns the recorded logins.
    pub fn logins(&self) -> Vec<(LoginMethod, String)> {
        lock(&self.state).logins.clone()
    }

    /// Returns how many STARTTLS upgrades were attempted.
    pub fn starttls_attempts(&self) -> usize {
        lock(&self.state).starttls_attempts
    }

    /// Returns how many sessions were opened with implicit TLS.
    pub fn implicit_tls_connects(&self) -> usize {
        lock(&self.state).implicit_tls_connects
    }

    /// Returns how many sessions were opened.
    pub fn sessions_opened(&self) -> usize {
        lock(&self.state).sessions_opened
    }

    /// Returns how many sessions were closed with `close`.
    pub fn sessions_closed(&self) -> usize {
        lock(&self.state).sessions_closed
    }

    /// Returns the highest number of sessions open at once.
    pub fn max_concurrent_sessions(&self) -> usize {
        lock(&self.state).max_concurrent_sessions
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(
        &self,
        _host: &str,
        _port: u16,
        _io_timeout: Duration,
        _hello_name: Option<&str>,
        implicit_tls: Option<&TlsContext>,
    ) -> SmtpResult<Box<dyn SmtpSession>> {
        let mut gate = self.gate.subscribe();
        // A closed sender cannot happen while `self` is alive.
        let _ = gate.wait_for(|open| *open).await;

        let mut state = lock(&self.state);
        if let Some(error) = state.connect_failures.pop_front() {
            return Err(error);
        }
        if implicit_tls.is_some() {
            state.implicit_tls_connects += 1;
        }
        state.sessions_opened += 1;
        state.active_sessions += 1;
        state.max_concurrent_sessions = state.max_concurrent_sessions.max(state.active_sessions);

        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            broken: false,
        }))
    }
}

/// Session handed out by [`MockConnector`].
///
/// Mirrors lettre: a failed reply closes the connection, so every later
/// send fails with a transport error.
#[derive(Debug)]
pub struct MockSession {
    state: SharedState,
    broken: bool,
}

#[async_trait]
impl SmtpSession for MockSession {
    async fn login(
        &mut self,
        method: LoginMethod,
        username: &str,
        _password: &SecretString,
    ) -> SmtpResult<()> {
        let mut state = lock(&self.state);
        state.logins.push((method, username.to_string()));
        match state.login_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn start_tls(&mut self, _context: &TlsContext) -> bool {
        let mut state = lock(&self.state);
        state.starttls_attempts += 1;
        state.starttls_result
    }

    async fn send(&mut self, message: &Message) -> SmtpResult<()> {
        if self.broken {
            return Err(SmtpError::connection_reset("network error: Broken pipe"));
        }
        let subject = subject_of(message);

        let delay = lock(&self.state).send_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        if state.local_refusals.contains(&subject) {
            return Err(SmtpError::new(
                SmtpErrorKind::UnsupportedEncoding,
                "Message contains non-ascii chars but server does not support 8BITMIME",
            ));
        }
        if let Some(code) = state.permanent_rejections.get(&subject) {
            self.broken = true;
            return Err(SmtpError::from_smtp_response(*code, "Requested action not taken"));
        }
        if let Some(remaining) = state.connection_drops.get_mut(&subject) {
            if *remaining > 0 {
                *remaining -= 1;
                self.broken = true;
                return Err(SmtpError::connection_reset("Server closed connection"));
            }
        }
        state.delivered.push(subject);
        Ok(())
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    async fn close(&mut self) -> SmtpResult<()> {
        lock(&self.state).sessions_closed += 1;
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.active_sessions = state.active_sessions.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_message;

    async fn open(connector: &MockConnector) -> Box<dyn SmtpSession> {
        connector
            .connect("localhost", 25, Duration::from_secs(1), None, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_scripted_send_outcomes() {
        let connector = MockConnector::new();
        connector
            .reject_permanently("bad", 550)
            .drop_connection_on("flaky", 1)
            .refuse_locally("8bit");

        let mut session = open(&connector).await;
        assert!(session.send(&test_message("ok")).await.is_ok());
        assert!(session.send(&test_message("8bit")).await.unwrap_err().is_permanent());
        assert!(!session.is_broken());
        assert!(session.send(&test_message("flaky")).await.unwrap_err().is_transient());
        assert!(session.is_broken());
        session.close().await.unwrap();

        let mut session = open(&connector).await;
        assert!(session.send(&test_message("flaky")).await.is_ok());
        session.close().await.unwrap();

        assert_eq!(connector.delivered(), vec!["ok", "flaky"]);
        assert_eq!(connector.sessions_closed(), 2);
    }

    #[tokio::test]
    async fn test_rejection_breaks_session() {
        let connector = MockConnector::new();
        connector.reject_permanently("bad", 550);

        let mut session = open(&connector).await;
        assert!(session.send(&test_message("bad")).await.unwrap_err().is_permanent());
        assert!(session.is_broken());

        let err = session.send(&test_message("innocent")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(connector.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_tracking() {
        let connector = MockConnector::new();
        let a = connector
            .connect("localhost", 25, Duration::from_secs(1), None, None)
            .await
            .unwrap();
        let b = connector
            .connect("localhost", 25, Duration::from_secs(1), None, None)
            .await
            .unwrap();
        drop(a);
        drop(b);
        assert_eq!(connector.sessions_opened(), 2);
        assert_eq!(connector.max_concurrent_sessions(), 2);
    }

    #[tokio::test]
    async fn test_scripted_connect_failure() {
        let connector = MockConnector::new();
        connector.fail_next_connect(SmtpError::connection("refused"));
        assert!(connector
            .connect("localhost", 25, Duration::from_secs(1), None, None)
            .await
            .is_err());
        assert!(connector
            .connect("localhost", 25, Duration::from_secs(1), None, None)
            .await
            .is_ok());
    }
}
