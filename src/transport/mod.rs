//! Session layer for SMTP delivery.
//!
//! The delivery worker drives servers only through [`SessionConnector`] and
//! [`SmtpSession`]. The production implementation wraps lettre's
//! `AsyncSmtpConnection`, which owns the wire protocol and MIME encoding.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use lettre::transport::smtp::authentication::{Credentials as LettreCredentials, Mechanism};
use lettre::transport::smtp::client::AsyncSmtpConnection;
use lettre::transport::smtp::extension::ClientId;
use lettre::Message;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::timeout;

use crate::auth::{Authenticator, LoginMethod};
use crate::errors::{SmtpError, SmtpErrorKind, SmtpResult};
use crate::tls::TlsContext;

/// Opens SMTP sessions.
#[async_trait]
pub trait SessionConnector: Send + Sync + fmt::Debug {
    /// Connects to `host:port` and completes the greeting.
    ///
    /// With `implicit_tls` the connection is encrypted from the first byte.
    async fn connect(
        &self,
        host: &str,
        port: u16,
        io_timeout: Duration,
        hello_name: Option<&str>,
        implicit_tls: Option<&TlsContext>,
    ) -> SmtpResult<Box<dyn SmtpSession>>;
}

/// An open SMTP session.
#[async_trait]
pub trait SmtpSession: Send + fmt::Debug {
    /// Authenticates with the given method. `LoginMethod::None` is a no-op.
    async fn login(
        &mut self,
        method: LoginMethod,
        username: &str,
        password: &SecretString,
    ) -> SmtpResult<()>;

    /// Upgrades the session with STARTTLS. Returns false if the upgrade failed.
    async fn start_tls(&mut self, context: &TlsContext) -> bool;

    /// Sends one message. Failures carry the server reply code when there is one.
    async fn send(&mut self, message: &Message) -> SmtpResult<()>;

    /// Returns true once the connection can no longer carry commands.
    ///
    /// A rejected send may leave the session closed even when the rejection
    /// was permanent and only concerned that one message.
    fn is_broken(&self) -> bool;

    /// Ends the session and closes the socket.
    async fn close(&mut self) -> SmtpResult<()>;
}

/// Connector backed by lettre.
#[derive(Debug, Default, Clone)]
pub struct LettreConnector;

impl LettreConnector {
    /// Creates a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionConnector for LettreConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        io_timeout: Duration,
        hello_name: Option<&str>,
        implicit_tls: Option<&TlsContext>,
    ) -> SmtpResult<Box<dyn SmtpSession>> {
        let client_id = match hello_name {
            Some(name) => ClientId::Domain(name.to_owned()),
            None => ClientId::default(),
        };
        let tls_parameters = implicit_tls.map(|context| context.parameters().clone());

        tracing::debug!(
            host = %host,
            port = port,
            implicit_tls = tls_parameters.is_some(),
            "Opening SMTP session"
        );

        let connection = timeout(
            io_timeout,
            AsyncSmtpConnection::connect_tokio1(
                (host, port),
                Some(io_timeout),
                &client_id,
                tls_parameters,
                None,
            ),
        )
        .await
        .map_err(|_| {
            SmtpError::new(
                SmtpErrorKind::ConnectTimeout,
                format!("Connect to {}:{} timed out", host, port),
            )
        })?
        .map_err(|e| map_connect_error(e, host, port))?;

        Ok(Box::new(LettreSession {
            connection,
            client_id,
            io_timeout,
            host: host.to_owned(),
        }))
    }
}

fn map_connect_error(error: lettre::transport::smtp::Error, host: &str, port: u16) -> SmtpError {
    if error.status().is_some() {
        return SmtpError::from(error);
    }
    let kind = if error.is_timeout() {
        SmtpErrorKind::ConnectTimeout
    } else if error.is_tls() {
        SmtpErrorKind::TlsHandshakeFailed
    } else {
        SmtpErrorKind::ConnectionRefused
    };
    SmtpError::new(kind, format!("Failed to connect to {}:{}", host, port)).with_cause(error)
}

async fn timed<T, F>(io_timeout: Duration, what: &str, operation: F) -> SmtpResult<T>
where
    F: Future<Output = Result<T, lettre::transport::smtp::Error>>,
{
    timeout(io_timeout, operation)
        .await
        .map_err(|_| SmtpError::new(SmtpErrorKind::CommandTimeout, format!("{} timed out", what)))?
        .map_err(SmtpError::from)
}

/// Session over a lettre `AsyncSmtpConnection`.
pub struct LettreSession {
    connection: AsyncSmtpConnection,
    client_id: ClientId,
    io_timeout: Duration,
    host: String,
}

impl fmt::Debug for LettreSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LettreSession")
            .field("host", &self.host)
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}

impl LettreSession {
    async fn cram_login(
        &mut self,
        method: LoginMethod,
        username: &str,
        password: &SecretString,
    ) -> SmtpResult<()> {
        let io_timeout = self.io_timeout;
        let command = format!("AUTH {}\r\n", method.mechanism_name());
        let challenge = timed(io_timeout, "AUTH", self.connection.command(command)).await?;

        let challenge = challenge.first_line().unwrap_or_default().trim().to_owned();
        let response = match method {
            LoginMethod::CramSha1 => {
                Authenticator::cram_sha1_response(&challenge, username, password)?
            }
            _ => Authenticator::cram_md5_response(&challenge, username, password)?,
        };

        timed(io_timeout, "AUTH", self.connection.command(format!("{}\r\n", response))).await?;
        Ok(())
    }
}

#[async_trait]
impl SmtpSession for LettreSession {
    async fn login(
        &mut self,
        method: LoginMethod,
        username: &str,
        password: &SecretString,
    ) -> SmtpResult<()> {
        let mechanism = match method {
            LoginMethod::None => return Ok(()),
            LoginMethod::Login => Mechanism::Login,
            LoginMethod::Plain => Mechanism::Plain,
            LoginMethod::XOAuth2 => Mechanism::Xoauth2,
            LoginMethod::CramMd5 | LoginMethod::CramSha1 => {
                tracing::debug!(method = %method, "Authenticating");
                return self.cram_login(method, username, password).await;
            }
        };

        tracing::debug!(method = %method, "Authenticating");
        let credentials =
            LettreCredentials::new(username.to_owned(), password.expose_secret().to_owned());
        let io_timeout = self.io_timeout;
        timeout(io_timeout, self.connection.auth(&[mechanism], &credentials))
            .await
            .map_err(|_| SmtpError::new(SmtpErrorKind::CommandTimeout, "AUTH timed out"))?
            .map_err(|e| {
                let mapped = SmtpError::from(e);
                if mapped.smtp_code().is_some() {
                    mapped
                } else {
                    SmtpError::authentication(mapped.message().to_owned())
                }
            })?;
        Ok(())
    }

    async fn start_tls(&mut self, context: &TlsContext) -> bool {
        if !self.connection.can_starttls() {
            tracing::warn!(host = %self.host, "Server does not advertise STARTTLS");
            return false;
        }

        let io_timeout = self.io_timeout;
        let upgrade = self
            .connection
            .starttls(context.parameters().clone(), &self.client_id);
        match timeout(io_timeout, upgrade).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(host = %self.host, error = %e, "STARTTLS failed");
                false
            }
            Err(_) => {
                tracing::warn!(host = %self.host, "STARTTLS timed out");
                false
            }
        }
    }

    async fn send(&mut self, message: &Message) -> SmtpResult<()> {
        let envelope = message.envelope().clone();
        let formatted = message.formatted();
        let io_timeout = self.io_timeout;
        let response = timed(io_timeout, "Send", self.connection.send(&envelope, &formatted)).await?;
        tracing::debug!(
            code = %response.code(),
            message = %response.first_line().unwrap_or_default(),
            "Message accepted"
        );
        Ok(())
    }

    fn is_broken(&self) -> bool {
        // lettre aborts the connection on any failed reply.
        self.connection.has_broken()
    }

    async fn close(&mut self) -> SmtpResult<()> {
        if self.connection.has_broken() {
            tracing::debug!(host = %self.host, "Session already closed");
            return Ok(());
        }
        let result = timed(self.io_timeout, "QUIT", self.connection.quit()).await;
        if result.is_err() {
            self.connection.abort().await;
        }
        result.map(|_| ())
    }
}
