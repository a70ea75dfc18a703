//! Configuration types for the outbox client.
//!
//! Provides immutable configuration values with a builder for:
//! - Server connection settings
//! - Encryption policy and certificate verification
//! - Authentication credentials
//! - Pacing and reconnect backoff

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{Credentials, LoginMethod};
use crate::errors::{SmtpError, SmtpResult};

/// Default SMTP port (plain relay).
pub const DEFAULT_PORT: u16 = 25;

/// Default port for implicit TLS (SMTPS).
pub const DEFAULT_IMPLICIT_TLS_PORT: u16 = 465;

/// Default port for submission with STARTTLS.
pub const DEFAULT_STARTTLS_PORT: u16 = 587;

/// Default timeout for connect and session I/O.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Default pause after each delivered message.
pub const DEFAULT_INTER_MESSAGE_DELAY: Duration = Duration::from_millis(100);

/// Gmail submission host.
pub const GMAIL_HOST: &str = "smtp.gmail.com";

/// Encryption applied to the SMTP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionMode {
    /// Plaintext session.
    #[default]
    None,
    /// TLS from the first byte (port 465).
    ImplicitTls,
    /// Plaintext greeting upgraded with STARTTLS (port 587).
    StartTls,
}

impl EncryptionMode {
    /// Returns true if the session needs a TLS client context.
    pub fn uses_tls(&self) -> bool {
        !matches!(self, EncryptionMode::None)
    }
}

/// Server certificate verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// Accept any certificate.
    None,
    /// Verify when trust anchors are available, otherwise accept.
    #[default]
    Relaxed,
    /// Always verify.
    Strict,
    /// Always verify, once per cached context.
    Once,
}

/// Encryption mode plus the trust material used to verify the server.
///
/// The CA bundle is read when the policy is built. A bundle that cannot be
/// loaded never fails construction. Instead the policy is marked degraded:
/// `Relaxed` and `None` verification fall back to accepting any certificate,
/// while `Strict` and `Once` fall back to the built-in web PKI roots.
/// Callers that care should check [`EncryptionPolicy::is_degraded`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EncryptionPolicyConfig")]
pub struct EncryptionPolicy {
    mode: EncryptionMode,
    ca_file: Option<PathBuf>,
    verification: VerificationMode,
    #[serde(skip)]
    ca_certificates: Vec<Vec<u8>>,
    #[serde(skip)]
    degraded: bool,
}

#[derive(Deserialize)]
struct EncryptionPolicyConfig {
    #[serde(default)]
    mode: EncryptionMode,
    #[serde(default)]
    ca_file: Option<PathBuf>,
    #[serde(default)]
    verification: VerificationMode,
}

impl From<EncryptionPolicyConfig> for EncryptionPolicy {
    fn from(raw: EncryptionPolicyConfig) -> Self {
        EncryptionPolicy::new(raw.mode, raw.ca_file, raw.verification)
    }
}

impl EncryptionPolicy {
    /// Builds a policy, loading the CA bundle if one is given and TLS is in use.
    pub fn new(
        mode: EncryptionMode,
        ca_file: Option<PathBuf>,
        verification: VerificationMode,
    ) -> Self {
        let mut policy = Self {
            mode,
            ca_file,
            verification,
            ca_certificates: Vec::new(),
            degraded: false,
        };

        if !mode.uses_tls() {
            return policy;
        }

        if let Some(path) = policy.ca_file.clone() {
            match load_ca_bundle(&path) {
                Ok(certs) if !certs.is_empty() => {
                    debug!(path = %path.display(), count = certs.len(), "Loaded CA bundle");
                    policy.ca_certificates = certs;
                }
                Ok(_) => {
                    policy.degraded = true;
                    warn!(
                        path = %path.display(),
                        fallback = ?policy.effective_verification(),
                        "CA bundle contains no certificates, certificate verification degraded"
                    );
                }
                Err(e) => {
                    policy.degraded = true;
                    warn!(
                        path = %path.display(),
                        error = %e,
                        fallback = ?policy.effective_verification(),
                        "CA bundle could not be loaded, certificate verification degraded"
                    );
                }
            }
        }

        policy
    }

    /// Plaintext policy.
    pub fn none() -> Self {
        Self::new(EncryptionMode::None, None, VerificationMode::default())
    }

    /// Implicit TLS verified against the built-in roots.
    pub fn implicit_tls() -> Self {
        Self::new(EncryptionMode::ImplicitTls, None, VerificationMode::default())
    }

    /// STARTTLS verified against the built-in roots.
    pub fn starttls() -> Self {
        Self::new(EncryptionMode::StartTls, None, VerificationMode::default())
    }

    /// Returns the encryption mode.
    pub fn mode(&self) -> EncryptionMode {
        self.mode
    }

    /// Returns the configured CA bundle path.
    pub fn ca_file(&self) -> Option<&Path> {
        self.ca_file.as_deref()
    }

    /// Returns the requested verification mode.
    pub fn verification(&self) -> VerificationMode {
        self.verification
    }

    /// Returns the DER encoded certificates loaded from the CA bundle.
    pub fn ca_certificates(&self) -> &[Vec<u8>] {
        &self.ca_certificates
    }

    /// Returns true if a configured CA bundle could not be used.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Returns the verification actually applied to TLS sessions.
    pub fn effective_verification(&self) -> VerificationMode {
        match (self.degraded, self.verification) {
            (true, VerificationMode::Relaxed) => VerificationMode::None,
            (_, mode) => mode,
        }
    }

    /// Returns true if server certificates are accepted without verification.
    pub fn accepts_invalid_certs(&self) -> bool {
        self.effective_verification() == VerificationMode::None
    }
}

impl Default for EncryptionPolicy {
    fn default() -> Self {
        Self::none()
    }
}

fn load_ca_bundle(path: &Path) -> std::io::Result<Vec<Vec<u8>>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::certs(&mut reader)
        .map(|cert| cert.map(|der| der.as_ref().to_vec()))
        .collect()
}

/// Reconnect backoff between failed drain cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay after the first failed cycle.
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound for the delay.
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    /// Backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Enable jitter.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_true() -> bool { true }
fn default_initial_delay() -> Duration { Duration::from_secs(1) }
fn default_max_delay() -> Duration { Duration::from_secs(60) }
fn default_multiplier() -> f64 { 2.0 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

/// Client settings, passed once to `Client::setup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    credentials: Credentials,
    #[serde(default)]
    encryption: EncryptionPolicy,
    #[serde(default = "default_io_timeout", with = "humantime_serde")]
    io_timeout: Duration,
    #[serde(default = "default_inter_message_delay", with = "humantime_serde")]
    inter_message_delay: Duration,
    #[serde(default)]
    hello_name: Option<String>,
    #[serde(default)]
    retry: RetryConfig,
}

fn default_port() -> u16 { DEFAULT_PORT }
fn default_io_timeout() -> Duration { DEFAULT_IO_TIMEOUT }
fn default_inter_message_delay() -> Duration { DEFAULT_INTER_MESSAGE_DELAY }

impl Settings {
    /// Creates a new settings builder.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Plaintext settings without authentication.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: Credentials::none(),
            encryption: EncryptionPolicy::none(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            inter_message_delay: DEFAULT_INTER_MESSAGE_DELAY,
            hello_name: None,
            retry: RetryConfig::default(),
        }
    }

    /// Implicit TLS on port 465.
    pub fn with_implicit_tls(host: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            credentials,
            encryption: EncryptionPolicy::implicit_tls(),
            ..Self::new(host, DEFAULT_IMPLICIT_TLS_PORT)
        }
    }

    /// STARTTLS on port 587.
    pub fn with_starttls(host: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            credentials,
            encryption: EncryptionPolicy::starttls(),
            ..Self::new(host, DEFAULT_STARTTLS_PORT)
        }
    }

    /// Gmail submission: STARTTLS on 587 with LOGIN.
    pub fn gmail(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_starttls(GMAIL_HOST, Credentials::login(username, password))
    }

    /// Loads settings from `SMTP_*` environment variables.
    pub fn from_env() -> SmtpResult<Self> {
        let host = std::env::var("SMTP_HOST").map_err(|_| {
            SmtpError::configuration("SMTP_HOST environment variable not set")
        })?;

        let mut builder = SettingsBuilder::default().host(host);

        if let Ok(port) = std::env::var("SMTP_PORT") {
            let port = port.parse::<u16>().map_err(|e| {
                SmtpError::configuration(format!("Invalid SMTP_PORT '{}': {}", port, e))
            })?;
            builder = builder.port(port);
        }

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();
        let method = match std::env::var("SMTP_LOGIN_METHOD") {
            Ok(method) => method.parse::<LoginMethod>()?,
            Err(_) if !username.is_empty() => LoginMethod::Login,
            Err(_) => LoginMethod::None,
        };
        builder = builder.credentials(Credentials::new(username, password, method));

        let mode = match std::env::var("SMTP_ENCRYPTION") {
            Ok(mode) => parse_encryption_mode(&mode)?,
            Err(_) => EncryptionMode::None,
        };
        let ca_file = std::env::var("SMTP_CA_FILE").ok().map(PathBuf::from);
        builder = builder.encryption(EncryptionPolicy::new(
            mode,
            ca_file,
            VerificationMode::default(),
        ));

        if let Ok(timeout) = std::env::var("SMTP_TIMEOUT") {
            builder = builder.io_timeout(parse_env_duration("SMTP_TIMEOUT", &timeout)?);
        }

        if let Ok(delay) = std::env::var("SMTP_MESSAGE_SEND_DELAY") {
            builder = builder
                .inter_message_delay(parse_env_duration("SMTP_MESSAGE_SEND_DELAY", &delay)?);
        }

        builder.build()
    }

    /// Validates the settings.
    pub fn validate(&self) -> SmtpResult<()> {
        if self.host.trim().is_empty() {
            return Err(SmtpError::configuration("Host is required"));
        }

        if self.port == 0 {
            return Err(SmtpError::configuration("Port must be non-zero"));
        }

        if self.io_timeout == Duration::ZERO {
            return Err(SmtpError::configuration("io_timeout must be positive"));
        }

        if self.credentials.login_method().requires_login()
            && self.credentials.username().is_empty()
        {
            return Err(SmtpError::configuration(format!(
                "{} login requires a username",
                self.credentials.login_method()
            )));
        }

        if self.retry.multiplier < 1.0 {
            return Err(SmtpError::configuration("retry multiplier must be at least 1.0"));
        }

        Ok(())
    }

    /// Returns a builder seeded with these settings.
    pub fn into_builder(self) -> SettingsBuilder {
        SettingsBuilder {
            host: Some(self.host),
            port: self.port,
            credentials: self.credentials,
            encryption: self.encryption,
            io_timeout: self.io_timeout,
            inter_message_delay: self.inter_message_delay,
            hello_name: self.hello_name,
            retry: self.retry,
        }
    }

    /// Returns the server host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the full server address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns the encryption policy.
    pub fn encryption(&self) -> &EncryptionPolicy {
        &self.encryption
    }

    /// Returns the connect and I/O timeout.
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Returns the pause after each delivered message.
    pub fn inter_message_delay(&self) -> Duration {
        self.inter_message_delay
    }

    /// Returns the name announced in EHLO, if overridden.
    pub fn hello_name(&self) -> Option<&str> {
        self.hello_name.as_deref()
    }

    /// Returns the reconnect backoff.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

fn parse_encryption_mode(value: &str) -> SmtpResult<EncryptionMode> {
    match value.trim().to_lowercase().replace('-', "_").as_str() {
        "none" | "plain" => Ok(EncryptionMode::None),
        "ssl" | "tls" | "implicit_tls" | "smtps" => Ok(EncryptionMode::ImplicitTls),
        "starttls" | "start_tls" => Ok(EncryptionMode::StartTls),
        other => Err(SmtpError::configuration(format!(
            "Invalid SMTP_ENCRYPTION '{}'",
            other
        ))),
    }
}

fn parse_env_duration(name: &str, value: &str) -> SmtpResult<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| {
        SmtpError::configuration(format!("Invalid {} '{}': {}", name, value, e))
    })
}

/// Builder for client settings.
#[derive(Debug)]
pub struct SettingsBuilder {
    host: Option<String>,
    port: u16,
    credentials: Credentials,
    encryption: EncryptionPolicy,
    io_timeout: Duration,
    inter_message_delay: Duration,
    hello_name: Option<String>,
    retry: RetryConfig,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            credentials: Credentials::none(),
            encryption: EncryptionPolicy::none(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            inter_message_delay: DEFAULT_INTER_MESSAGE_DELAY,
            hello_name: None,
            retry: RetryConfig::default(),
        }
    }
}

impl SettingsBuilder {
    /// Sets the SMTP server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the SMTP server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Sets the encryption policy.
    pub fn encryption(mut self, encryption: EncryptionPolicy) -> Self {
        self.encryption = encryption;
        self
    }

    /// Sets the connect and I/O timeout.
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the pause after each delivered message.
    pub fn inter_message_delay(mut self, delay: Duration) -> Self {
        self.inter_message_delay = delay;
        self
    }

    /// Sets the name announced in EHLO.
    pub fn hello_name(mut self, name: impl Into<String>) -> Self {
        self.hello_name = Some(name.into());
        self
    }

    /// Sets the reconnect backoff.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Builds the settings.
    pub fn build(self) -> SmtpResult<Settings> {
        let settings = Settings {
            host: self.host.ok_or_else(|| SmtpError::configuration("Host is required"))?,
            port: self.port,
            credentials: self.credentials,
            encryption: self.encryption,
            io_timeout: self.io_timeout,
            inter_message_delay: self.inter_message_delay,
            hello_name: self.hello_name,
            retry: self.retry,
        };

        settings.validate()?;
        Ok(settings)
    }
}

// Humantime serde support
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pem_bundle(count: usize) -> String {
        use base64::Engine;
        // rustls-pemfile only unwraps the PEM armor, the payload need not be a valid DER.
        (0..count)
            .map(|i| {
                let der = format!("test-certificate-{}", i);
                format!(
                    "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
                    base64::engine::general_purpose::STANDARD.encode(der)
                )
            })
            .collect()
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::new("smtp.example.com", DEFAULT_PORT);
        assert_eq!(settings.port(), 25);
        assert_eq!(settings.io_timeout(), Duration::from_secs(30));
        assert_eq!(settings.inter_message_delay(), Duration::from_millis(100));
        assert_eq!(settings.encryption().mode(), EncryptionMode::None);
        assert_eq!(settings.encryption().verification(), VerificationMode::Relaxed);
        assert_eq!(settings.credentials().login_method(), LoginMethod::None);
    }

    #[test]
    fn test_named_constructors() {
        let tls = Settings::with_implicit_tls("mail.example.com", Credentials::plain("u", "p"));
        assert_eq!(tls.port(), 465);
        assert_eq!(tls.encryption().mode(), EncryptionMode::ImplicitTls);

        let starttls = Settings::with_starttls("mail.example.com", Credentials::none());
        assert_eq!(starttls.port(), 587);
        assert_eq!(starttls.encryption().mode(), EncryptionMode::StartTls);

        let gmail = Settings::gmail("me@gmail.com", "app-password");
        assert_eq!(gmail.host(), "smtp.gmail.com");
        assert_eq!(gmail.port(), 587);
        assert_eq!(gmail.encryption().mode(), EncryptionMode::StartTls);
        assert_eq!(gmail.credentials().login_method(), LoginMethod::Login);
        assert!(gmail.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        assert!(Settings::builder().build().is_err());
        assert!(Settings::builder().host("  ").build().is_err());
        assert!(Settings::builder().host("smtp.example.com").port(0).build().is_err());
        assert!(Settings::builder()
            .host("smtp.example.com")
            .credentials(Credentials::login("", "secret"))
            .build()
            .is_err());
        assert!(Settings::builder()
            .host("smtp.example.com")
            .io_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_into_builder_roundtrip() {
        let settings = Settings::gmail("me@gmail.com", "pw")
            .into_builder()
            .inter_message_delay(Duration::from_millis(5))
            .build()
            .unwrap();
        assert_eq!(settings.host(), GMAIL_HOST);
        assert_eq!(settings.inter_message_delay(), Duration::from_millis(5));
    }

    #[test]
    fn test_settings_deserialize() {
        let json = r#"{
            "host": "smtp.example.com",
            "port": 587,
            "credentials": {"username": "user", "password": "pw", "login_method": "cram_md5"},
            "encryption": {"mode": "start_tls", "verification": "strict"},
            "io_timeout": "10s",
            "inter_message_delay": "250ms"
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.port(), 587);
        assert_eq!(settings.credentials().login_method(), LoginMethod::CramMd5);
        assert_eq!(settings.encryption().mode(), EncryptionMode::StartTls);
        assert_eq!(settings.encryption().verification(), VerificationMode::Strict);
        assert_eq!(settings.io_timeout(), Duration::from_secs(10));
        assert_eq!(settings.inter_message_delay(), Duration::from_millis(250));
        assert_eq!(settings.retry(), &RetryConfig::default());
    }

    #[test]
    fn test_password_not_serialized() {
        let settings = Settings::gmail("me@gmail.com", "hunter2");
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("me@gmail.com"));
    }

    #[test]
    fn test_missing_ca_file_degrades_relaxed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("cacert.pem");
        let policy = EncryptionPolicy::new(
            EncryptionMode::StartTls,
            Some(missing),
            VerificationMode::Relaxed,
        );
        assert!(policy.is_degraded());
        assert_eq!(policy.effective_verification(), VerificationMode::None);
        assert!(policy.accepts_invalid_certs());
    }

    #[test]
    fn test_missing_ca_file_keeps_strict_verification() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("cacert.pem");
        let policy = EncryptionPolicy::new(
            EncryptionMode::ImplicitTls,
            Some(missing),
            VerificationMode::Strict,
        );
        assert!(policy.is_degraded());
        assert_eq!(policy.effective_verification(), VerificationMode::Strict);
        assert!(!policy.accepts_invalid_certs());
        assert!(policy.ca_certificates().is_empty());
    }

    #[test]
    fn test_empty_ca_file_degrades() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"no certificates here\n").unwrap();
        let policy = EncryptionPolicy::new(
            EncryptionMode::StartTls,
            Some(file.path().to_path_buf()),
            VerificationMode::Relaxed,
        );
        assert!(policy.is_degraded());
    }

    #[test]
    fn test_ca_file_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(pem_bundle(2).as_bytes()).unwrap();
        let policy = EncryptionPolicy::new(
            EncryptionMode::StartTls,
            Some(file.path().to_path_buf()),
            VerificationMode::Relaxed,
        );
        assert!(!policy.is_degraded());
        assert_eq!(policy.ca_certificates().len(), 2);
        assert_eq!(policy.ca_certificates()[0], b"test-certificate-0".to_vec());
        assert_eq!(policy.effective_verification(), VerificationMode::Relaxed);
    }

    #[test]
    fn test_plaintext_policy_ignores_ca_file() {
        let policy = EncryptionPolicy::new(
            EncryptionMode::None,
            Some(PathBuf::from("/nonexistent/cacert.pem")),
            VerificationMode::Strict,
        );
        assert!(!policy.is_degraded());
    }

    #[test]
    fn test_encryption_mode_parsing() {
        assert_eq!(parse_encryption_mode("STARTTLS").unwrap(), EncryptionMode::StartTls);
        assert_eq!(parse_encryption_mode("ssl").unwrap(), EncryptionMode::ImplicitTls);
        assert_eq!(parse_encryption_mode("none").unwrap(), EncryptionMode::None);
        assert!(parse_encryption_mode("quantum").is_err());
    }
}
