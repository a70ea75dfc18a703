//! Process-wide TLS subsystem.
//!
//! Clients that encrypt hold a [`TlsGuard`]. The first guard initializes the
//! subsystem and the last one to drop tears it down. While active, client
//! contexts are cached per server and policy so every drain cycle, and every
//! client talking to the same server, reuses one context.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lettre::transport::smtp::client::{Certificate, TlsParameters};
use tracing::debug;

use crate::config::{EncryptionPolicy, VerificationMode};
use crate::errors::{SmtpError, SmtpErrorKind, SmtpResult};

static SUBSYSTEM: Mutex<SubsystemState> = Mutex::new(SubsystemState {
    users: 0,
    contexts: None,
});

struct SubsystemState {
    users: usize,
    contexts: Option<HashMap<ContextKey, Arc<TlsContext>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ContextKey {
    host: String,
    ca_file: Option<PathBuf>,
    verification: VerificationMode,
}

fn lock_state() -> MutexGuard<'static, SubsystemState> {
    SUBSYSTEM.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the process-wide TLS subsystem.
pub struct TlsSubsystem;

impl TlsSubsystem {
    /// Registers a user, initializing the subsystem on first use.
    pub fn acquire() -> TlsGuard {
        let mut state = lock_state();
        state.users += 1;
        if state.contexts.is_none() {
            state.contexts = Some(HashMap::new());
            debug!("TLS subsystem initialized");
        }
        debug!(users = state.users, "TLS subsystem acquired");
        TlsGuard { _private: () }
    }

    /// Returns the number of live guards.
    pub fn active_users() -> usize {
        lock_state().users
    }

    /// Returns true while at least one guard is alive.
    pub fn is_initialized() -> bool {
        lock_state().contexts.is_some()
    }
}

/// Keeps the TLS subsystem alive. Released on drop.
#[must_use = "the TLS subsystem is released when the guard is dropped"]
pub struct TlsGuard {
    _private: (),
}

impl TlsGuard {
    /// Returns the cached context for `host` under `policy`, building it on first use.
    pub fn context(&self, host: &str, policy: &EncryptionPolicy) -> SmtpResult<Arc<TlsContext>> {
        let key = ContextKey {
            host: host.to_owned(),
            ca_file: policy.ca_file().map(|p| p.to_path_buf()),
            verification: policy.effective_verification(),
        };

        let mut state = lock_state();
        let contexts = state.contexts.get_or_insert_with(HashMap::new);
        if let Some(context) = contexts.get(&key) {
            return Ok(Arc::clone(context));
        }

        let context = Arc::new(TlsContext::build(host, policy)?);
        debug!(
            host = %host,
            verification = ?key.verification,
            roots = policy.ca_certificates().len(),
            "Built TLS client context"
        );
        contexts.insert(key, Arc::clone(&context));
        Ok(context)
    }
}

impl Drop for TlsGuard {
    fn drop(&mut self) {
        let mut state = lock_state();
        state.users = state.users.saturating_sub(1);
        if state.users == 0 {
            state.contexts = None;
            debug!("TLS subsystem torn down");
        }
    }
}

impl fmt::Debug for TlsGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsGuard").finish()
    }
}

/// TLS client context for one server.
#[derive(Clone)]
pub struct TlsContext {
    host: String,
    verification: VerificationMode,
    parameters: TlsParameters,
}

impl TlsContext {
    /// Builds a context for `host` from the policy's trust material.
    pub fn build(host: &str, policy: &EncryptionPolicy) -> SmtpResult<Self> {
        let mut builder = TlsParameters::builder(host.to_owned());

        for der in policy.ca_certificates() {
            let certificate = Certificate::from_der(der.clone()).map_err(|e| {
                SmtpError::new(SmtpErrorKind::CertificateInvalid, "Invalid CA certificate")
                    .with_cause(e)
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        let parameters = builder
            .dangerous_accept_invalid_certs(policy.accepts_invalid_certs())
            .build()
            .map_err(|e| SmtpError::tls("Failed to build TLS parameters").with_cause(e))?;

        Ok(Self {
            host: host.to_owned(),
            verification: policy.effective_verification(),
            parameters,
        })
    }

    /// Returns the server name the context verifies against.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the verification applied by this context.
    pub fn verification(&self) -> VerificationMode {
        self.verification
    }

    /// Returns the lettre TLS parameters.
    pub fn parameters(&self) -> &TlsParameters {
        &self.parameters
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("host", &self.host)
            .field("verification", &self.verification)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptionMode;

    // Other tests may hold guards concurrently, so counts are checked with lower bounds.

    #[test]
    fn test_guard_keeps_subsystem_alive() {
        let guard = TlsSubsystem::acquire();
        assert!(TlsSubsystem::is_initialized());
        assert!(TlsSubsystem::active_users() >= 1);

        let second = TlsSubsystem::acquire();
        assert!(TlsSubsystem::active_users() >= 2);
        drop(second);

        assert!(TlsSubsystem::is_initialized());
        drop(guard);
    }

    #[test]
    fn test_context_is_cached_per_host() {
        let guard = TlsSubsystem::acquire();
        let policy = EncryptionPolicy::starttls();

        let first = guard.context("smtp.example.com", &policy).unwrap();
        let again = guard.context("smtp.example.com", &policy).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.host(), "smtp.example.com");
        assert_eq!(first.verification(), VerificationMode::Relaxed);

        let other = guard.context("mail.example.org", &policy).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn test_unverified_context_is_distinct() {
        let guard = TlsSubsystem::acquire();
        let verified = EncryptionPolicy::implicit_tls();
        let unverified = EncryptionPolicy::new(
            EncryptionMode::ImplicitTls,
            None,
            VerificationMode::None,
        );

        let a = guard.context("smtp.example.net", &verified).unwrap();
        let b = guard.context("smtp.example.net", &unverified).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.verification(), VerificationMode::None);
    }
}
