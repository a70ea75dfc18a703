//! Credentials for SMTP authentication.
//!
//! Supports the login methods a session can be asked to perform:
//! - LOGIN (obsolete but widely used)
//! - PLAIN (RFC 4616)
//! - CRAM-MD5 (RFC 2195) and CRAM-SHA1
//! - XOAUTH2 (Google/Microsoft)

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::digest::core_api::BlockSizeUser;
use hmac::digest::Digest;
use hmac::{Mac, SimpleHmac};
use md5::Md5;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::fmt;
use std::str::FromStr;

use crate::errors::{SmtpError, SmtpErrorKind, SmtpResult};

/// Login methods supported by the outbox client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    /// Do not authenticate.
    #[default]
    None,
    /// LOGIN authentication (obsolete).
    Login,
    /// CRAM-MD5 challenge-response.
    CramMd5,
    /// CRAM-SHA1 challenge-response.
    CramSha1,
    /// PLAIN authentication (RFC 4616).
    Plain,
    /// Google/Microsoft XOAUTH2, the password carries the access token.
    #[serde(rename = "xoauth2")]
    XOAuth2,
}

impl LoginMethod {
    /// Returns the SMTP AUTH mechanism name.
    pub fn mechanism_name(&self) -> &'static str {
        match self {
            LoginMethod::None => "NONE",
            LoginMethod::Login => "LOGIN",
            LoginMethod::CramMd5 => "CRAM-MD5",
            LoginMethod::CramSha1 => "CRAM-SHA1",
            LoginMethod::Plain => "PLAIN",
            LoginMethod::XOAuth2 => "XOAUTH2",
        }
    }

    /// Returns true if the session must authenticate.
    pub fn requires_login(&self) -> bool {
        !matches!(self, LoginMethod::None)
    }

    /// Returns true if the secret travels in the clear (base64 only).
    pub fn exposes_secret(&self) -> bool {
        matches!(self, LoginMethod::Login | LoginMethod::Plain | LoginMethod::XOAuth2)
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mechanism_name())
    }
}

impl FromStr for LoginMethod {
    type Err = SmtpError;

    /// Parses `LOGIN`, `cram-md5`, `AUTH_CRAM_MD5` and friends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        let name = normalized.strip_prefix("AUTH_").unwrap_or(&normalized);
        match name {
            "NONE" => Ok(LoginMethod::None),
            "LOGIN" => Ok(LoginMethod::Login),
            "CRAM_MD5" => Ok(LoginMethod::CramMd5),
            "CRAM_SHA1" => Ok(LoginMethod::CramSha1),
            "PLAIN" => Ok(LoginMethod::Plain),
            "XOAUTH2" => Ok(LoginMethod::XOAuth2),
            _ => Err(SmtpError::new(
                SmtpErrorKind::AuthMethodNotSupported,
                format!("Unsupported authentication type: {}", s),
            )),
        }
    }
}

/// Account credentials and the method used to present them.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Account username.
    #[serde(default)]
    username: String,
    /// Account password (serialization skipped for security).
    #[serde(skip_serializing, default = "empty_secret")]
    password: SecretString,
    /// Login method.
    #[serde(default)]
    login_method: LoginMethod,
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

impl Credentials {
    /// Creates credentials for the given login method.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        login_method: LoginMethod,
    ) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
            login_method,
        }
    }

    /// Creates credentials that skip authentication.
    pub fn none() -> Self {
        Self::new("", "", LoginMethod::None)
    }

    /// Creates LOGIN credentials.
    pub fn login(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(username, password, LoginMethod::Login)
    }

    /// Creates PLAIN credentials.
    pub fn plain(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(username, password, LoginMethod::Plain)
    }

    /// Creates XOAUTH2 credentials.
    pub fn xoauth2(username: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::new(username, access_token, LoginMethod::XOAuth2)
    }

    /// Returns the account username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the protected password.
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Returns the login method.
    pub fn login_method(&self) -> LoginMethod {
        self.login_method
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("login_method", &self.login_method)
            .finish()
    }
}

/// Challenge-response computations the session library does not provide.
pub struct Authenticator;

impl Authenticator {
    /// Generates the CRAM-MD5 response for a base64 server challenge.
    pub fn cram_md5_response(
        challenge: &str,
        username: &str,
        password: &SecretString,
    ) -> SmtpResult<String> {
        Self::cram_response::<Md5>("CRAM-MD5", challenge, username, password)
    }

    /// Generates the CRAM-SHA1 response for a base64 server challenge.
    pub fn cram_sha1_response(
        challenge: &str,
        username: &str,
        password: &SecretString,
    ) -> SmtpResult<String> {
        Self::cram_response::<Sha1>("CRAM-SHA1", challenge, username, password)
    }

    fn cram_response<D>(
        mechanism: &str,
        challenge: &str,
        username: &str,
        password: &SecretString,
    ) -> SmtpResult<String>
    where
        D: Digest + BlockSizeUser,
    {
        let challenge_bytes = BASE64.decode(challenge.trim()).map_err(|e| {
            SmtpError::authentication(format!("Invalid {} challenge: {}", mechanism, e))
        })?;

        let mut mac = <SimpleHmac<D> as Mac>::new_from_slice(password.expose_secret().as_bytes())
            .map_err(|e| SmtpError::authentication(format!("HMAC error: {}", e)))?;
        mac.update(&challenge_bytes);
        let digest = mac.finalize().into_bytes();

        // Format: username space hex-digest
        let hex_digest: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        let response = format!("{} {}", username, hex_digest);
        Ok(BASE64.encode(response))
    }
}
