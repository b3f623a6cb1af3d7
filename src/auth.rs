//! Short-lived signed credentials for the `Authorization` header.
//!
//! Every vendor call carries a fresh HS256 JWT asserting the access key as issuer.
//! The token is valid from a few seconds in the past (clock skew between us and the
//! vendor) until half an hour from now.

use std::fmt;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::{AdaptorError, Result};

pub const TOKEN_TTL_SECS: i64 = 1800;
pub const CLOCK_SKEW_SECS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub exp: i64,
    pub nbf: i64,
}

/// Signs access tokens from an access key / secret key pair.
#[derive(Clone)]
pub struct CredentialIssuer {
    access_key: String,
    secret_key: String,
}

impl fmt::Debug for CredentialIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialIssuer")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl CredentialIssuer {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Issue a token valid from now.
    ///
    /// # Errors
    /// Returns `AdaptorError::Credential` if either key is empty or signing fails.
    pub fn issue(&self) -> Result<String> {
        self.issue_at(chrono::Utc::now().timestamp())
    }

    /// Issue a token as if the current unix time were `now`.
    pub fn issue_at(&self, now: i64) -> Result<String> {
        if self.access_key.is_empty() {
            return Err(AdaptorError::credential("access key is empty"));
        }
        if self.secret_key.is_empty() {
            return Err(AdaptorError::credential("secret key is empty"));
        }

        let claims = Claims {
            iss: self.access_key.clone(),
            exp: now + TOKEN_TTL_SECS,
            nbf: now - CLOCK_SKEW_SECS,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret_key.as_bytes()),
        )
        .map_err(|e| AdaptorError::credential(format!("Failed to sign token: {e}")))
    }

    /// The full `Authorization` header value.
    pub fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.issue()?))
    }
}
