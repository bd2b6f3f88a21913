//! Access guard for the stats endpoint

use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The server has no secret configured at all. Reported distinctly from
    /// a bad credential so operators can tell "misconfigured" from "attacker".
    #[error("no dashboard secret is configured")]
    NotConfigured,
    #[error("missing or mismatched credential")]
    BadCredential,
}

/// Stateless shared-secret check. The secret is injected at construction,
/// never read from ambient process state.
#[derive(Clone)]
pub struct AccessGuard {
    secret: Option<String>,
}

impl AccessGuard {
    /// A blank secret counts as unconfigured.
    pub fn new(secret: Option<String>) -> Self {
        let secret = secret.filter(|s| !s.trim().is_empty());
        Self { secret }
    }

    /// Check a presented credential against the configured secret.
    /// Constant-time comparison, to keep the equality check timing-neutral.
    pub fn verify(&self, credential: Option<&str>) -> Result<(), AuthError> {
        let secret = self.secret.as_ref().ok_or(AuthError::NotConfigured)?;
        let presented = credential.ok_or(AuthError::BadCredential)?;

        if secret.as_bytes().ct_eq(presented.as_bytes()).into() {
            Ok(())
        } else {
            Err(AuthError::BadCredential)
        }
    }
}
