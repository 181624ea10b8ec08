//! Shared-secret authentication for the RPC surface.
//!
//! A single static token is configured at server start. Every procedure is
//! dispatched through [`AuthGate::check`] first; a mismatch produces a
//! structured [`RpcError`] and the procedure never runs.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::RpcError;

const TOKEN_BYTES: usize = 32;

/// Shared secret presented by callers. `Debug` never prints the value.
#[derive(Clone)]
pub struct AuthToken {
    secret: String,
    generated: bool,
}

impl AuthToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            generated: false,
        }
    }

    /// Generate a fresh URL-safe token from 32 random bytes.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            secret: URL_SAFE_NO_PAD.encode(bytes),
            generated: true,
        }
    }

    pub fn expose(&self) -> &str {
        &self.secret
    }

    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }

    /// True when the value came from [`AuthToken::generate`] rather than
    /// from an operator.
    pub fn is_generated(&self) -> bool {
        self.generated
    }
}

impl PartialEq for AuthToken {
    fn eq(&self, other: &Self) -> bool {
        self.secret == other.secret
    }
}

impl Eq for AuthToken {}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Stateless token check wrapped around every exposed procedure.
#[derive(Debug, Clone)]
pub struct AuthGate {
    secret: AuthToken,
}

impl AuthGate {
    pub fn new(secret: AuthToken) -> Self {
        Self { secret }
    }

    pub fn authenticate(&self, presented: Option<&str>) -> bool {
        let Some(presented) = presented else {
            return false;
        };
        if presented.is_empty() || self.secret.is_empty() {
            return false;
        }
        if presented.len() != self.secret.expose().len() {
            return false;
        }
        bool::from(presented.as_bytes().ct_eq(self.secret.expose().as_bytes()))
    }

    pub fn check(&self, presented: Option<&str>) -> Result<(), RpcError> {
        if self.authenticate(presented) {
            Ok(())
        } else {
            Err(RpcError::unauthenticated())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn accepts_matching_token() {
        let gate = AuthGate::new(AuthToken::new("s3cret"));
        assert!(gate.authenticate(Some("s3cret")));
        assert!(gate.check(Some("s3cret")).is_ok());
    }

    #[test]
    fn rejects_wrong_empty_and_missing_tokens() {
        let gate = AuthGate::new(AuthToken::new("s3cret"));
        assert!(!gate.authenticate(Some("s3cre")));
        assert!(!gate.authenticate(Some("S3CRET")));
        assert!(!gate.authenticate(Some("")));
        assert!(!gate.authenticate(None));

        let err = gate.check(None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }

    #[test]
    fn empty_secret_never_authenticates() {
        let gate = AuthGate::new(AuthToken::new(""));
        assert!(!gate.authenticate(Some("")));
    }

    #[test]
    fn generated_tokens_are_distinct_and_url_safe() {
        let a = AuthToken::generate();
        let b = AuthToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.expose().len(), 43);
        assert!(a
            .expose()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn generated_flag_tracks_origin() {
        assert!(AuthToken::generate().is_generated());
        assert!(!AuthToken::new("s3cret").is_generated());
        assert_eq!(AuthToken::new("s3cret"), AuthToken::new("s3cret"));
    }

    #[test]
    fn debug_redacts_secret() {
        let token = AuthToken::new("hunter2");
        assert_eq!(format!("{:?}", token), "AuthToken(***)");
    }
}
