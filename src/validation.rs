//! Time-based and structural checks on decoded claims.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::claims::Claims;
use crate::error::AuthError;

/// Source of the current time in unix seconds.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        // A clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let secs = i64::try_from(by.as_secs()).unwrap_or(i64::MAX);
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.saturating_add(secs))
            })
            .ok();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Check decoded claims against `now`.
///
/// `leeway` extends the expiry; zero means a token is rejected the second
/// after `exp`.
pub fn validate(claims: &Claims, now: i64, leeway: Duration) -> Result<(), AuthError> {
    if claims.issued_at_secs() > claims.expires_at() {
        return Err(AuthError::malformed("`iat` is after `exp`"));
    }
    if is_expired_at(claims, now, leeway) {
        tracing::debug!(
            target: "jwt_auth.validation",
            exp = claims.expires_at(),
            now,
            "Token expired"
        );
        return Err(AuthError::TokenExpired);
    }
    Ok(())
}

/// Reject claims whose `iss` is not `expected`.
pub fn validate_issuer(claims: &Claims, expected: &str) -> Result<(), AuthError> {
    if claims.issuer() != expected {
        tracing::debug!(
            target: "jwt_auth.validation",
            iss = %claims.issuer(),
            expected,
            "Unexpected issuer"
        );
        return Err(AuthError::InvalidIssuer);
    }
    Ok(())
}

pub(crate) fn is_expired_at(claims: &Claims, now: i64, leeway: Duration) -> bool {
    let leeway = i64::try_from(leeway.as_secs()).unwrap_or(i64::MAX);
    now > claims.expires_at().saturating_add(leeway)
}
