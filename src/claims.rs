use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;
use crate::validation::{Clock, SystemClock};

/// An identifier that can be embedded in the `sub` claim.
///
/// Implemented for `String`, the primitive integers and [`Uuid`].  The
/// canonical form is what goes on the wire; [`from_canonical`] must accept
/// everything [`to_canonical`] produces.
///
/// [`to_canonical`]: SubjectId::to_canonical
/// [`from_canonical`]: SubjectId::from_canonical
pub trait SubjectId: Sized {
    fn to_canonical(&self) -> Result<String, AuthError>;
    fn from_canonical(s: &str) -> Option<Self>;
}

impl SubjectId for String {
    fn to_canonical(&self) -> Result<String, AuthError> {
        if self.is_empty() {
            return Err(AuthError::EncodingError("subject must not be empty".into()));
        }
        Ok(self.clone())
    }

    fn from_canonical(s: &str) -> Option<Self> {
        (!s.is_empty()).then(|| s.to_owned())
    }
}

impl SubjectId for Uuid {
    fn to_canonical(&self) -> Result<String, AuthError> {
        Ok(self.as_hyphenated().to_string())
    }

    fn from_canonical(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok()
    }
}

macro_rules! integer_subject {
    ($($t:ty),*) => {$(
        impl SubjectId for $t {
            fn to_canonical(&self) -> Result<String, AuthError> {
                Ok(self.to_string())
            }

            fn from_canonical(s: &str) -> Option<Self> {
                s.parse().ok()
            }
        }
    )*};
}

integer_subject!(u32, u64, i32, i64, usize);

/// Capability for entity types that can be authenticated by token.
///
/// ```rust
/// use jwt_authenticatable::HasIdentifier;
///
/// struct Planet { id: Option<u64>, name: String }
///
/// impl HasIdentifier for Planet {
///     type Id = u64;
///     fn identifier(&self) -> Option<u64> { self.id }
/// }
/// ```
pub trait HasIdentifier {
    type Id: SubjectId;

    /// `None` for entities that have not been persisted yet.
    fn identifier(&self) -> Option<Self::Id>;
}

/// The token payload.
///
/// Field order is fixed (`iss`, `iat`, `exp`, `sub`) so encoding is
/// reproducible.  Unknown payload fields are rejected when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Claims {
    iss: String,
    iat: i64,
    exp: i64,
    sub: String,
}

impl Claims {
    /// Claims for `subject` issued now and expiring after `ttl`.
    pub fn new<S: SubjectId>(
        subject: &S,
        issuer: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, AuthError> {
        Self::issued_at(subject, issuer, ttl, SystemClock.now())
    }

    /// Same as [`new`](Self::new) with an explicit issuance time (unix seconds).
    pub fn issued_at<S: SubjectId>(
        subject: &S,
        issuer: impl Into<String>,
        ttl: Duration,
        now: i64,
    ) -> Result<Self, AuthError> {
        let ttl = i64::try_from(ttl.as_secs()).map_err(|_| AuthError::InvalidTtl)?;
        if ttl <= 0 {
            return Err(AuthError::InvalidTtl);
        }
        let exp = now.checked_add(ttl).ok_or(AuthError::InvalidTtl)?;

        Ok(Self {
            iss: issuer.into(),
            iat: now,
            exp,
            sub: subject.to_canonical()?,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.iss
    }

    pub fn issued_at_secs(&self) -> i64 {
        self.iat
    }

    pub fn expires_at(&self) -> i64 {
        self.exp
    }

    /// The raw subject string.
    pub fn subject(&self) -> &str {
        &self.sub
    }

    /// Parse `sub` back into a typed identifier.
    pub fn subject_as<S: SubjectId>(&self) -> Result<S, AuthError> {
        S::from_canonical(&self.sub).ok_or_else(|| {
            AuthError::malformed(format!("`sub` is not a valid {}", std::any::type_name::<S>()))
        })
    }
}
