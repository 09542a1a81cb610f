//! Signing keys and the registry that resolves them by `kid`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rand::Rng;
use subtle::ConstantTimeEq;

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

fn family(alg: Algorithm) -> Family {
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Family::Hmac,
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Family::Rsa,
        Algorithm::ES256 | Algorithm::ES384 => Family::Ec,
        Algorithm::EdDSA => Family::Ed,
    }
}

/// The JOSE name of `alg`, as it appears in a token header.
pub fn algorithm_name(alg: Algorithm) -> &'static str {
    match alg {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::EdDSA => "EdDSA",
    }
}

/// One algorithm plus the key material that goes with it.
///
/// Immutable once built.  Rotation means registering a new `SigningKey`,
/// never changing one that may be in use.
#[derive(Clone)]
pub struct SigningKey {
    algorithm: Algorithm,
    kid: Option<String>,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Symmetric key for one of the `HS*` algorithms.
    pub fn hmac(algorithm: Algorithm, secret: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        if family(algorithm) != Family::Hmac {
            return Err(AuthError::ConfigError(format!(
                "{} is not an HMAC algorithm",
                algorithm_name(algorithm)
            )));
        }
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(AuthError::ConfigError("signing secret must not be empty".into()));
        }
        Ok(Self {
            algorithm,
            kid: None,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    pub fn hs256(secret: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        Self::hmac(Algorithm::HS256, secret)
    }

    /// Fresh random HMAC key sized to the hash output of `algorithm`.
    pub fn random_hmac(algorithm: Algorithm) -> Result<Self, AuthError> {
        let len = match algorithm {
            Algorithm::HS256 => 32,
            Algorithm::HS384 => 48,
            Algorithm::HS512 => 64,
            other => {
                return Err(AuthError::ConfigError(format!(
                    "cannot generate a random {} key",
                    algorithm_name(other)
                )))
            }
        };
        let mut secret = vec![0u8; len];
        rand::rng().fill(secret.as_mut_slice());
        Self::hmac(algorithm, &secret)
    }

    /// Asymmetric key pair from PEM-encoded private and public keys.
    pub fn from_pem(
        algorithm: Algorithm,
        private_pem: &[u8],
        public_pem: &[u8],
    ) -> Result<Self, AuthError> {
        let bad_pem = |e: jsonwebtoken::errors::Error| {
            AuthError::ConfigError(format!(
                "invalid {} PEM key: {e}",
                algorithm_name(algorithm)
            ))
        };
        let (encoding, decoding) = match family(algorithm) {
            Family::Rsa => (
                EncodingKey::from_rsa_pem(private_pem).map_err(bad_pem)?,
                DecodingKey::from_rsa_pem(public_pem).map_err(bad_pem)?,
            ),
            Family::Ec => (
                EncodingKey::from_ec_pem(private_pem).map_err(bad_pem)?,
                DecodingKey::from_ec_pem(public_pem).map_err(bad_pem)?,
            ),
            Family::Ed => (
                EncodingKey::from_ed_pem(private_pem).map_err(bad_pem)?,
                DecodingKey::from_ed_pem(public_pem).map_err(bad_pem)?,
            ),
            Family::Hmac => {
                return Err(AuthError::ConfigError(
                    "HMAC keys are built with SigningKey::hmac".into(),
                ))
            }
        };
        Ok(Self {
            algorithm,
            kid: None,
            encoding,
            decoding,
        })
    }

    /// Build an HMAC key from environment variables already set in the process.
    ///
    /// | Variable         | Required | Default | Notes                     |
    /// |------------------|----------|---------|---------------------------|
    /// | `JWT_SIGNER_KEY` | **yes**  | —       | Shared secret             |
    /// | `JWT_ALGORITHM`  | no       | `HS256` | `HS256`, `HS384`, `HS512` |
    /// | `JWT_KEY_ID`     | no       | *(none)*| Written as the `kid`      |
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let secret = lookup("JWT_SIGNER_KEY")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthError::ConfigError("JWT_SIGNER_KEY is not set".into()))?;

        let algorithm = match lookup("JWT_ALGORITHM").filter(|v| !v.is_empty()) {
            Some(name) => name.parse::<Algorithm>().map_err(|_| {
                AuthError::ConfigError(format!("JWT_ALGORITHM {name:?} is not recognised"))
            })?,
            None => Algorithm::HS256,
        };

        let key = Self::hmac(algorithm, secret.as_bytes())?;
        Ok(match lookup("JWT_KEY_ID").filter(|v| !v.is_empty()) {
            Some(kid) => key.with_kid(kid),
            None => key,
        })
    }

    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Base64url signature over `message`.
    pub(crate) fn sign(&self, message: &[u8]) -> Result<String, AuthError> {
        jsonwebtoken::crypto::sign(message, &self.encoding, self.algorithm)
            .map_err(|e| AuthError::EncodingError(format!("signing failed: {e}")))
    }

    /// Check a base64url `signature` over `message`.
    ///
    /// HMAC signatures are recomputed and compared in constant time; the
    /// asymmetric families go through the library's verifier.
    pub(crate) fn verify(&self, message: &[u8], signature: &str) -> Result<(), AuthError> {
        let valid = match family(self.algorithm) {
            Family::Hmac => {
                let provided = URL_SAFE_NO_PAD
                    .decode(signature)
                    .map_err(|_| AuthError::SignatureInvalid)?;
                let expected = URL_SAFE_NO_PAD
                    .decode(self.sign(message)?)
                    .map_err(|e| AuthError::EncodingError(e.to_string()))?;
                bool::from(expected.ct_eq(&provided))
            }
            _ => jsonwebtoken::crypto::verify(signature, message, &self.decoding, self.algorithm)
                .unwrap_or_else(|e| {
                    tracing::debug!(target: "jwt_auth.keys", error = %e, "Signature check errored");
                    false
                }),
        };
        if valid {
            Ok(())
        } else {
            Err(AuthError::SignatureInvalid)
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Keyring {
    keys: HashMap<String, Arc<SigningKey>>,
    default: Option<Arc<SigningKey>>,
}

impl Keyring {
    fn insert(&mut self, key: Arc<SigningKey>) {
        match key.kid() {
            Some(kid) => {
                if self.default.as_ref().and_then(|d| d.kid()) == Some(kid) {
                    self.default = Some(Arc::clone(&key));
                }
                self.keys.insert(kid.to_owned(), key);
            }
            None => self.default = Some(key),
        }
    }
}

/// Named signing keys plus the default used when a token names none.
///
/// Readers work on an immutable snapshot of the keyring; writers publish a
/// new snapshot.  A lookup therefore sees either the keyring before a write
/// or after it, never a mix.
#[derive(Debug)]
pub struct SignerRegistry {
    ring: ArcSwap<Keyring>,
}

impl Default for SignerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self {
            ring: ArcSwap::from_pointee(Keyring::default()),
        }
    }

    /// A registry whose default signer is `key`.
    pub fn with_default(key: SigningKey) -> Self {
        let registry = Self::new();
        registry.set_default(key);
        registry
    }

    /// Add `key` under its `kid`, replacing any key with the same id.
    ///
    /// A key without a `kid` can only be found as the default, so it is
    /// installed as the default.
    pub fn register(&self, key: SigningKey) {
        tracing::info!(
            target: "jwt_auth.keys",
            kid = ?key.kid(),
            alg = algorithm_name(key.algorithm()),
            "Registering signing key"
        );
        let key = Arc::new(key);
        self.ring.rcu(|ring| {
            let mut next = Keyring::clone(ring);
            next.insert(Arc::clone(&key));
            next
        });
    }

    /// Register `key` and make it the signer for tokens issued without an
    /// explicit `kid`.
    pub fn set_default(&self, key: SigningKey) {
        tracing::info!(
            target: "jwt_auth.keys",
            kid = ?key.kid(),
            alg = algorithm_name(key.algorithm()),
            "Installing default signing key"
        );
        let key = Arc::new(key);
        self.ring.rcu(|ring| {
            let mut next = Keyring::clone(ring);
            next.insert(Arc::clone(&key));
            next.default = Some(Arc::clone(&key));
            next
        });
    }

    /// Retire the key registered under `kid`.  Returns whether it existed.
    ///
    /// Retiring the current default leaves the registry without one.
    pub fn remove(&self, kid: &str) -> bool {
        let previous = self.ring.rcu(|ring| {
            let mut next = Keyring::clone(ring);
            if next.keys.remove(kid).is_some()
                && next.default.as_ref().and_then(|d| d.kid()) == Some(kid)
            {
                next.default = None;
            }
            next
        });
        let existed = previous.keys.contains_key(kid);
        if existed {
            tracing::info!(target: "jwt_auth.keys", kid, "Retired signing key");
        }
        existed
    }

    /// The key for `kid`, or the default when `kid` is `None`.
    pub fn resolve(&self, kid: Option<&str>) -> Result<Arc<SigningKey>, AuthError> {
        let ring = self.ring.load();
        match kid {
            Some(kid) => ring
                .keys
                .get(kid)
                .cloned()
                .ok_or_else(|| AuthError::UnknownKey(kid.to_owned())),
            None => ring.default.clone().ok_or(AuthError::NoDefaultSigner),
        }
    }

    pub fn default_signer(&self) -> Option<Arc<SigningKey>> {
        self.ring.load().default.clone()
    }

    /// Registered key ids, sorted.
    pub fn kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self.ring.load().keys.keys().cloned().collect();
        kids.sort();
        kids
    }
}
