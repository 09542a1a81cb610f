use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::instrument;

use crate::claims::{Claims, HasIdentifier, SubjectId};
use crate::config::{TokenConfig, DEFAULT_TTL};
use crate::error::AuthError;
use crate::keys::{SignerRegistry, SigningKey};
use crate::token::{decode, encode};
use crate::validation::{is_expired_at, validate, validate_issuer, Clock, SystemClock};

/// Per-call overrides for [`Authenticator::issue_token_with`].  Anything
/// left `None` falls back to the [`TokenConfig`] and the registry default.
#[derive(Debug, Clone, Default)]
pub struct IssueOptions {
    pub ttl: Option<Duration>,
    pub issuer: Option<String>,
    /// Sign with the registered key of this id instead of the default.
    pub kid: Option<String>,
}

impl IssueOptions {
    pub fn ttl(mut self, v: Duration) -> Self {
        self.ttl = Some(v);
        self
    }
    pub fn issuer(mut self, v: impl Into<String>) -> Self {
        self.issuer = Some(v.into());
        self
    }
    pub fn kid(mut self, v: impl Into<String>) -> Self {
        self.kid = Some(v.into());
        self
    }
}

/// Issues tokens for subjects and verifies them back.
///
/// Cloning is cheap and clones share the same registry and policy, so a key
/// rotated through one handle is seen by all of them.
///
/// [`configure`](Self::configure) swaps the default signer and the policy as
/// one step: an issued token never pairs the new key with the old lifetime
/// or issuer.  Changing the default directly through [`registry`](Self::registry)
/// is not covered by that guarantee.
///
/// ```rust
/// use std::time::Duration;
/// use jwt_authenticatable::{Authenticator, SigningKey, TokenConfig};
///
/// # fn main() -> Result<(), jwt_authenticatable::AuthError> {
/// let auth = Authenticator::with_signer(
///     TokenConfig::new().issuer("test_issuer").ttl(Duration::from_secs(3600)),
///     SigningKey::hs256("secret")?,
/// );
/// let token = auth.issue_token(&42u64)?;
/// assert_eq!(auth.verify_and_extract::<u64>(&token)?, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticator {
    registry: Arc<SignerRegistry>,
    config: Arc<ArcSwap<TokenConfig>>,
    clock: Arc<dyn Clock>,
    /// Held for writing while the default signer and policy change together,
    /// for reading while issuance picks both up.
    rotation: Arc<RwLock<()>>,
}

impl Authenticator {
    pub fn new(config: TokenConfig, registry: impl Into<Arc<SignerRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            config: Arc::new(ArcSwap::from_pointee(config)),
            clock: Arc::new(SystemClock),
            rotation: Arc::new(RwLock::new(())),
        }
    }

    /// An authenticator whose registry holds `key` as its default signer.
    pub fn with_signer(config: TokenConfig, key: SigningKey) -> Self {
        Self::new(config, SignerRegistry::with_default(key))
    }

    /// Policy from [`TokenConfig::from_env`], default signer from
    /// [`SigningKey::from_env`].
    pub fn from_env() -> Result<Self, AuthError> {
        Ok(Self::with_signer(
            TokenConfig::from_env()?,
            SigningKey::from_env()?,
        ))
    }

    /// Replace the time source.  Mostly useful in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &SignerRegistry {
        &self.registry
    }

    /// Snapshot of the current policy.
    pub fn config(&self) -> Arc<TokenConfig> {
        self.config.load_full()
    }

    pub fn set_config(&self, config: TokenConfig) {
        let _guard = self.rotation.write().unwrap_or_else(PoisonError::into_inner);
        self.config.store(Arc::new(config));
    }

    /// Install `signer` as the default, set the default lifetime and
    /// optionally rename the issuer.
    ///
    /// An omitted `ttl` resets the lifetime to [`DEFAULT_TTL`]; an omitted
    /// `issuer` keeps the current one.  A zero `ttl` is rejected before
    /// anything changes.
    ///
    /// Keys registered earlier stay in the registry, so tokens they signed
    /// keep verifying until the key is retired with
    /// [`SignerRegistry::remove`].
    pub fn configure(
        &self,
        signer: SigningKey,
        ttl: Option<Duration>,
        issuer: Option<String>,
    ) -> Result<(), AuthError> {
        if ttl.is_some_and(|t| t.as_secs() == 0) {
            return Err(AuthError::InvalidTtl);
        }
        let _guard = self.rotation.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = TokenConfig::clone(&self.config.load());
        next.ttl = ttl.unwrap_or(DEFAULT_TTL);
        if let Some(issuer) = issuer {
            next.issuer = issuer;
        }
        self.registry.set_default(signer);
        self.config.store(Arc::new(next));
        Ok(())
    }

    /// Token for `subject` under the default policy and signer.
    pub fn issue_token<S: SubjectId>(&self, subject: &S) -> Result<String, AuthError> {
        self.issue_token_with(subject, IssueOptions::default())
    }

    pub fn issue_token_with<S: SubjectId>(
        &self,
        subject: &S,
        options: IssueOptions,
    ) -> Result<String, AuthError> {
        let (config, signer) = {
            let _guard = self.rotation.read().unwrap_or_else(PoisonError::into_inner);
            (self.config.load_full(), self.registry.resolve(options.kid.as_deref())?)
        };
        let issuer = options.issuer.unwrap_or_else(|| config.issuer.clone());
        let ttl = options.ttl.unwrap_or(config.ttl);

        let claims = Claims::issued_at(subject, issuer, ttl, self.clock.now())?;
        let token = encode(&claims, &signer)?;

        tracing::debug!(
            target: "jwt_auth.authenticator",
            sub = %claims.subject(),
            kid = ?signer.kid(),
            exp = claims.expires_at(),
            "Issued token"
        );
        Ok(token)
    }

    /// Token carrying `entity`'s identifier.  Fails with `EncodingError` if
    /// the entity has none yet.
    pub fn issue_for<E: HasIdentifier>(&self, entity: &E) -> Result<String, AuthError> {
        let id = entity
            .identifier()
            .ok_or_else(|| AuthError::EncodingError("entity has no identifier".into()))?;
        self.issue_token(&id)
    }

    /// Decode, check the signature, then validate expiry (and the issuer
    /// when [`TokenConfig::validate_issuer`] is set).
    #[instrument(skip_all)]
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let config = self.config.load();
        let claims = decode(token, &self.registry)?;
        validate(&claims, self.clock.now(), config.leeway)?;
        if config.validate_issuer {
            validate_issuer(&claims, &config.issuer)?;
        }
        Ok(claims)
    }

    /// The subject of a valid token.  This is the one call a request guard
    /// needs; looking the subject up in storage is left to the caller.
    pub fn verify_and_extract<S: SubjectId>(&self, token: &str) -> Result<S, AuthError> {
        self.verify(token)?.subject_as()
    }

    /// `exp` of a correctly signed token, whether or not it has passed.
    pub fn expiry_of(&self, token: &str) -> Result<i64, AuthError> {
        Ok(decode(token, &self.registry)?.expires_at())
    }

    /// Whether a correctly signed token is past its expiry (plus leeway).
    pub fn is_expired(&self, token: &str) -> Result<bool, AuthError> {
        let claims = decode(token, &self.registry)?;
        Ok(is_expired_at(&claims, self.clock.now(), self.config.load().leeway))
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::Algorithm;

    use super::*;
    use crate::validation::ManualClock;

    const NOW: i64 = 1_700_000_000;

    fn auth() -> (Authenticator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let auth = Authenticator::with_signer(
            TokenConfig::new().issuer("test_issuer").ttl(Duration::from_secs(60)),
            SigningKey::hs256("test-secret").unwrap().with_kid("k1"),
        )
        .with_clock(clock.clone());
        (auth, clock)
    }

    struct Planet {
        id: Option<u64>,
    }

    impl HasIdentifier for Planet {
        type Id = u64;
        fn identifier(&self) -> Option<u64> {
            self.id
        }
    }

    #[test]
    fn issue_uses_config_defaults() {
        let (auth, _) = auth();
        let claims = auth.verify(&auth.issue_token(&7u32).unwrap()).unwrap();
        assert_eq!(claims.issuer(), "test_issuer");
        assert_eq!(claims.issued_at_secs(), NOW);
        assert_eq!(claims.expires_at(), NOW + 60);
    }

    #[test]
    fn options_override_defaults() {
        let (auth, _) = auth();
        auth.registry()
            .register(SigningKey::hmac(Algorithm::HS512, "other").unwrap().with_kid("k2"));

        let token = auth
            .issue_token_with(
                &7u32,
                IssueOptions::default()
                    .ttl(Duration::from_secs(5))
                    .issuer("elsewhere")
                    .kid("k2"),
            )
            .unwrap();
        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.issuer(), "elsewhere");
        assert_eq!(claims.expires_at(), NOW + 5);

        assert!(matches!(
            auth.issue_token_with(&7u32, IssueOptions::default().kid("nope")),
            Err(AuthError::UnknownKey(_))
        ));
        assert!(matches!(
            auth.issue_token_with(&7u32, IssueOptions::default().ttl(Duration::ZERO)),
            Err(AuthError::InvalidTtl)
        ));
    }

    #[test]
    fn issue_for_entity() {
        let (auth, _) = auth();
        let token = auth.issue_for(&Planet { id: Some(3) }).unwrap();
        assert_eq!(auth.verify_and_extract::<u64>(&token).unwrap(), 3);

        assert!(matches!(
            auth.issue_for(&Planet { id: None }),
            Err(AuthError::EncodingError(_))
        ));
    }

    #[test]
    fn expiry_reads_do_not_fail_on_expired_tokens() {
        let (auth, clock) = auth();
        let token = auth.issue_token(&1u32).unwrap();
        assert!(!auth.is_expired(&token).unwrap());

        clock.advance(Duration::from_secs(61));
        assert!(auth.is_expired(&token).unwrap());
        assert_eq!(auth.expiry_of(&token).unwrap(), NOW + 60);
        assert!(matches!(auth.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn expiry_reads_still_check_the_signature() {
        let (auth, _) = auth();
        let other = Authenticator::with_signer(
            TokenConfig::new(),
            SigningKey::hs256("different").unwrap().with_kid("k1"),
        );
        let token = other.issue_token(&1u32).unwrap();
        assert!(matches!(auth.expiry_of(&token), Err(AuthError::SignatureInvalid)));
        assert!(matches!(auth.is_expired(&token), Err(AuthError::SignatureInvalid)));
    }

    #[test]
    fn leeway_applies_to_verification() {
        let (auth, clock) = auth();
        auth.set_config(TokenConfig::new().leeway(Duration::from_secs(30)));
        let token = auth.issue_token(&1u32).unwrap();
        let exp = auth.expiry_of(&token).unwrap();

        clock.set(exp + 30);
        assert!(auth.verify(&token).is_ok());
        clock.set(exp + 31);
        assert!(matches!(auth.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn issuer_validation_is_opt_in() {
        let (auth, _) = auth();
        let token = auth
            .issue_token_with(&1u32, IssueOptions::default().issuer("rogue"))
            .unwrap();
        assert!(auth.verify(&token).is_ok());

        auth.set_config(auth.config().as_ref().clone().validate_issuer(true));
        assert!(matches!(auth.verify(&token), Err(AuthError::InvalidIssuer)));
    }

    #[test]
    fn configure_rotates_signer_and_policy() {
        let (auth, _) = auth();
        let before = auth.issue_token(&1u32).unwrap();

        auth.configure(
            SigningKey::hs256("rotated").unwrap().with_kid("k2"),
            Some(Duration::from_secs(10)),
            None,
        )
        .unwrap();

        let after = auth.issue_token(&2u32).unwrap();
        let claims = auth.verify(&after).unwrap();
        assert_eq!(claims.expires_at(), NOW + 10);
        assert_eq!(claims.issuer(), "test_issuer");
        assert_eq!(auth.verify_and_extract::<u32>(&before).unwrap(), 1);
        assert_eq!(auth.registry().default_signer().unwrap().kid(), Some("k2"));

        assert!(matches!(
            auth.configure(SigningKey::hs256("x").unwrap(), Some(Duration::ZERO), None),
            Err(AuthError::InvalidTtl)
        ));
    }

    #[test]
    fn configure_without_ttl_restores_the_default_lifetime() {
        let (auth, _) = auth();
        assert_eq!(auth.config().ttl, Duration::from_secs(60));

        auth.configure(SigningKey::hs256("b").unwrap().with_kid("b"), None, None)
            .unwrap();
        assert_eq!(auth.config().ttl, Duration::from_secs(86_400));
        assert_eq!(auth.config().issuer, "test_issuer");

        let claims = auth.verify(&auth.issue_token(&1u32).unwrap()).unwrap();
        assert_eq!(claims.expires_at(), NOW + 86_400);
    }

    fn header_kid(token: &str) -> String {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

        let header = URL_SAFE_NO_PAD
            .decode(token.split('.').next().unwrap())
            .unwrap();
        let header: serde_json::Value = serde_json::from_slice(&header).unwrap();
        header["kid"].as_str().unwrap().to_owned()
    }

    #[test]
    fn concurrent_configure_keeps_signer_and_policy_paired() {
        let (auth, _) = auth();
        auth.configure(
            SigningKey::hs256("secret-a").unwrap().with_kid("a"),
            Some(Duration::from_secs(10)),
            Some("a".into()),
        )
        .unwrap();

        std::thread::scope(|s| {
            for (kid, secs) in [("a", 10), ("b", 20)] {
                let auth = auth.clone();
                s.spawn(move || {
                    for _ in 0..300 {
                        auth.configure(
                            SigningKey::hs256(format!("secret-{kid}")).unwrap().with_kid(kid),
                            Some(Duration::from_secs(secs)),
                            Some(kid.into()),
                        )
                        .unwrap();
                    }
                });
            }
            for _ in 0..2 {
                let auth = auth.clone();
                s.spawn(move || {
                    for _ in 0..300 {
                        let token = auth.issue_token(&1u32).unwrap();
                        let claims = auth.verify(&token).unwrap();
                        let kid = header_kid(&token);
                        assert_eq!(claims.issuer(), kid);
                        let ttl = if kid == "a" { 10 } else { 20 };
                        assert_eq!(claims.expires_at(), NOW + ttl);
                    }
                });
            }
        });

        let config = auth.config();
        let signer = auth.registry().default_signer().unwrap();
        assert_eq!(signer.kid(), Some(config.issuer.as_str()));
        let expected = if config.issuer == "a" { 10 } else { 20 };
        assert_eq!(config.ttl, Duration::from_secs(expected));
    }

    #[test]
    fn clones_share_state() {
        let (auth, _) = auth();
        let clone = auth.clone();
        clone
            .configure(SigningKey::hs256("new").unwrap(), None, Some("renamed".into()))
            .unwrap();
        assert_eq!(auth.config().issuer, "renamed");
        let token = clone.issue_token(&1u32).unwrap();
        assert!(auth.verify(&token).is_ok());
    }
}
