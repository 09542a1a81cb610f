use std::time::Duration;

use crate::error::AuthError;

pub const DEFAULT_ISSUER: &str = "jwt-authenticatable";

/// 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default issuance and verification policy.
///
/// Build with [`new`](Self::new) and the chained setters, or with
/// [`from_env`](Self::from_env).  The signing key itself lives in the
/// [`SignerRegistry`](crate::SignerRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    pub issuer: String,
    pub ttl: Duration,
    /// Grace period after `exp` during which a token is still accepted.
    pub leeway: Duration,
    /// When set, tokens whose `iss` differs from `issuer` are rejected.
    pub validate_issuer: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenConfig {
    pub fn new() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.into(),
            ttl: DEFAULT_TTL,
            leeway: Duration::ZERO,
            validate_issuer: false,
        }
    }

    /// Build from environment variables already set in the process.
    ///
    /// | Variable              | Required | Default               | Notes                    |
    /// |-----------------------|----------|-----------------------|--------------------------|
    /// | `JWT_ISSUER`          | no       | `jwt-authenticatable` |                          |
    /// | `JWT_TTL_SECS`        | no       | `86400`               | Must be at least 1       |
    /// | `JWT_LEEWAY_SECS`     | no       | `0`                   |                          |
    /// | `JWT_VALIDATE_ISSUER` | no       | `false`               | `true` or `1` to enable  |
    ///
    /// The signing key is read separately by
    /// [`SigningKey::from_env`](crate::SigningKey::from_env).
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let issuer = lookup("JWT_ISSUER")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_ISSUER.into());

        let ttl = match lookup("JWT_TTL_SECS") {
            Some(v) => Duration::from_secs(parse_secs("JWT_TTL_SECS", &v)?),
            None => DEFAULT_TTL,
        };
        if ttl.as_secs() == 0 {
            return Err(AuthError::ConfigError("JWT_TTL_SECS must be at least 1".into()));
        }

        let leeway = match lookup("JWT_LEEWAY_SECS") {
            Some(v) => Duration::from_secs(parse_secs("JWT_LEEWAY_SECS", &v)?),
            None => Duration::ZERO,
        };

        let validate_issuer = lookup("JWT_VALIDATE_ISSUER")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            issuer,
            ttl,
            leeway,
            validate_issuer,
        })
    }

    pub fn issuer(mut self, v: impl Into<String>) -> Self {
        self.issuer = v.into();
        self
    }
    pub fn ttl(mut self, v: Duration) -> Self {
        self.ttl = v;
        self
    }
    pub fn leeway(mut self, v: Duration) -> Self {
        self.leeway = v;
        self
    }
    pub fn validate_issuer(mut self, v: bool) -> Self {
        self.validate_issuer = v;
        self
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64, AuthError> {
    value
        .trim()
        .parse()
        .map_err(|_| AuthError::ConfigError(format!("{name} must be a whole number of seconds")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        move |k: &str| vars.get(k).map(|v| v.to_string())
    }

    #[test]
    fn defaults() {
        let cfg = TokenConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, TokenConfig::new());
        assert_eq!(cfg.issuer, "jwt-authenticatable");
        assert_eq!(cfg.ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.leeway, Duration::ZERO);
        assert!(!cfg.validate_issuer);
    }

    #[test]
    fn reads_all_variables() {
        let cfg = TokenConfig::from_lookup(lookup(&[
            ("JWT_ISSUER", "test_issuer"),
            ("JWT_TTL_SECS", "10"),
            ("JWT_LEEWAY_SECS", " 5 "),
            ("JWT_VALIDATE_ISSUER", "1"),
        ]))
        .unwrap();
        assert_eq!(
            cfg,
            TokenConfig::new()
                .issuer("test_issuer")
                .ttl(Duration::from_secs(10))
                .leeway(Duration::from_secs(5))
                .validate_issuer(true)
        );
    }

    #[test]
    fn rejects_bad_numbers() {
        for vars in [
            [("JWT_TTL_SECS", "ten")],
            [("JWT_TTL_SECS", "0")],
            [("JWT_TTL_SECS", "-1")],
            [("JWT_LEEWAY_SECS", "1.5")],
        ] {
            assert!(matches!(
                TokenConfig::from_lookup(lookup(&vars)),
                Err(AuthError::ConfigError(_))
            ));
        }
    }
}
