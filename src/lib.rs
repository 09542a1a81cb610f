//! # jwt-authenticatable
//!
//! Issue signed bearer tokens for any entity that has an identifier, and
//! verify them back into that identifier.
//!
//! The core is synchronous and framework-free: an [`Authenticator`] owns a
//! [`SignerRegistry`] of signing keys and a [`TokenConfig`] policy.  Signing
//! itself is delegated to [`jsonwebtoken::crypto`].  An axum extractor and a
//! plain [`authenticate`] function cover the HTTP side.  Implement
//! [`SubjectLookup`] to have the [`AuthEntity`] extractor load the subject
//! from your own storage.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use jwt_authenticatable::{Authenticator, HasIdentifier, SigningKey, TokenConfig};
//! use uuid::Uuid;
//!
//! struct Planet { id: Option<Uuid>, name: String }
//!
//! impl HasIdentifier for Planet {
//!     type Id = Uuid;
//!     fn identifier(&self) -> Option<Uuid> { self.id }
//! }
//!
//! # fn main() -> Result<(), jwt_authenticatable::AuthError> {
//! let auth = Authenticator::with_signer(
//!     TokenConfig::new().issuer("test_issuer").ttl(Duration::from_secs(3600)),
//!     SigningKey::hs256("keep-me-out-of-source-control")?.with_kid("2024-01"),
//! );
//!
//! let planet = Planet {
//!     id: Uuid::parse_str("d45009dd-e45a-493e-b432-805235cf7d27").ok(),
//!     name: "Mars".into(),
//! };
//! let token = auth.issue_for(&planet)?;
//! let id: Uuid = auth.verify_and_extract(&token)?;
//! assert_eq!(Some(id), planet.id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Axum
//!
//! ```rust,no_run
//! use axum::{routing::get, Extension, Router};
//! use jwt_authenticatable::{AuthSubject, Authenticator};
//!
//! async fn me(user: AuthSubject<u64>) -> String {
//!     format!("user_id = {}", user.subject)
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     // JWT_SIGNER_KEY must be set; see `TokenConfig::from_env` and
//!     // `SigningKey::from_env` for the optional variables.
//!     let auth = Authenticator::from_env().unwrap();
//!
//!     let app: Router = Router::new()
//!         .route("/me", get(me))
//!         .layer(Extension(auth));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! Every rejection renders as the same `401 {"error":"unauthorized"}`; the
//! specific [`AuthError`] is only logged.
//!
//! ## Key rotation
//!
//! Give keys a `kid`.  [`Authenticator::configure`] installs a new default
//! signer while older keys stay registered, so tokens they signed keep
//! verifying until [`SignerRegistry::remove`] retires them.
//!
//! ## Environment variables (`Authenticator::from_env`)
//!
//! This crate does **not** load `.env` files.
//!
//! | Variable              | Required | Default               |
//! |-----------------------|----------|-----------------------|
//! | `JWT_SIGNER_KEY`      | **yes**  | —                     |
//! | `JWT_ALGORITHM`       | no       | `HS256`               |
//! | `JWT_KEY_ID`          | no       | *(no kid)*            |
//! | `JWT_ISSUER`          | no       | `jwt-authenticatable` |
//! | `JWT_TTL_SECS`        | no       | `86400`               |
//! | `JWT_LEEWAY_SECS`     | no       | `0`                   |
//! | `JWT_VALIDATE_ISSUER` | no       | `false`               |

pub mod authenticator;
pub mod claims;
pub mod config;
pub mod error;
pub mod keys;
pub mod middleware;
pub mod token;
pub mod validation;

pub use authenticator::{Authenticator, IssueOptions};
pub use claims::{Claims, HasIdentifier, SubjectId};
pub use config::TokenConfig;
pub use error::AuthError;
pub use jsonwebtoken::Algorithm;
pub use keys::{SignerRegistry, SigningKey};
pub use middleware::{
    authenticate, authenticate_entity, bearer_token, AuthEntity, AuthSubject,
    OptionalAuthSubject, SubjectLookup,
};
pub use validation::{Clock, ManualClock, SystemClock};
