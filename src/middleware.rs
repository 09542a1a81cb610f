use std::future::Future;

use axum::extract::FromRequestParts;
use http::request::Parts;
use http::HeaderMap;

use crate::authenticator::Authenticator;
use crate::claims::{Claims, SubjectId};
use crate::error::AuthError;

/// The token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(http::header::AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeaderFormat)?;

    match header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AuthError::InvalidBearerFormat),
    }
}

/// Authenticate a request by its headers and return the subject.
///
/// This is the whole guard: any HTTP layer can call it before running a
/// handler and turn an `Err` into a 401.  [`authenticate_entity`] goes one
/// step further and loads the subject through a [`SubjectLookup`].
pub fn authenticate<T: SubjectId>(
    headers: &HeaderMap,
    auth: &Authenticator,
) -> Result<T, AuthError> {
    auth.verify_and_extract(bearer_token(headers)?)
}

/// Loads the entity a token was issued for.
///
/// Implement this for whatever holds your users (a pool handle, a cache, an
/// in-memory map) and the guard turns "no such entity" into the same 401 as
/// any other rejection.
///
/// ```rust
/// use std::collections::HashMap;
/// use std::sync::Arc;
/// use jwt_authenticatable::SubjectLookup;
///
/// #[derive(Clone)]
/// struct Users(Arc<HashMap<u64, String>>);
///
/// impl SubjectLookup for Users {
///     type Id = u64;
///     type Entity = String;
///
///     async fn find(&self, id: &u64) -> Option<String> {
///         self.0.get(id).cloned()
///     }
/// }
/// ```
pub trait SubjectLookup: Send + Sync + 'static {
    type Id: SubjectId + Send + Sync + 'static;
    type Entity: Send;

    fn find(&self, id: &Self::Id) -> impl Future<Output = Option<Self::Entity>> + Send;
}

async fn find_subject<L: SubjectLookup>(lookup: &L, id: &L::Id) -> Result<L::Entity, AuthError> {
    lookup.find(id).await.ok_or_else(|| {
        tracing::debug!(target: "jwt_auth.http", "Token subject has no matching entity");
        AuthError::SubjectNotFound
    })
}

/// [`authenticate`], then resolve the subject with `lookup`.
///
/// A valid token whose subject no longer exists fails with
/// [`AuthError::SubjectNotFound`].
pub async fn authenticate_entity<L: SubjectLookup>(
    headers: &HeaderMap,
    auth: &Authenticator,
    lookup: &L,
) -> Result<L::Entity, AuthError> {
    let id = authenticate::<L::Id>(headers, auth)?;
    find_subject(lookup, &id).await
}

/// Axum extractor: validates the bearer token and provides the subject.
///
/// The [`Authenticator`] is read from the request extensions.
///
/// ```rust,no_run
/// use axum::{routing::get, Extension, Router};
/// use jwt_authenticatable::{AuthSubject, Authenticator};
///
/// async fn me(user: AuthSubject<u64>) -> String {
///     format!("user_id = {}", user.subject)
/// }
///
/// # fn example() -> Result<(), jwt_authenticatable::AuthError> {
/// let auth = Authenticator::from_env()?;
/// let app: Router = Router::new()
///     .route("/me", get(me))
///     .layer(Extension(auth));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuthSubject<T = String> {
    pub subject: T,

    /// Full decoded claims.
    pub claims: Claims,

    /// Raw bearer token (useful for forwarding to another service).
    pub token: String,
}

impl<S, T> FromRequestParts<S> for AuthSubject<T>
where
    S: Send + Sync,
    T: SubjectId + Send + Sync + 'static,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = parts.extensions.get::<Authenticator>().ok_or_else(|| {
            AuthError::ConfigError(
                "Authenticator not found, add `.layer(Extension(authenticator))`".into(),
            )
        })?;

        let token = bearer_token(&parts.headers)?;
        let claims = auth.verify(token)?;
        let subject = claims.subject_as::<T>()?;

        Ok(AuthSubject {
            subject,
            claims,
            token: token.to_owned(),
        })
    }
}

/// Like [`AuthSubject`] but yields `None` when no `Authorization` header
/// is present.  A malformed header or bad token still rejects.
#[derive(Debug, Clone)]
pub struct OptionalAuthSubject<T = String>(Option<AuthSubject<T>>);

impl<T> OptionalAuthSubject<T> {
    pub fn into_inner(self) -> Option<AuthSubject<T>> {
        self.0
    }
    pub fn as_ref(&self) -> Option<&AuthSubject<T>> {
        self.0.as_ref()
    }
}

impl<S, T> FromRequestParts<S> for OptionalAuthSubject<T>
where
    S: Send + Sync,
    T: SubjectId + Send + Sync + 'static,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if parts.headers.get(http::header::AUTHORIZATION).is_none() {
            return Ok(Self(None));
        }
        AuthSubject::from_request_parts(parts, state)
            .await
            .map(|u| Self(Some(u)))
    }
}

/// Axum extractor: like [`AuthSubject`] but yields the stored entity.
///
/// Both the [`Authenticator`] and the lookup `L` are read from the request
/// extensions, so the router needs `.layer(Extension(lookup))` as well.
pub struct AuthEntity<L: SubjectLookup> {
    pub entity: L::Entity,

    /// Full decoded claims.
    pub claims: Claims,

    /// Raw bearer token.
    pub token: String,
}

impl<S, L> FromRequestParts<S> for AuthEntity<L>
where
    S: Send + Sync,
    L: SubjectLookup + Clone,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let lookup = parts.extensions.get::<L>().cloned().ok_or_else(|| {
            AuthError::ConfigError(format!(
                "{} not found, add `.layer(Extension(lookup))`",
                std::any::type_name::<L>()
            ))
        })?;

        let AuthSubject {
            subject,
            claims,
            token,
        } = AuthSubject::<L::Id>::from_request_parts(parts, state).await?;
        let entity = find_subject(&lookup, &subject).await?;

        Ok(AuthEntity {
            entity,
            claims,
            token,
        })
    }
}
