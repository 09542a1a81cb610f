//! The three-segment `header.payload.signature` wire format.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::claims::Claims;
use crate::error::AuthError;
use crate::keys::{algorithm_name, SignerRegistry, SigningKey};

/// Tokens above this size are rejected before any parsing.
pub const MAX_TOKEN_BYTES: usize = 8 * 1024;

#[derive(Serialize)]
struct Header<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

/// Header as presented by a caller.  `alg` stays a string so that names we
/// do not support (`none` included) surface as an algorithm mismatch rather
/// than a parse failure.
#[derive(Deserialize)]
struct UntrustedHeader {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
    #[serde(default)]
    kid: Option<String>,
}

/// Sign `claims` with `signer`.
pub fn encode(claims: &Claims, signer: &SigningKey) -> Result<String, AuthError> {
    let header = Header {
        alg: algorithm_name(signer.algorithm()),
        typ: "JWT",
        kid: signer.kid(),
    };
    let header = serde_json::to_vec(&header)
        .map_err(|e| AuthError::EncodingError(format!("header: {e}")))?;
    let payload = serde_json::to_vec(claims)
        .map_err(|e| AuthError::EncodingError(format!("payload: {e}")))?;

    let mut token = URL_SAFE_NO_PAD.encode(header);
    token.push('.');
    token.push_str(&URL_SAFE_NO_PAD.encode(payload));

    let signature = signer.sign(token.as_bytes())?;
    token.push('.');
    token.push_str(&signature);
    Ok(token)
}

/// Parse `token`, check its signature against the key the registry
/// resolves for it, and return the claims.
///
/// No time-based checks happen here; see [`crate::validation::validate`].
#[instrument(skip_all)]
pub fn decode(token: &str, registry: &SignerRegistry) -> Result<Claims, AuthError> {
    if token.len() > MAX_TOKEN_BYTES {
        return Err(AuthError::malformed(format!(
            "token exceeds {MAX_TOKEN_BYTES} bytes"
        )));
    }

    let mut segments = token.split('.');
    let (header_b64, payload_b64, signature) =
        match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() => (h, p, s),
            _ => return Err(AuthError::malformed("expected three dot-separated segments")),
        };

    let header: UntrustedHeader = decode_segment(header_b64, "header")?;
    if let Some(typ) = &header.typ {
        if !typ.eq_ignore_ascii_case("JWT") {
            return Err(AuthError::malformed(format!("unsupported typ {typ:?}")));
        }
    }
    let claims: Claims = decode_segment(payload_b64, "payload")?;

    let signer = registry.resolve(header.kid.as_deref())?;
    check_algorithm(&header.alg, signer.algorithm())?;

    // The signed bytes are the segments exactly as received.
    let signed_len = header_b64.len() + 1 + payload_b64.len();
    let signed = token
        .get(..signed_len)
        .ok_or_else(|| AuthError::malformed("truncated token"))?;
    signer
        .verify(signed.as_bytes(), signature)
        .inspect_err(|_| {
            tracing::debug!(target: "jwt_auth.token", kid = ?header.kid, "Signature mismatch")
        })?;

    Ok(claims)
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    what: &str,
) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::malformed(format!("{what} is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::malformed(format!("{what} is not valid: {e}")))
}

/// The header's `alg` is untrusted: it only has to agree with the signer we
/// picked ourselves.
fn check_algorithm(declared: &str, expected: Algorithm) -> Result<(), AuthError> {
    match declared.parse::<Algorithm>() {
        Ok(alg) if alg == expected => Ok(()),
        _ => {
            tracing::warn!(
                target: "jwt_auth.token",
                declared,
                expected = algorithm_name(expected),
                "Token algorithm does not match signer"
            );
            Err(AuthError::AlgorithmMismatch {
                expected: algorithm_name(expected).to_owned(),
                found: declared.to_owned(),
            })
        }
    }
}
