//! URL signing with HMAC-SHA256
//!
//! The token is computed over the canonical fingerprint of the request:
//!
//! ```text
//! token = base64url_nopad(HMAC-SHA256(secret, fingerprint))
//! path  = token "/" fingerprint
//! ```
//!
//! Verification requires the unsigned part of the path to already be in
//! canonical form, so any edit to it, including one that parses to the
//! same parameters, invalidates the token.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{fingerprint, parse, Params};
use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// Compute the signature token for a fingerprint
pub fn sign(fingerprint: &str, secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(fingerprint.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

/// Build a signed request path (`TOKEN/fingerprint`) for `params`
pub fn signed_path(params: &Params, secret: &[u8]) -> String {
    let fingerprint = fingerprint(params);
    format!("{}/{}", sign(&fingerprint, secret), fingerprint)
}

/// Parse `path` and verify its signature
pub fn verify(path: &str, secret: &[u8], unsafe_allowed: bool) -> Result<Params, GatewayError> {
    let params = parse(path)?;
    verify_params(&params, secret, unsafe_allowed)?;
    Ok(params)
}

/// Verify the signature carried by already-parsed params.
///
/// - `unsafe/` requests pass only when `unsafe_allowed` is set.
/// - With `unsafe_allowed` and an empty secret, verification is skipped.
/// - Otherwise the token must match in constant time.
pub fn verify_params(
    params: &Params,
    secret: &[u8],
    unsafe_allowed: bool,
) -> Result<(), GatewayError> {
    if params.is_unsafe {
        return if unsafe_allowed {
            Ok(())
        } else {
            Err(GatewayError::Signature)
        };
    }

    if secret.is_empty() {
        return if unsafe_allowed {
            Ok(())
        } else {
            Err(GatewayError::Signature)
        };
    }

    let token = params.signature.as_deref().ok_or(GatewayError::Signature)?;

    let expected_payload = fingerprint(params);
    if params.path != expected_payload {
        return Err(GatewayError::Signature);
    }

    let provided = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| GatewayError::Signature)?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| GatewayError::Signature)?;
    mac.update(expected_payload.as_bytes());
    mac.verify_slice(&provided)
        .map_err(|_| GatewayError::Signature)
}
