//! CSRF protection
//!
//! Every client gets a random 32 byte token stored in a private cookie.
//! Handlers hand out a masked copy of it (a fresh one-time pad followed by
//! the token XORed with the pad) so the value in the page changes on every
//! request. Requests with an unsafe method must echo a masked token in the
//! `X-CSRF-Token` header.

use axum::{
    extract::Request,
    http::{HeaderName, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cookie::time::Duration as CookieDuration;
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, warn};

use crate::api::error::ApiError;

pub const CSRF_COOKIE: &str = "mailwebadmin-csrf";
pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");

const TOKEN_LEN: usize = 32;
const COOKIE_MAX_AGE_SECS: i64 = 12 * 3600;

/// Masked token for the current request, inserted as a request extension.
#[derive(Debug, Clone)]
pub struct CsrfToken(pub String);

fn random_bytes() -> [u8; TOKEN_LEN] {
    let mut bytes = [0u8; TOKEN_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

pub fn mask_token(real: &[u8; TOKEN_LEN]) -> String {
    let otp = random_bytes();
    let mut masked = Vec::with_capacity(2 * TOKEN_LEN);
    masked.extend_from_slice(&otp);
    masked.extend(otp.iter().zip(real.iter()).map(|(o, r)| o ^ r));
    BASE64.encode(masked)
}

pub fn unmask_token(masked: &str) -> Option<[u8; TOKEN_LEN]> {
    let bytes = BASE64.decode(masked.trim()).ok()?;
    if bytes.len() != 2 * TOKEN_LEN {
        return None;
    }
    let (otp, xored) = bytes.split_at(TOKEN_LEN);
    let mut real = [0u8; TOKEN_LEN];
    for (i, byte) in real.iter_mut().enumerate() {
        *byte = otp[i] ^ xored[i];
    }
    Some(real)
}

fn tokens_equal(a: &[u8; TOKEN_LEN], b: &[u8; TOKEN_LEN]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn is_safe_method(method: &Method) -> bool {
    [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE].contains(method)
}

fn stored_token(jar: &PrivateCookieJar) -> Option<[u8; TOKEN_LEN]> {
    let cookie = jar.get(CSRF_COOKIE)?;
    let bytes = BASE64.decode(cookie.value()).ok()?;
    bytes.try_into().ok()
}

/// Middleware checking the CSRF token on unsafe requests.
pub async fn protect(jar: PrivateCookieJar, mut req: Request, next: Next) -> Response {
    let (real, jar) = match stored_token(&jar) {
        Some(real) => (real, jar),
        None => {
            let real = random_bytes();
            let cookie = Cookie::build((CSRF_COOKIE, BASE64.encode(real)))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Strict)
                .max_age(CookieDuration::seconds(COOKIE_MAX_AGE_SECS));
            debug!("Issuing new CSRF token");
            (real, jar.add(cookie.build()))
        }
    };

    if !is_safe_method(req.method()) {
        let valid = req
            .headers()
            .get(&CSRF_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(unmask_token)
            .map(|sent| tokens_equal(&sent, &real))
            .unwrap_or(false);

        if !valid {
            warn!(method = %req.method(), path = %req.uri().path(), "CSRF token invalid");
            return (
                jar,
                ApiError::Forbidden("Forbidden - CSRF token invalid".to_string()),
            )
                .into_response();
        }
    }

    req.extensions_mut().insert(CsrfToken(mask_token(&real)));
    let response = next.run(req).await;
    (jar, response).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_unmask() {
        let real = random_bytes();
        let a = mask_token(&real);
        let b = mask_token(&real);

        assert_ne!(a, b);
        assert_eq!(unmask_token(&a), Some(real));
        assert_eq!(unmask_token(&b), Some(real));
    }

    #[test]
    fn test_unmask_rejects_garbage() {
        assert_eq!(unmask_token("not base64!"), None);
        assert_eq!(unmask_token(&BASE64.encode([0u8; 16])), None);
    }

    #[test]
    fn test_tokens_equal() {
        let a = random_bytes();
        let mut b = a;
        assert!(tokens_equal(&a, &b));
        b[31] ^= 1;
        assert!(!tokens_equal(&a, &b));
    }

    #[test]
    fn test_safe_methods() {
        assert!(is_safe_method(&Method::GET));
        assert!(is_safe_method(&Method::HEAD));
        assert!(!is_safe_method(&Method::POST));
        assert!(!is_safe_method(&Method::DELETE));
        assert!(!is_safe_method(&Method::from_bytes(b"UPDATE").unwrap()));
    }
}
