//! Token generation for the confirm, recover and remember flows.
//!
//! Confirm and recover use split tokens: 64 random bytes go to the user, the storer only
//! keeps SHA-512 digests of the two halves. The first half (selector) finds the record,
//! the second (verifier) proves possession.
//!
//! Remember tokens are `pid;<32 random bytes>`. The cookie carries the raw token and the
//! storer keeps its SHA-512 digest.
use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, URL_SAFE},
};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha512};

use crate::error::AuthError;

/// Random bytes in a remember token, after the PID.
const NONCE_SIZE: usize = 32;
/// Bytes in a selector/verifier token.
const SPLIT_TOKEN_SIZE: usize = 64;

/// Credentials produced for a confirm or recover request.
#[derive(Debug, Clone)]
pub struct SplitTokenCreds {
    pub selector: String,
    pub verifier: String,
    /// URL-safe token mailed to the user.
    pub token: String,
}

pub fn generate_split_token() -> SplitTokenCreds {
    let mut raw = [0u8; SPLIT_TOKEN_SIZE];
    OsRng.fill_bytes(&mut raw);

    let (selector_half, verifier_half) = raw.split_at(SPLIT_TOKEN_SIZE / 2);
    SplitTokenCreds {
        selector: STANDARD.encode(Sha512::digest(selector_half)),
        verifier: STANDARD.encode(Sha512::digest(verifier_half)),
        token: URL_SAFE.encode(raw),
    }
}

/// Selector and verifier digests recovered from a mailed token.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitToken {
    pub selector: String,
    pub verifier: String,
}

pub fn parse_split_token(token: &str) -> Result<SplitToken, AuthError> {
    let raw = URL_SAFE
        .decode(token)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    if raw.len() != SPLIT_TOKEN_SIZE {
        return Err(AuthError::InvalidToken(format!(
            "expected {SPLIT_TOKEN_SIZE} bytes, got {}",
            raw.len()
        )));
    }

    let (selector_half, verifier_half) = raw.split_at(SPLIT_TOKEN_SIZE / 2);
    Ok(SplitToken {
        selector: STANDARD.encode(Sha512::digest(selector_half)),
        verifier: STANDARD.encode(Sha512::digest(verifier_half)),
    })
}

/// Compares a stored verifier against a presented one.
pub fn verifier_matches(stored: Option<&str>, presented: &str) -> bool {
    match stored {
        // Comparing digests keeps the timing independent of the stored value.
        Some(stored) => Sha512::digest(stored.as_bytes()) == Sha512::digest(presented.as_bytes()),
        None => false,
    }
}

/// A freshly issued remember token.
#[derive(Debug, Clone)]
pub struct RememberToken {
    /// Digest handed to the storer.
    pub hash: String,
    /// Value of the remember cookie.
    pub cookie: String,
}

pub fn generate_remember_token(pid: &str) -> RememberToken {
    let mut raw = Vec::with_capacity(pid.len() + 1 + NONCE_SIZE);
    raw.extend_from_slice(pid.as_bytes());
    raw.push(b';');

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    raw.extend_from_slice(&nonce);

    RememberToken {
        hash: STANDARD.encode(Sha512::digest(&raw)),
        cookie: URL_SAFE.encode(&raw),
    }
}

/// Splits a remember cookie into its PID and the digest the storer holds.
pub fn parse_remember_cookie(cookie: &str) -> Result<(String, String), AuthError> {
    let raw = URL_SAFE
        .decode(cookie)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    // The separator sits right before the nonce, whatever the PID contains.
    if raw.len() <= NONCE_SIZE || raw[raw.len() - NONCE_SIZE - 1] != b';' {
        return Err(AuthError::InvalidToken("malformed remember token".into()));
    }

    let pid = String::from_utf8(raw[..raw.len() - NONCE_SIZE - 1].to_vec())
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    Ok((pid, STANDARD.encode(Sha512::digest(&raw))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_token_parses_back_to_stored_digests() {
        let creds = generate_split_token();
        let parsed = parse_split_token(&creds.token).unwrap();

        assert_eq!(parsed.selector, creds.selector);
        assert!(verifier_matches(Some(&creds.verifier), &parsed.verifier));
    }

    #[test]
    fn split_tokens_are_unique() {
        let a = generate_split_token();
        let b = generate_split_token();
        assert_ne!(a.token, b.token);
        assert_ne!(a.selector, b.selector);
    }

    #[test]
    fn short_split_token_rejected() {
        let short = URL_SAFE.encode([7u8; 10]);
        assert!(matches!(
            parse_split_token(&short),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(parse_split_token("%%%").is_err());
    }

    #[test]
    fn verifier_mismatch() {
        assert!(!verifier_matches(Some("abc"), "abd"));
        assert!(!verifier_matches(None, "abc"));
    }

    #[test]
    fn remember_cookie_round_trip_keeps_pid_with_separator() {
        let token = generate_remember_token("odd;pid@example.com");
        let (pid, hash) = parse_remember_cookie(&token.cookie).unwrap();

        assert_eq!(pid, "odd;pid@example.com");
        assert_eq!(hash, token.hash);
    }

    #[test]
    fn remember_cookie_garbage() {
        assert!(parse_remember_cookie("not base64 !").is_err());
        assert!(parse_remember_cookie(&URL_SAFE.encode(b"short")).is_err());
    }
}
