// ABOUTME: PKCE (RFC 7636) code verifier/challenge and CSRF state generation for the connect flow
// ABOUTME: Only SHA-256 hashes of the state are stored; comparison is constant time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::{Distribution, Uniform};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Verifier length; RFC 7636 allows 43 to 128
pub const CODE_VERIFIER_LEN: usize = 64;

/// Bytes of entropy in a CSRF state token
const STATE_BYTES: usize = 32;

/// RFC 7636 unreserved characters
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// A verifier and the S256 challenge derived from it
pub struct PkceChallenge {
    /// Secret verifier, sealed before storage
    pub code_verifier: Zeroizing<String>,
    /// `base64url(SHA-256(code_verifier))`, sent in the authorization URL
    pub code_challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh random verifier and its challenge
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let alphabet = Uniform::from(0..UNRESERVED.len());
        let code_verifier: String = (0..CODE_VERIFIER_LEN)
            .map(|_| char::from(UNRESERVED[alphabet.sample(&mut rng)]))
            .collect();
        let code_challenge = challenge_for(&code_verifier);
        Self {
            code_verifier: Zeroizing::new(code_verifier),
            code_challenge,
        }
    }
}

/// S256 challenge for a verifier
#[must_use]
pub fn challenge_for(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Random URL-safe CSRF state token
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex SHA-256 of a state token, the only form persisted
#[must_use]
pub fn hash_state(state: &str) -> String {
    hex::encode(Sha256::digest(state.as_bytes()))
}

/// Whether `state` hashes to `stored_hash`, compared in constant time
#[must_use]
pub fn state_matches(state: &str, stored_hash: &str) -> bool {
    hash_state(state)
        .as_bytes()
        .ct_eq(stored_hash.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_uses_unreserved_alphabet_and_valid_length() {
        let pkce = PkceChallenge::generate();
        assert_eq!(pkce.code_verifier.len(), CODE_VERIFIER_LEN);
        assert!((43..=128).contains(&pkce.code_verifier.len()));
        assert!(pkce
            .code_verifier
            .bytes()
            .all(|b| UNRESERVED.contains(&b)));
    }

    #[test]
    fn challenge_is_base64url_sha256_of_verifier() {
        let pkce = PkceChallenge::generate();
        assert_ne!(pkce.code_challenge, *pkce.code_verifier);
        assert_eq!(pkce.code_challenge, challenge_for(&pkce.code_verifier));
        assert!(!pkce.code_challenge.contains('='));
    }

    #[test]
    fn rfc7636_appendix_b_vector() {
        assert_eq!(
            challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn state_hash_round_trip() {
        let state = generate_state();
        let stored = hash_state(&state);
        assert_ne!(stored, state);
        assert!(state_matches(&state, &stored));
        assert!(!state_matches("forged", &stored));
        assert_ne!(generate_state(), state);
    }
}
