// ABOUTME: Cryptographic primitives for the broker: secret sealing and PKCE material
// ABOUTME: All randomness comes from the operating system CSPRNG
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

/// PKCE verifier/challenge and CSRF state generation
pub mod pkce;
/// AES-256-GCM authenticated sealing of secrets at rest
pub mod sealer;

pub use pkce::{generate_state, hash_state, state_matches, PkceChallenge};
pub use sealer::{generate_encryption_key, SecretSealer, ENCRYPTION_KEY_LEN};
