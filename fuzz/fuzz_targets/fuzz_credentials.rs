//! Fuzz testing for the credential and request-header parsers.
//!
//! Every parser here reads attacker-controlled text, so for any input it must
//! return a `Result` and never panic.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_credentials -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `CredentialHash::parse`: stored hash decoding, plus the invariant that
//!   anything it accepts re-serializes byte-for-byte
//! - `parse_authorization`: `<scheme> <token>` header splitting
//! - `parse_client_address`: client IP parsing in both deployment modes
//! - `AccessPolicy::is_public_route`: allow-list prefix matching

#![no_main]

use libfuzzer_sys::fuzz_target;
use coffee_api::Mode;
use coffee_api::auth::CredentialHash;
use coffee_api::auth::claims::parse_authorization;
use coffee_api::config::DEFAULT_AUTH_BYPASS_PATHS;
use coffee_api::middleware::{AccessPolicy, parse_client_address};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(hash) = CredentialHash::parse(s) {
        assert_eq!(hash.to_string(), s);
        // Verification with an unknown algorithm or odd salt must not panic.
        // Cap the cost so the fuzzer keeps moving.
        if hash.iterations() <= 16 {
            let _ = hash.verify("password");
        }
    }

    if let Ok(token) = parse_authorization(s) {
        assert!(!token.contains(' '));
    }

    let _ = parse_client_address(s, Mode::Development);
    let _ = parse_client_address(s, Mode::Production);

    let policy = AccessPolicy::new(DEFAULT_AUTH_BYPASS_PATHS);
    let _ = policy.is_public_route(s);
});
