//! Fuzz the token claim decoder with arbitrary byte sequences.
//!
//! The decoder must never panic; any input either decodes to claims or
//! returns a typed error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use voicelink_core::decode_claims;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = decode_claims(input);
    }
});
