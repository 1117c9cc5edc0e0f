//! Fuzz identifier validation for the demo endpoints.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_record_id
//! ```

#![no_main]

use admission_gate::validation::validate_record_id;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if validate_record_id(s, "Aircraft").is_ok() {
            assert!(s.is_ascii());
            assert!(!s.is_empty());
        }
    }
});
