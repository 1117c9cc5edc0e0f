//! Fuzz the `RATE_LIMIT_POLICIES` parser.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_policy_table -- -max_total_time=60
//! ```
//!
//! Checks that parsing never panics, and that validating and resolving any
//! table it accepts never panics either. Accepted tables may still fail
//! validation (zero windows).

#![no_main]

use admission_gate::ratelimit::{PolicyTable, RateLimitConfig, resolve_policy};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(spec) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(table) = PolicyTable::parse(RateLimitConfig::new(60, 10, 60), spec) else {
        return;
    };

    // Zero windows may parse but must then fail validation, never panic.
    let _ = table.validate();
    let _ = table.shadowed_prefixes();

    for (prefix, _) in table.overrides() {
        let _ = resolve_policy(prefix, &table);
        let _ = resolve_policy(&format!("{prefix}/nested"), &table);
    }
});
