//! Fuzz target: configuration documents
//!
//! Arbitrary bytes go through the same serde path the JSON config file
//! uses.  Parsing may fail, but a document that parses and validates must
//! yield bounded derived values.
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use libfuzzer_sys::fuzz_target;
use tooltest::config::TestConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(cfg) = serde_json::from_slice::<TestConfig>(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    assert!(cfg.baseline_sample_count() >= cfg.min_baseline_samples.min(512));
    assert!(cfg.baseline_sample_count() <= 512);
    assert!(cfg.concurrent_segments() >= 1);
});
