//! Fuzz target: `threshold::estimate`
//!
//! Interprets the input as little-endian `f32` baseline samples (NaN and
//! infinities included) and checks that the model is always usable: a
//! finite threshold inside `[0, brightness_max]`, and the fail-safe
//! exactly when no finite sample survives.
//!
//! cargo fuzz run fuzz_threshold

#![no_main]

use libfuzzer_sys::fuzz_target;
use tooltest::analysis::threshold::{self, ThresholdParams};

fuzz_target!(|data: &[u8]| {
    let samples: Vec<f32> = data
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let params = ThresholdParams::default();
    let model = threshold::estimate(&samples, &params);

    let finite = samples.iter().filter(|s| s.is_finite()).count();
    assert_eq!(model.fallback, finite == 0);
    assert_eq!(model.sample_count, finite);
    assert!(model.effective_threshold >= 0.0);
    assert!(model.effective_threshold <= params.brightness_max);
    assert!(!model.exceeds_ambient(None));
    if model.fallback {
        assert!(!model.exceeds_ambient(Some(0.0)));
    }
});
