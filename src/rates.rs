//! Ramp rate lookup.
//!
//! Devices accept a 4-bit ramp rate code. The published table gives the
//! ramp time in seconds for each code; the on/off-with-rate commands run at
//! half the published time.

use std::time::Duration;

/// Published ramp times in seconds, indexed by rate code.
const RATES: [f64; 16] = [
    2.0, 360.0, 270.0, 210.0, 150.0, 90.0, 47.0, 38.5, 32.0, 28.0, 23.5, 19.0, 6.5, 2.0, 0.3, 0.1,
];

/// Returns the rate code (1..=15) whose ramp time is closest to `duration`.
///
/// Ties go to the lower code.
#[must_use]
pub fn rate_for_duration(duration: Duration) -> u8 {
    let seconds = duration.as_secs_f64();
    let mut closest = 1;
    let mut closest_distance = f64::INFINITY;

    for (code, published) in (1u8..).zip(&RATES[1..]) {
        let distance = (published / 2.0 - seconds).abs();
        if distance < closest_distance {
            closest = code;
            closest_distance = distance;
        }
    }

    closest
}
