pub mod geo;
pub mod slug;
pub mod time;

pub use geo::*;
pub use slug::*;
pub use time::*;

/// Rounds to a fixed number of decimal digits for presentation values that
/// land in JSON documents.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

#[test]
fn round_to_test() {
    assert_eq!(round_to(1.23456, 2), 1.23);
    assert_eq!(round_to(1.25, 1), 1.3);
    assert_eq!(round_to(-1.25, 1), -1.3);
}
