use chrono::{DateTime, Utc};
use rand::Rng;

const SUFFIX_LEN: usize = 8;

/// Creation/modification timestamp used across the crate.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Record id: millisecond unix time in base-36 plus a short random tail.
/// Unique enough for a single local writer, and sorts roughly by creation
/// time when compared as strings of equal length.
pub fn next_id() -> String {
    let mut id = base36(Utc::now().timestamp_millis().unsigned_abs());
    let mut rng = rand::thread_rng();
    for _ in 0..SUFFIX_LEN {
        let digit = rng.gen_range(0..36u32);
        id.push(char::from_digit(digit, 36).unwrap_or('0'));
    }
    id
}

fn base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(char::from_digit((n % 36) as u32, 36).unwrap_or('0'));
        n /= 36;
    }
    digits.iter().rev().collect()
}
