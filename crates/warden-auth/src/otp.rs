//! Deterministic time-windowed one-time passwords.
//!
//! A code is derived from `SHA-256(key ++ salt ++ counter)` where
//! `counter = floor(unix_time / time_step)`, then reduced to six digits with
//! the dynamic truncation used by HOTP. Nothing is stored: producer and
//! verifier recompute the same code from the same inputs.
//!
//! Codes are guessable within their validity window from `key` and `salt`
//! alone, so every verification path must be throttled by the
//! [`RateLimiter`](crate::rate_limit::RateLimiter).

use std::time::Duration;

use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Number of digits in a generated code.
pub const CODE_DIGITS: usize = 6;

const CODE_MODULUS: u32 = 1_000_000;

/// Stateless OTP generator/verifier.
#[derive(Debug, Clone, Copy)]
pub struct OtpGenerator {
    time_step: i64,
}

impl OtpGenerator {
    /// Creates a generator with the given window length (at least one second).
    #[must_use]
    pub fn new(time_step: Duration) -> Self {
        Self {
            time_step: i64::try_from(time_step.as_secs())
                .unwrap_or(i64::MAX)
                .max(1),
        }
    }

    /// Window length.
    #[must_use]
    pub fn time_step(&self) -> Duration {
        Duration::from_secs(self.time_step.unsigned_abs())
    }

    /// Generates the code for the current window.
    #[must_use]
    pub fn generate(&self, key: &str, salt: &str) -> String {
        self.generate_at(key, salt, now_unix())
    }

    /// Generates the code for the window containing `unix_time`.
    #[must_use]
    pub fn generate_at(&self, key: &str, salt: &str, unix_time: i64) -> String {
        code_for_counter(key, salt, self.counter(unix_time))
    }

    /// Checks `candidate` against the current and the previous window.
    #[must_use]
    pub fn verify(&self, key: &str, salt: &str, candidate: &str) -> bool {
        self.verify_at(key, salt, candidate, now_unix())
    }

    /// Checks `candidate` as if the current time were `unix_time`.
    ///
    /// Anything other than exactly six ASCII digits is rejected without
    /// hashing.
    #[must_use]
    pub fn verify_at(&self, key: &str, salt: &str, candidate: &str, unix_time: i64) -> bool {
        if candidate.len() != CODE_DIGITS || !candidate.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }

        let counter = self.counter(unix_time);
        [Some(counter), counter.checked_sub(1)]
            .into_iter()
            .flatten()
            .any(|c| {
                constant_time_eq(code_for_counter(key, salt, c).as_bytes(), candidate.as_bytes())
            })
    }

    fn counter(&self, unix_time: i64) -> i64 {
        unix_time.div_euclid(self.time_step)
    }
}

fn code_for_counter(key: &str, salt: &str, counter: i64) -> String {
    let hash = Sha256::digest(format!("{key}{salt}{counter}").as_bytes());

    let offset = usize::from(hash[hash.len() - 1] & 0x0F);
    let value = u32::from_be_bytes([
        hash[offset] & 0x7F,
        hash[offset + 1],
        hash[offset + 2],
        hash[offset + 3],
    ]);

    format!("{:0width$}", value % CODE_MODULUS, width = CODE_DIGITS)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "+15550001234";
    const SALT: &str = "salt1";

    fn generator() -> OtpGenerator {
        OtpGenerator::new(Duration::from_secs(60))
    }

    #[test]
    fn test_known_codes() {
        let otp = generator();
        // counter 16 covers [960, 1020)
        assert_eq!(otp.generate_at(KEY, SALT, 1000), "167730");
        assert_eq!(otp.generate_at(KEY, SALT, 960), "167730");
        assert_eq!(otp.generate_at(KEY, SALT, 1020), "787665");
        assert_eq!(otp.generate_at(KEY, SALT, 959), "327090");
    }

    #[test]
    fn test_code_shape() {
        let otp = generator();
        for t in [0, 59, 1_700_000_000, 1_700_000_061] {
            let code = otp.generate_at("user@example.com", "pepper", t);
            assert_eq!(code.len(), CODE_DIGITS);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_code_accepted_in_current_and_next_window() {
        let otp = generator();
        let code = otp.generate_at(KEY, SALT, 1000);

        assert!(otp.verify_at(KEY, SALT, &code, 1000));
        assert!(otp.verify_at(KEY, SALT, &code, 1050));
        assert!(otp.verify_at(KEY, SALT, &code, 1079));
    }

    #[test]
    fn test_code_rejected_after_two_windows() {
        let otp = generator();
        let code = otp.generate_at(KEY, SALT, 1000);

        assert!(!otp.verify_at(KEY, SALT, &code, 1130));
        assert!(!otp.verify_at(KEY, SALT, &code, 1080));
    }

    #[test]
    fn test_code_bound_to_key_and_salt() {
        let otp = generator();
        let code = otp.generate_at(KEY, SALT, 1000);

        assert!(!otp.verify_at("+15550009999", SALT, &code, 1000));
        assert!(!otp.verify_at(KEY, "salt2", &code, 1000));
    }

    #[test]
    fn test_malformed_candidates_rejected() {
        let otp = generator();
        for candidate in ["", "12345", "1234567", "12a456", " 67730", "１６７７３"] {
            assert!(!otp.verify_at(KEY, SALT, candidate, 1000), "{candidate:?}");
        }
    }

    #[test]
    fn test_generate_matches_verify_now() {
        let otp = generator();
        let code = otp.generate(KEY, SALT);
        assert!(otp.verify(KEY, SALT, &code));
    }

    #[test]
    fn test_verify_at_earliest_counter() {
        let otp = OtpGenerator::new(Duration::from_secs(1));
        let code = otp.generate_at(KEY, SALT, i64::MIN);
        assert!(otp.verify_at(KEY, SALT, &code, i64::MIN));
        assert!(!otp.verify_at(KEY, SALT, "12345x", i64::MIN));
    }

    #[test]
    fn test_zero_time_step_is_clamped() {
        let otp = OtpGenerator::new(Duration::ZERO);
        assert_eq!(otp.time_step(), Duration::from_secs(1));
    }
}
