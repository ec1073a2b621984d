//! Quota units
//!
//! Web storage bills quota per UTF-16 code unit, two bytes each. A unit is
//! one kibibyte of such storage, kept to two decimal places. `Units` stores
//! the value as an exact count of hundredths so repeated accounting never
//! drifts.

use std::fmt;

/// Space measured in kibibyte-equivalents, with two decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Units(u64);

impl Units {
    /// No space
    pub const ZERO: Self = Self(0);

    /// Capacity of an area that never rejects a write
    pub const UNBOUNDED: Self = Self(u64::MAX);

    /// Size of `chars` UTF-16 code units, rounded half-up to hundredths
    ///
    /// `2 * chars / 1024 * 100 == chars * 25 / 128`.
    #[must_use]
    pub const fn from_chars(chars: usize) -> Self {
        let scaled = (chars as u64).saturating_mul(25).saturating_add(64);
        Self(scaled / 128)
    }

    /// Size of a string, counted in UTF-16 code units
    #[must_use]
    pub fn of_str(s: &str) -> Self {
        Self::from_chars(utf16_len(s))
    }

    /// A whole number of units
    #[must_use]
    pub const fn from_whole(units: u64) -> Self {
        Self(units.saturating_mul(100))
    }

    /// Build from a raw count of hundredths
    #[must_use]
    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    /// Raw count of hundredths
    #[must_use]
    pub const fn hundredths(self) -> u64 {
        self.0
    }

    /// Whole units, rounded down
    #[must_use]
    pub const fn whole(self) -> u64 {
        self.0 / 100
    }

    /// Drop the fractional part
    #[must_use]
    pub const fn floor(self) -> Self {
        if self.is_unbounded() {
            return self;
        }
        Self(self.0 - self.0 % 100)
    }

    #[must_use]
    pub const fn is_unbounded(self) -> bool {
        self.0 == u64::MAX
    }

    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            return f.write_str("unbounded");
        }
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Length of a string in UTF-16 code units
#[must_use]
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_from_chars_rounding() {
        assert_eq!(Units::from_chars(0), Units::ZERO);
        // 1024 chars are 2048 bytes, two full units
        assert_eq!(Units::from_chars(1024), Units::from_whole(2));
        // 512 chars are exactly one unit
        assert_eq!(Units::from_chars(512), Units::from_whole(1));
        // 0.0195 rounds to 0.02
        assert_eq!(Units::from_chars(10).hundredths(), 2);
        // 0.00195 rounds to 0.00
        assert_eq!(Units::from_chars(1).hundredths(), 0);
    }

    #[test]
    fn test_round_half_up() {
        // 64 chars are exactly 0.125 units
        assert_eq!(Units::from_chars(64).hundredths(), 13);
        // 192 chars are exactly 0.375 units
        assert_eq!(Units::from_chars(192).hundredths(), 38);
    }

    #[test]
    fn test_matches_float_formula() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let chars: usize = rng.gen_range(0..20_000_000);
            let float = ((chars as f64 * 2.0) / 1024.0 * 100.0).round() as u64;
            assert_eq!(Units::from_chars(chars).hundredths(), float, "chars={chars}");
        }
    }

    #[test]
    fn test_utf16_length() {
        assert_eq!(utf16_len("abc"), 3);
        // outside the BMP: one char, two code units
        assert_eq!(utf16_len("\u{1F600}"), 2);
        assert_eq!(Units::of_str(&"a".repeat(512)), Units::from_whole(1));
    }

    #[test]
    fn test_floor_and_display() {
        let u = Units::from_hundredths(1234);
        assert_eq!(u.floor(), Units::from_whole(12));
        assert_eq!(u.whole(), 12);
        assert_eq!(u.to_string(), "12.34");
        assert_eq!(Units::from_hundredths(5).to_string(), "0.05");
        assert_eq!(Units::UNBOUNDED.floor(), Units::UNBOUNDED);
        assert_eq!(Units::UNBOUNDED.to_string(), "unbounded");
    }

    #[test]
    fn test_saturating() {
        assert_eq!(
            Units::from_whole(1).saturating_sub(Units::from_whole(2)),
            Units::ZERO
        );
        assert_eq!(
            Units::UNBOUNDED.saturating_add(Units::from_whole(1)),
            Units::UNBOUNDED
        );
    }
}
