//! CUIT/CUIL parsing and checksum validation.
//!
//! A CUIT (companies) or CUIL (workers) is an 11-digit Argentine tax
//! identifier: a 2-digit kind prefix, an 8-digit base number, and a
//! mod-11 verifier digit. Both use the same checksum, so one type covers
//! both. Parsing is pure and deterministic: no I/O, same output for the
//! same input on every call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Weights applied to the first ten digits for the mod-11 checksum.
const CHECKSUM_WEIGHTS: [u32; 10] = [5, 4, 3, 2, 7, 6, 5, 4, 3, 2];

/// Prefixes AFIP assigns to natural persons.
const INDIVIDUAL_PREFIXES: [u8; 4] = [20, 23, 24, 27];

/// Prefixes AFIP assigns to legal entities.
const COMPANY_PREFIXES: [u8; 3] = [30, 33, 34];

/// What kind of taxpayer a prefix denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Individual,
    Company,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Individual => write!(f, "individual"),
            EntityKind::Company => write!(f, "company"),
        }
    }
}

/// Why a raw value failed to parse as a CUIT/CUIL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CuitError {
    #[error("expected 11 digits, got {0}")]
    Length(usize),

    #[error("contains a non-digit character")]
    NonDigit,

    #[error("verifier digit does not match")]
    Checksum,

    /// The weighted sum demands verifier digit 10, which AFIP never
    /// assigns; such a number cannot exist.
    #[error("number falls in the unassigned verifier range")]
    Unassignable,
}

/// A validated CUIT/CUIL. Construction through [`Cuit::parse`] is the
/// only way to obtain one, so holding a `Cuit` implies the pattern and
/// the checksum both hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cuit {
    digits: [u8; 11],
}

impl Cuit {
    /// Parse a raw value, tolerating `-`, `.` and space separators
    /// (`20-12345678-6`, `20 12345678 6`, `20123456786` all parse).
    pub fn parse(raw: &str) -> Result<Self, CuitError> {
        let mut digits = [0u8; 11];
        let mut count = 0usize;

        for ch in raw.chars() {
            if matches!(ch, '-' | '.' | ' ') {
                continue;
            }
            let d = ch.to_digit(10).ok_or(CuitError::NonDigit)? as u8;
            if count < 11 {
                digits[count] = d;
            }
            count += 1;
        }

        if count != 11 {
            return Err(CuitError::Length(count));
        }

        match Self::check_digit(&digits[..10]) {
            None => Err(CuitError::Unassignable),
            Some(expected) if expected == digits[10] => Ok(Self { digits }),
            Some(_) => Err(CuitError::Checksum),
        }
    }

    /// Compute the expected verifier digit for the first ten digits.
    ///
    /// Weighted mod-11: `11 - (Σ dᵢ·wᵢ mod 11)`, where 11 maps to 0.
    /// Returns `None` for the unassignable case where the sum would
    /// demand digit 10.
    pub fn check_digit(first_ten: &[u8]) -> Option<u8> {
        debug_assert_eq!(first_ten.len(), 10);
        let sum: u32 = first_ten
            .iter()
            .zip(CHECKSUM_WEIGHTS.iter())
            .map(|(d, w)| u32::from(*d) * w)
            .sum();
        match 11 - (sum % 11) {
            11 => Some(0),
            10 => None,
            dv => Some(dv as u8),
        }
    }

    /// The two-digit kind prefix (e.g. 20, 27, 30).
    pub fn prefix(&self) -> u8 {
        self.digits[0] * 10 + self.digits[1]
    }

    /// The verifier digit.
    pub fn verifier(&self) -> u8 {
        self.digits[10]
    }

    /// Map the prefix to a taxpayer kind. Unknown prefixes (the checksum
    /// does not constrain them) yield `None`.
    pub fn entity_kind(&self) -> Option<EntityKind> {
        let p = self.prefix();
        if INDIVIDUAL_PREFIXES.contains(&p) {
            Some(EntityKind::Individual)
        } else if COMPANY_PREFIXES.contains(&p) {
            Some(EntityKind::Company)
        } else {
            None
        }
    }

    /// Canonical `XX-XXXXXXXX-X` rendering.
    pub fn formatted(&self) -> String {
        let d = &self.digits;
        format!(
            "{}{}-{}{}{}{}{}{}{}{}-{}",
            d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7], d[8], d[9], d[10]
        )
    }

    /// Bare 11-digit rendering, for upstream queries.
    pub fn as_digits(&self) -> String {
        self.digits.iter().map(|d| (d + b'0') as char).collect()
    }
}

impl fmt::Display for Cuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl FromStr for Cuit {
    type Err = CuitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Cuit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.formatted())
    }
}

impl<'de> Deserialize<'de> for Cuit {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Cuit::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_separated_and_bare_forms() {
        let a = Cuit::parse("20-12345678-6").unwrap();
        let b = Cuit::parse("20123456786").unwrap();
        let c = Cuit::parse("20 12345678 6").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.formatted(), "20-12345678-6");
        assert_eq!(a.as_digits(), "20123456786");
    }

    #[test]
    fn checksum_must_hold() {
        assert!(Cuit::parse("20-12345678-6").is_ok());
        // Same prefix and base, flipped verifier.
        assert_eq!(Cuit::parse("20-12345678-7"), Err(CuitError::Checksum));
        assert_eq!(Cuit::parse("20-12345678-5"), Err(CuitError::Checksum));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert_eq!(Cuit::parse("2012345678"), Err(CuitError::Length(10)));
        assert_eq!(Cuit::parse("201234567861"), Err(CuitError::Length(12)));
        assert_eq!(Cuit::parse("20-1234567x-6"), Err(CuitError::NonDigit));
        assert_eq!(Cuit::parse(""), Err(CuitError::Length(0)));
    }

    #[test]
    fn unassignable_verifier_range() {
        // 2001000000 has weighted sum 12, so the verifier would be 10:
        // AFIP never assigns these, no final digit can make them valid.
        for dv in 0..=9u8 {
            let raw = format!("2001000000{dv}");
            assert_eq!(Cuit::parse(&raw), Err(CuitError::Unassignable), "{raw}");
        }
    }

    #[test]
    fn entity_kind_follows_prefix() {
        assert_eq!(
            Cuit::parse("20-12345678-6").unwrap().entity_kind(),
            Some(EntityKind::Individual)
        );
        assert_eq!(
            Cuit::parse("30-71234567-1").unwrap().entity_kind(),
            Some(EntityKind::Company)
        );
        assert_eq!(
            Cuit::parse("27-00000000-6").unwrap().entity_kind(),
            Some(EntityKind::Individual)
        );
    }

    #[test]
    fn check_digit_maps_eleven_to_zero() {
        // 2300000000: weighted sum 22, 22 % 11 = 0, 11 - 0 = 11 -> 0.
        let first_ten = [2, 3, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(Cuit::check_digit(&first_ten), Some(0));
        assert!(Cuit::parse("23-00000000-0").is_ok());
    }

    #[test]
    fn deterministic_across_calls() {
        let raw = "30-71234567-1";
        let first = Cuit::parse(raw);
        for _ in 0..100 {
            assert_eq!(Cuit::parse(raw), first);
        }
    }
}
