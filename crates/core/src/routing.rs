use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::encoding_line::ParseError;

/// ABA check-digit weights, applied cyclically to the nine digits.
const ABA_WEIGHTS: [u32; 9] = [3, 7, 1, 3, 7, 1, 3, 7, 1];

/// Returns `true` when `digits` is exactly nine ASCII digits whose 3-7-1
/// weighted sum is divisible by 10.
pub fn aba_checksum_valid(digits: &str) -> bool {
    let bytes = digits.as_bytes();
    if bytes.len() != ABA_WEIGHTS.len() || !bytes.iter().all(u8::is_ascii_digit) {
        return false;
    }
    let sum: u32 = bytes
        .iter()
        .zip(ABA_WEIGHTS)
        .map(|(b, w)| u32::from(b - b'0') * w)
        .sum();
    sum % 10 == 0
}

/// A nine-digit bank routing number that has passed the ABA checksum.
///
/// The only ways to build one are [`FromStr`] and [`TryFrom<String>`], so a
/// `RoutingNumber` in hand is always valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoutingNumber(String);

impl RoutingNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoutingNumber {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if aba_checksum_valid(s) {
            Ok(RoutingNumber(s.to_string()))
        } else {
            Err(ParseError::RoutingNumberChecksumInvalid(s.to_string()))
        }
    }
}

impl TryFrom<String> for RoutingNumber {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if aba_checksum_valid(&s) {
            Ok(RoutingNumber(s))
        } else {
            Err(ParseError::RoutingNumberChecksumInvalid(s))
        }
    }
}

impl From<RoutingNumber> for String {
    fn from(r: RoutingNumber) -> Self {
        r.0
    }
}

impl fmt::Display for RoutingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
