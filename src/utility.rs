//! Utility functions useful throughout the codebase.

use std::{
    cmp::Ordering,
    fmt::{Debug, Display, Formatter},
};

use ethnum::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::constant::WORD_SIZE_BYTES;

/// The `U256Wrapper` is responsible for allowing the serialisation of the
/// [`U256`] type to JSON, and is used for slot keys, section offsets and raw
/// slot values.
///
/// It provides reasonable conversions from a number of common types used within
/// the library.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct U256Wrapper(pub U256);

impl U256Wrapper {
    /// Gets the big-endian bytes of the wrapped word.
    #[must_use]
    pub fn to_be_bytes(&self) -> [u8; WORD_SIZE_BYTES] {
        self.0.to_be_bytes()
    }

    /// Constructs a word from its big-endian bytes.
    #[must_use]
    pub fn from_be_bytes(bytes: [u8; WORD_SIZE_BYTES]) -> Self {
        Self(U256::from_be_bytes(bytes))
    }

    /// Parses a hex-encoded word, with or without the `0x` prefix.
    ///
    /// Inputs shorter than a full word are treated as big-endian numbers and
    /// left-padded with zeroes. Returns [`None`] if the input is not hex or is
    /// longer than a word.
    #[must_use]
    pub fn from_hex(value: &str) -> Option<Self> {
        let digits = value.strip_prefix("0x").unwrap_or(value);
        let digits = if digits.len() % 2 == 0 {
            digits.to_string()
        } else {
            format!("0{digits}")
        };
        let bytes = hex::decode(digits).ok()?;
        if bytes.len() > WORD_SIZE_BYTES {
            return None;
        }

        let mut word = [0u8; WORD_SIZE_BYTES];
        word[WORD_SIZE_BYTES - bytes.len()..].copy_from_slice(&bytes);
        Some(Self::from_be_bytes(word))
    }

    /// Renders the word as a `0x`-prefixed hex string of the full 32 bytes.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_be_bytes()))
    }

    /// Renders the word as the shortest `0x`-prefixed hex quantity, as used for
    /// slot keys in JSON-RPC requests.
    #[must_use]
    pub fn to_hex_quantity(&self) -> String {
        format!("{:#x}", self.0)
    }
}

impl Debug for U256Wrapper {
    /// The wrapper has absolutely no semantic meaning, so we print the
    /// underlying value for the debug representation.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for U256Wrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl PartialOrd for U256Wrapper {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256Wrapper {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl From<U256> for U256Wrapper {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<U256Wrapper> for U256 {
    fn from(U256Wrapper(value): U256Wrapper) -> Self {
        value
    }
}

impl From<usize> for U256Wrapper {
    fn from(value: usize) -> Self {
        Self(U256::from(value as u128))
    }
}

impl From<u64> for U256Wrapper {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl Serialize for U256Wrapper {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for U256Wrapper {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        U256Wrapper::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("{s} is not a 32 byte hex word")))
    }
}

/// Computes the Keccak-256 hash of the 32-byte big-endian encoding of `slot`.
///
/// This is the location at which the data of a dynamic array, or of a long
/// `string` or `bytes` value, declared at `slot` begins.
#[must_use]
pub fn hash_slot(slot: U256Wrapper) -> U256Wrapper {
    let hash = Keccak256::digest(slot.to_be_bytes());
    let mut word = [0u8; WORD_SIZE_BYTES];
    word.copy_from_slice(&hash);
    U256Wrapper::from_be_bytes(word)
}

/// Inserts `,` group separators every three digits into the decimal string
/// `value`, preserving a leading `-`.
#[must_use]
pub fn commify(value: &str) -> String {
    let (sign, digits) = match value.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", value),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{sign}{grouped}")
}
