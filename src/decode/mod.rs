//! This module contains the value decoder, which renders the raw slot value
//! of a variable as a human-readable string.
//!
//! Decoding never fails the layout as a whole. A value that cannot be decoded
//! is logged and left without a decoded value.

use ethnum::U256;
use sha3::{Digest, Keccak256};
use tracing::debug;

use crate::{
    constant::{ADDRESS_SIZE_BYTES, WORD_SIZE_BITS, WORD_SIZE_BYTES},
    layout::{ElementaryType, StorageLayout, Variable},
    model::AttributeKind,
    utility::{commify, U256Wrapper},
};

/// Decodes the raw slot value of `variable`.
///
/// Returns [`None`] if the variable has no value to show, has not had its
/// value read, or has a type for which decoding is not defined. That covers
/// structs, mappings, functions, fixed arrays, fixed-point numbers and the
/// start of long-form `string` and `bytes` values, whose data lives in a
/// section of its own.
#[must_use]
pub fn decode(variable: &Variable) -> Option<String> {
    if !variable.should_display_value {
        return None;
    }
    let raw = variable.raw_slot_value?;
    let bytes = slice(raw, variable.byte_offset, variable.byte_size)?;

    let decoded = match variable.attribute_kind {
        AttributeKind::Elementary => decode_elementary(variable, &bytes),
        AttributeKind::UserDefined => decode_user_defined(variable, &bytes),
        AttributeKind::Array if variable.is_dynamic => Some(commify(&word_of(&bytes).to_string())),
        AttributeKind::Array | AttributeKind::Mapping | AttributeKind::Function => None,
    };

    if decoded.is_none() {
        debug!(
            type_string = %variable.type_string,
            raw = %raw,
            "slot value could not be decoded"
        );
    }
    decoded
}

/// Decodes every variable in `layout` that has a value to show, overwriting
/// anything decoded before.
pub fn decode_all(layout: &mut StorageLayout) {
    for section in layout.sections_mut() {
        for variable in &mut section.variables {
            variable.decoded_value = decode(variable);
        }
    }
}

fn decode_elementary(variable: &Variable, bytes: &[u8]) -> Option<String> {
    let typ = ElementaryType::parse(&variable.type_string)?;
    match typ {
        ElementaryType::Bool => match bytes {
            [0] => Some("false".into()),
            [1] => Some("true".into()),
            _ => None,
        },
        ElementaryType::Address => address_of(bytes),
        ElementaryType::Uint { .. } => Some(commify(&word_of(bytes).to_string())),
        ElementaryType::Int { bits } => Some(commify(&signed_of(bytes, bits))),
        ElementaryType::FixedBytes { .. } => Some(format!("0x{}", hex::encode(bytes))),
        ElementaryType::String | ElementaryType::Bytes if variable.is_dynamic => {
            short_dynamic(typ, bytes)
        }
        ElementaryType::String => string_of(bytes),
        ElementaryType::Bytes => Some(format!("0x{}", hex::encode(bytes))),
        ElementaryType::Fixed { .. } => None,
    }
}

/// Decodes enums into the name of their member, and contract references into
/// their address.
fn decode_user_defined(variable: &Variable, bytes: &[u8]) -> Option<String> {
    if let Some(names) = &variable.enum_value_names {
        let index = word_of(bytes);
        return (index < U256::from(names.len() as u64)).then(|| names[index.as_usize()].clone());
    }
    if variable.byte_size == ADDRESS_SIZE_BYTES {
        return address_of(bytes);
    }

    None
}

/// Decodes a `string` or `bytes` value held in the slot of its variable.
///
/// A set low bit means the value is in long form and has to be decoded from
/// its own section instead.
fn short_dynamic(typ: ElementaryType, word: &[u8]) -> Option<String> {
    let last = *word.last()?;
    if last & 1 == 1 {
        return None;
    }
    let length = usize::from((last >> 1) & 0x3F);
    let data = word.get(..length)?;

    match typ {
        ElementaryType::String => string_of(data),
        _ => Some(format!("0x{}", hex::encode(data))),
    }
}

/// Cuts the `size` bytes found `offset` bytes from the low-order end of `raw`.
fn slice(raw: U256Wrapper, offset: usize, size: usize) -> Option<Vec<u8>> {
    let end = WORD_SIZE_BYTES.checked_sub(offset)?;
    let start = end.checked_sub(size)?;
    Some(raw.to_be_bytes()[start..end].to_vec())
}

/// Reads `bytes` as a big-endian unsigned number.
fn word_of(bytes: &[u8]) -> U256 {
    let mut word = [0u8; WORD_SIZE_BYTES];
    word[WORD_SIZE_BYTES - bytes.len()..].copy_from_slice(bytes);
    U256::from_be_bytes(word)
}

/// Reads `bytes` as a two's-complement number `bits` wide.
fn signed_of(bytes: &[u8], bits: usize) -> String {
    let mut value = word_of(bytes);
    if bits > 0 && bits < WORD_SIZE_BITS {
        let sign = U256::ONE << (bits - 1) as u32;
        if value & sign != U256::ZERO {
            value |= U256::MAX << bits as u32;
        }
    }
    value.as_i256().to_string()
}

fn address_of(bytes: &[u8]) -> Option<String> {
    let start = bytes.len().checked_sub(ADDRESS_SIZE_BYTES)?;
    Some(checksum_address(&bytes[start..]))
}

fn string_of(bytes: &[u8]) -> Option<String> {
    std::str::from_utf8(bytes).ok().map(escape_label)
}

/// Renders the 20 byte `address` in mixed-case checksum form.
///
/// Each hex letter is upper cased when the matching nibble of the hash of the
/// lower case address is 8 or more.
#[must_use]
pub fn checksum_address(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = Keccak256::digest(lower.as_bytes());

    let checksummed: String = lower
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let byte = hash[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            if nibble >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect();

    format!("0x{checksummed}")
}

/// Escapes `text` so that it can be embedded in a record label of a diagram.
///
/// Trailing NUL padding is dropped.
#[must_use]
pub fn escape_label(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.trim_end_matches('\0').chars() {
        match c {
            '\\' | '"' | '<' | '>' | '{' | '}' | '|' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            '\r' | '\0' => {}
            c => escaped.push(c),
        }
    }
    escaped
}
