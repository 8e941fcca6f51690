//! This module contains the size function, which computes how many bytes of
//! storage a declared type occupies.

use ethnum::U256;

use crate::{
    constant::{
        ADDRESS_SIZE_BYTES,
        BOOL_SIZE_BYTES,
        BYTE_SIZE_BITS,
        ENUM_SIZE_BYTES,
        MAXIMUM_PACKED_ELEMENT_BYTES,
        WORD_SIZE_BITS,
        WORD_SIZE_BYTES,
    },
    error::{layout, Result},
    model::{AttributeKind, Attribute, ClassEntry, ClassStereotype, ClassUniverse},
    resolver::Resolver,
    utility::U256Wrapper,
};

/// The storage footprint of a type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TypeSize {
    /// The number of bytes the type occupies in its declaring section.
    pub bytes: usize,

    /// Set for types whose contents live somewhere other than the declared
    /// position.
    pub is_dynamic: bool,
}

impl TypeSize {
    /// A type laid out entirely in place.
    #[must_use]
    pub const fn fixed(bytes: usize) -> Self {
        Self {
            bytes,
            is_dynamic: false,
        }
    }

    /// A type whose declared position holds only a length or marker word.
    #[must_use]
    pub const fn dynamic(bytes: usize) -> Self {
        Self {
            bytes,
            is_dynamic: true,
        }
    }
}

/// The elementary (built-in value) types.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ElementaryType {
    Bool,
    Address,
    String,
    Bytes,
    Uint { bits: usize },
    Int { bits: usize },
    FixedBytes { size: usize },
    Fixed { signed: bool, bytes: usize },
}

impl ElementaryType {
    /// Parses `type_string` as an elementary type, returning [`None`] if it is
    /// not one.
    #[must_use]
    pub fn parse(type_string: &str) -> Option<Self> {
        let typ = match type_string.trim() {
            "bool" => Self::Bool,
            "address" | "address payable" => Self::Address,
            "string" => Self::String,
            "bytes" => Self::Bytes,
            "uint" => Self::Uint {
                bits: WORD_SIZE_BITS,
            },
            "int" => Self::Int {
                bits: WORD_SIZE_BITS,
            },
            "ufixed" => Self::Fixed {
                signed: false,
                bytes:  WORD_SIZE_BYTES,
            },
            "fixed" => Self::Fixed {
                signed: true,
                bytes:  WORD_SIZE_BYTES,
            },
            other => {
                if let Some(bits) = other.strip_prefix("uint") {
                    Self::Uint {
                        bits: parse_bits(bits)?,
                    }
                } else if let Some(bits) = other.strip_prefix("int") {
                    Self::Int {
                        bits: parse_bits(bits)?,
                    }
                } else if let Some(size) = other.strip_prefix("bytes") {
                    let size = parse_number(size).filter(|s| (1..=WORD_SIZE_BYTES).contains(s))?;
                    Self::FixedBytes { size }
                } else if let Some(shape) = other.strip_prefix("ufixed") {
                    Self::Fixed {
                        signed: false,
                        bytes:  parse_fixed_shape(shape)?,
                    }
                } else if let Some(shape) = other.strip_prefix("fixed") {
                    Self::Fixed {
                        signed: true,
                        bytes:  parse_fixed_shape(shape)?,
                    }
                } else {
                    return None;
                }
            }
        };

        Some(typ)
    }

    /// Gets the storage footprint of the type.
    #[must_use]
    pub fn size(&self) -> TypeSize {
        match self {
            Self::Bool => TypeSize::fixed(BOOL_SIZE_BYTES),
            Self::Address => TypeSize::fixed(ADDRESS_SIZE_BYTES),
            Self::String | Self::Bytes => TypeSize::dynamic(WORD_SIZE_BYTES),
            Self::Uint { bits } | Self::Int { bits } => TypeSize::fixed(bits / BYTE_SIZE_BITS),
            Self::FixedBytes { size } => TypeSize::fixed(*size),
            Self::Fixed { bytes, .. } => TypeSize::fixed(*bytes),
        }
    }
}

/// Parses an unsigned decimal made up only of ASCII digits.
fn parse_number(digits: &str) -> Option<usize> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Parses a `0x`-prefixed hexadecimal literal that fits in a [`u64`].
fn parse_hex_number(literal: &str) -> Option<u64> {
    let digits = literal.strip_prefix("0x")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let word = U256Wrapper::from_hex(digits)?.0;
    (word <= U256::from(u64::MAX)).then(|| word.as_u64())
}

/// Parses an integer bit width, which must be a multiple of eight no larger
/// than a word.
fn parse_bits(digits: &str) -> Option<usize> {
    parse_number(digits)
        .filter(|bits| (BYTE_SIZE_BITS..=WORD_SIZE_BITS).contains(bits) && bits % BYTE_SIZE_BITS == 0)
}

/// Parses the `MxN` suffix of a fixed-point type into its size in bytes.
fn parse_fixed_shape(shape: &str) -> Option<usize> {
    let (bits, decimals) = shape.split_once('x')?;
    parse_number(decimals)?;
    parse_bits(bits).map(|bits| bits / BYTE_SIZE_BITS)
}

/// Checks if `type_string` names an elementary type.
#[must_use]
pub fn is_elementary(type_string: &str) -> bool {
    ElementaryType::parse(type_string).is_some()
}

/// Computes the storage footprint of `attribute`, declared in `class`.
///
/// # Errors
///
/// Returns [`Err`] if the type is not supported, names a user-defined type that
/// cannot be resolved, or has an array dimension that cannot be sized.
pub fn calc_byte_size<'u>(
    attribute: &Attribute,
    class: &'u ClassEntry,
    resolver: &Resolver<'u>,
) -> Result<TypeSize> {
    match attribute.kind {
        AttributeKind::Mapping | AttributeKind::Function => Ok(TypeSize::dynamic(WORD_SIZE_BYTES)),
        AttributeKind::Array => array_size(&attribute.type_string, class, resolver),
        AttributeKind::UserDefined => user_defined_size(&attribute.type_string, class, resolver),
        AttributeKind::Elementary => elementary_size(&attribute.type_string),
    }
}

/// Computes the footprint of an elementary type.
fn elementary_size(type_string: &str) -> Result<TypeSize> {
    let typ = ElementaryType::parse(type_string).ok_or_else(|| layout::Error::UnsupportedType {
        type_string: type_string.to_string(),
    })?;
    Ok(typ.size())
}

/// Computes the footprint of a user-defined type by looking at what kind of
/// class it resolves to.
fn user_defined_size<'u>(
    type_string: &str,
    class: &'u ClassEntry,
    resolver: &Resolver<'u>,
) -> Result<TypeSize> {
    let target = resolver.resolve_type(type_string, class)?;
    let size = match target.stereotype {
        stereotype if stereotype.is_address_like() => TypeSize::fixed(ADDRESS_SIZE_BYTES),
        ClassStereotype::Enum => TypeSize::fixed(ENUM_SIZE_BYTES),
        ClassStereotype::Struct => struct_size(target, resolver)?,
        _ => TypeSize::fixed(WORD_SIZE_BYTES),
    };

    Ok(size)
}

/// Sums the fields of `structure`, aligning nested arrays and structs to slot
/// boundaries and rounding the total up to whole slots.
fn struct_size<'u>(structure: &'u ClassEntry, resolver: &Resolver<'u>) -> Result<TypeSize> {
    let mut bytes = 0;
    for field in structure.attributes.iter().filter(|a| !a.is_compiled_constant) {
        let starts_new_slot = match field.kind {
            AttributeKind::Array => true,
            AttributeKind::UserDefined => {
                let typ = resolver.resolve_type(&field.type_string, structure)?;
                typ.stereotype == ClassStereotype::Struct
            }
            AttributeKind::Elementary | AttributeKind::Mapping | AttributeKind::Function => false,
        };
        if starts_new_slot {
            bytes = round_up_to_slot(bytes);
        }

        let field_size = calc_byte_size(field, structure, resolver)?.bytes;
        let end_of_slot = round_up_to_slot(bytes);
        if field_size <= end_of_slot - bytes {
            bytes += field_size;
        } else {
            bytes = end_of_slot + field_size;
        }
    }

    Ok(TypeSize::fixed(round_up_to_slot(bytes)))
}

/// Computes the footprint of an array type.
///
/// Fixed dimensions are read right to left until the first dynamic one.
fn array_size<'u>(
    type_string: &str,
    class: &'u ClassEntry,
    resolver: &Resolver<'u>,
) -> Result<TypeSize> {
    let (base, dimensions) = split_array_type(type_string)?;

    let mut fixed = Vec::new();
    for dimension in dimensions.iter().rev().take_while(|d| !d.is_empty()) {
        fixed.push(find_dimension_length(class, dimension, resolver.universe())?);
    }
    if fixed.is_empty() {
        return Ok(TypeSize::dynamic(WORD_SIZE_BYTES));
    }

    let overflow = || layout::Error::MalformedType {
        type_string: type_string.to_string(),
        reason:      "array is larger than addressable storage".into(),
    };
    let product = |dims: &[u64]| -> Result<usize> {
        dims.iter()
            .try_fold(1usize, |total, d| total.checked_mul(usize::try_from(*d).ok()?))
            .ok_or_else(|| overflow().into())
    };

    // Outer fixed dimensions around a dynamic one hold one length word each
    if fixed.len() < dimensions.len() {
        let bytes = product(&fixed)?.checked_mul(WORD_SIZE_BYTES).ok_or_else(overflow)?;
        return Ok(TypeSize::fixed(bytes));
    }

    let element = if is_elementary(base) {
        elementary_size(base)?
    } else {
        user_defined_size(base, class, resolver)?
    };
    let element_bytes = element_slot_bytes(element.bytes);

    let (innermost, outer) = fixed.split_last().ok_or_else(overflow)?;
    let row_bytes = packed_row_bytes(element_bytes, *innermost).ok_or_else(overflow)?;
    let bytes = row_bytes.checked_mul(product(outer)?).ok_or_else(overflow)?;

    Ok(TypeSize::fixed(bytes))
}

/// Splits an array type such as `uint8[][3]` into its base type and its
/// dimensions as written, left to right.
pub(crate) fn split_array_type(type_string: &str) -> layout::Result<(&str, Vec<&str>)> {
    let malformed = |reason: &str| layout::Error::MalformedType {
        type_string: type_string.to_string(),
        reason:      reason.to_string(),
    };

    let start = type_string.find('[').ok_or_else(|| malformed("no array dimension"))?;
    let base = type_string[..start].trim();
    if base.is_empty() {
        return Err(malformed("no element type"));
    }

    let mut dimensions = Vec::new();
    let mut rest = &type_string[start..];
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[').ok_or_else(|| malformed("expected '['"))?;
        let end = inner.find(']').ok_or_else(|| malformed("unterminated dimension"))?;
        let dimension = inner[..end].trim();
        if dimension.contains('[') {
            return Err(malformed("nested brackets in dimension"));
        }
        dimensions.push(dimension);
        rest = &inner[end + 1..];
    }

    Ok((base, dimensions))
}

/// Gets the number of bytes an array element takes up, given its size.
///
/// Elements over half a slot are never packed with their neighbours.
pub(crate) fn element_slot_bytes(element_bytes: usize) -> usize {
    if element_bytes > MAXIMUM_PACKED_ELEMENT_BYTES {
        round_up_to_slot(element_bytes)
    } else {
        element_bytes
    }
}

/// Computes the bytes, in whole slots, taken by `count` elements that each take
/// `element_bytes`.
///
/// Packed elements never straddle a slot boundary.
fn packed_row_bytes(element_bytes: usize, count: u64) -> Option<usize> {
    let count = usize::try_from(count).ok()?;
    if element_bytes > MAXIMUM_PACKED_ELEMENT_BYTES {
        return element_bytes.checked_mul(count);
    }
    let per_slot = WORD_SIZE_BYTES / element_bytes.max(1);
    count.div_ceil(per_slot).checked_mul(WORD_SIZE_BYTES)
}

/// Rounds `bytes` up to the next slot boundary.
pub(crate) fn round_up_to_slot(bytes: usize) -> usize {
    bytes.div_ceil(WORD_SIZE_BYTES) * WORD_SIZE_BYTES
}

/// Finds the number of elements in the array dimension written as
/// `dimension` inside `class`.
///
/// The dimension may be a decimal or `0x`-prefixed hexadecimal literal, the
/// name of a constant declared on the class, or the name of a file-level
/// constant.
///
/// # Errors
///
/// Returns [`Err`] if the dimension cannot be sized.
pub fn find_dimension_length(
    class: &ClassEntry,
    dimension: &str,
    universe: &ClassUniverse,
) -> layout::Result<u64> {
    if let Some(length) = parse_number(dimension).and_then(|n| u64::try_from(n).ok()) {
        return Ok(length);
    }
    if let Some(length) = parse_hex_number(dimension) {
        return Ok(length);
    }

    if let Some(constant) = class.constants.iter().find(|c| c.name == dimension) {
        return Ok(constant.value);
    }

    universe
        .classes()
        .iter()
        .filter(|c| c.name == dimension && c.stereotype == ClassStereotype::Constant)
        .find_map(|c| c.constants.first())
        .map(|constant| constant.value)
        .ok_or_else(|| layout::Error::DimensionUnresolvable {
            dimension:  dimension.to_string(),
            class_name: class.name.clone(),
        })
}

#[cfg(test)]
mod tests {
    use crate::{
        error::{layout, Error},
        layout::size::{calc_byte_size, find_dimension_length, is_elementary, ElementaryType, TypeSize},
        model::{Attribute, AttributeKind, ClassEntry, ClassStereotype, ClassUniverse},
        resolver::Resolver,
    };

    fn universe() -> ClassUniverse {
        ClassUniverse::new(vec![
            ClassEntry::new(0, "Vault", ClassStereotype::Contract, "/vault.sol")
                .with_struct(1)
                .with_struct(2)
                .with_enum(3)
                .with_constant("SIZE", 4),
            ClassEntry::new(1, "Pair", ClassStereotype::Struct, "/vault.sol")
                .with_attribute(Attribute::new("a", "uint128", AttributeKind::Elementary))
                .with_attribute(Attribute::new("b", "uint128", AttributeKind::Elementary))
                .with_attribute(Attribute::new("c", "uint256", AttributeKind::Elementary)),
            ClassEntry::new(2, "Aligned", ClassStereotype::Struct, "/vault.sol")
                .with_attribute(Attribute::new("a", "uint8", AttributeKind::Elementary))
                .with_attribute(Attribute::new("b", "uint256[2]", AttributeKind::Array)),
            ClassEntry::new(3, "Status", ClassStereotype::Enum, "/vault.sol"),
            ClassEntry::new(4, "Token", ClassStereotype::Interface, "/vault.sol"),
            ClassEntry::new(5, "MAX", ClassStereotype::Constant, "/vault.sol").with_constant("MAX", 7),
        ])
    }

    fn size_of(universe: &ClassUniverse, type_string: &str, kind: AttributeKind) -> crate::error::Result<TypeSize> {
        let resolver = Resolver::new(universe);
        let attribute = Attribute::new("x", type_string, kind);
        calc_byte_size(&attribute, &universe.classes()[0], &resolver)
    }

    #[test]
    fn sizes_elementary_types() -> anyhow::Result<()> {
        let universe = universe();
        let cases = [
            ("bool", 1, false),
            ("address", 20, false),
            ("address payable", 20, false),
            ("uint", 32, false),
            ("int", 32, false),
            ("uint8", 1, false),
            ("int64", 8, false),
            ("uint256", 32, false),
            ("bytes1", 1, false),
            ("bytes32", 32, false),
            ("fixed128x18", 16, false),
            ("string", 32, true),
            ("bytes", 32, true),
        ];
        for (type_string, bytes, is_dynamic) in cases {
            let size = size_of(&universe, type_string, AttributeKind::Elementary)?;
            assert_eq!(size, TypeSize { bytes, is_dynamic }, "{type_string}");
            assert!(size.bytes <= 32);
        }

        Ok(())
    }

    #[test]
    fn rejects_unknown_elementary_types() {
        let universe = universe();
        for type_string in ["uint7", "uint264", "bytes0", "bytes33", "float", "uint+8"] {
            let error = size_of(&universe, type_string, AttributeKind::Elementary).unwrap_err();
            assert_eq!(
                error,
                Error::Layout(layout::Error::UnsupportedType {
                    type_string: type_string.into(),
                }),
            );
        }
    }

    #[test]
    fn recognises_elementary_type_names() {
        assert!(is_elementary("uint"));
        assert!(is_elementary("bytes4"));
        assert!(!is_elementary("uint8[]"));
        assert!(!is_elementary("Status"));
        assert_eq!(ElementaryType::parse("int16"), Some(ElementaryType::Int { bits: 16 }));
    }

    #[test]
    fn sizes_mappings_and_functions_as_dynamic_words() -> anyhow::Result<()> {
        let universe = universe();
        let mapping = size_of(&universe, "mapping(address => uint256)", AttributeKind::Mapping)?;
        let function = size_of(&universe, "function() external", AttributeKind::Function)?;
        assert_eq!(mapping, TypeSize::dynamic(32));
        assert_eq!(function, TypeSize::dynamic(32));

        Ok(())
    }

    #[test]
    fn sizes_fixed_arrays_in_whole_slots() -> anyhow::Result<()> {
        let universe = universe();
        let cases = [
            ("uint8[3]", 32),
            ("address[3]", 96),
            ("uint256[2][3]", 192),
            ("uint8[2][3]", 96),
            ("uint24[21]", 96),
            ("uint128[3]", 64),
            ("uint256[][3]", 96),
            ("uint8[SIZE]", 32),
            ("uint256[MAX]", 224),
            ("Pair[2]", 128),
            ("Status[40]", 64),
            ("Token[2]", 64),
        ];
        for (type_string, bytes) in cases {
            let size = size_of(&universe, type_string, AttributeKind::Array)?;
            assert_eq!(size, TypeSize::fixed(bytes), "{type_string}");
        }

        Ok(())
    }

    #[test]
    fn sizes_arrays_with_dynamic_outer_dimensions_as_dynamic_words() -> anyhow::Result<()> {
        let universe = universe();
        for type_string in ["uint256[]", "uint8[3][]", "Pair[]"] {
            let size = size_of(&universe, type_string, AttributeKind::Array)?;
            assert_eq!(size, TypeSize::dynamic(32), "{type_string}");
        }

        Ok(())
    }

    #[test]
    fn sizes_user_defined_types() -> anyhow::Result<()> {
        let universe = universe();
        assert_eq!(size_of(&universe, "Status", AttributeKind::UserDefined)?, TypeSize::fixed(1));
        assert_eq!(size_of(&universe, "Token", AttributeKind::UserDefined)?, TypeSize::fixed(20));
        assert_eq!(size_of(&universe, "Pair", AttributeKind::UserDefined)?, TypeSize::fixed(64));
        assert_eq!(size_of(&universe, "Aligned", AttributeKind::UserDefined)?, TypeSize::fixed(96));

        Ok(())
    }

    #[test]
    fn fails_on_unresolvable_dimensions() {
        let universe = universe();
        let error = size_of(&universe, "uint8[UNKNOWN]", AttributeKind::Array).unwrap_err();
        assert_eq!(
            error,
            Error::Layout(layout::Error::DimensionUnresolvable {
                dimension:  "UNKNOWN".into(),
                class_name: "Vault".into(),
            }),
        );
    }

    #[test]
    fn finds_dimension_lengths_from_literals_and_constants() -> anyhow::Result<()> {
        let universe = universe();
        let vault = &universe.classes()[0];
        assert_eq!(find_dimension_length(vault, "12", &universe)?, 12);
        assert_eq!(find_dimension_length(vault, "SIZE", &universe)?, 4);
        assert_eq!(find_dimension_length(vault, "MAX", &universe)?, 7);

        Ok(())
    }

    #[test]
    fn finds_dimension_lengths_from_hex_literals() -> anyhow::Result<()> {
        let universe = universe();
        let vault = &universe.classes()[0];
        assert_eq!(find_dimension_length(vault, "0x10", &universe)?, 16);
        assert_eq!(find_dimension_length(vault, "0xFF", &universe)?, 255);
        assert_eq!(size_of(&universe, "uint8[0x40]", AttributeKind::Array)?, TypeSize::fixed(64));

        for dimension in ["0x", "0xg1", "0x10000000000000000"] {
            assert!(find_dimension_length(vault, dimension, &universe).is_err(), "{dimension}");
        }

        Ok(())
    }

    #[test]
    fn rejects_malformed_arrays() {
        let universe = universe();
        for type_string in ["[3]", "uint8[3", "uint8[3]x"] {
            let error = size_of(&universe, type_string, AttributeKind::Array).unwrap_err();
            assert!(
                matches!(error, Error::Layout(layout::Error::MalformedType { .. })),
                "{type_string}: {error:?}"
            );
        }
    }
}
