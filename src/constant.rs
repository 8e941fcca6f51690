//! This module contains constants that are needed throughout the codebase.

/// The width of a byte on the EVM (and most other places) in bits.
pub const BYTE_SIZE_BITS: usize = 8;

/// The width of word on the EVM in bits.
pub const WORD_SIZE_BITS: usize = 256;

/// The width of a word (and hence of a storage slot) on the EVM in bytes.
pub const WORD_SIZE_BYTES: usize = WORD_SIZE_BITS / BYTE_SIZE_BITS;

/// The size of a bool type in storage, in bytes.
pub const BOOL_SIZE_BYTES: usize = 1;

/// The size of an address type in storage, in bytes.
///
/// Contract, interface and library references are stored as addresses too.
pub const ADDRESS_SIZE_BYTES: usize = 20;

/// The size of an enum value in storage, in bytes.
pub const ENUM_SIZE_BYTES: usize = 1;

/// Elements of arrays that are larger than this many bytes are not packed with
/// their neighbours but take up whole slots.
pub const MAXIMUM_PACKED_ELEMENT_BYTES: usize = 16;

/// The largest number of bytes that a `string` or `bytes` value can have while
/// still being stored inline in its slot.
pub const SHORT_DYNAMIC_MAXIMUM_BYTES: usize = 31;

/// The type name given to the padding variables that fill the unused bytes of
/// the last slot of a long `string` or `bytes` value.
pub const UNALLOCATED_TYPE_NAME: &str = "unallocated";

/// The JSON-RPC method used to read a single storage slot.
pub const GET_STORAGE_AT_METHOD: &str = "eth_getStorageAt";

/// The JSON-RPC protocol version sent with every request.
pub const JSON_RPC_VERSION: &str = "2.0";

/// The default maximum number of elements that will be synthesised for any one
/// dynamic array when expanding a layout with fetched slot values.
pub const DEFAULT_MAXIMUM_ARRAY_EXPANSION: usize = 1_000;
