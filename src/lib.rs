//! This library computes the storage layout of a
//! [Solidity](https://soliditylang.org) contract from a model of its source
//! classes, and can then populate that layout with the values currently held in
//! the contract's storage.
//!
//! The class model is expected to come from a source front-end that has
//! already parsed the contracts. This library neither parses source nor draws
//! diagrams, but the layout it produces is ready to be handed to a renderer.
//!
//! # How it Works
//!
//! From a very high level, the process is performed as follows:
//!
//! 1. The contract is found in a [`model::ClassUniverse`], and every type named
//!    by its storage variables is located through the import and inheritance
//!    graphs by the [`resolver::Resolver`].
//! 2. The variables of the contract and its parents are sized and packed into
//!    slots, with a [`layout::StorageSection`] for each struct and array, to
//!    give a [`StorageLayout`].
//! 3. Optionally, the values of the slots are read from a state provider
//!    through a [`slots::SlotValueClient`]. Doing so reveals the lengths of
//!    dynamic arrays and long `string` and `bytes` values, whose sections are
//!    then expanded and read in turn.
//! 4. The raw values are decoded into human-readable strings by the [`decode`]
//!    module.
//!
//! # Basic Usage
//!
//! For the most basic usage of the library, it is sufficient to construct an
//! extractor over the class universe and ask it for a layout.
//!
//! ```
//! use storage_layout_builder as slb;
//! use storage_layout_builder::model::{
//!     Attribute,
//!     AttributeKind,
//!     ClassEntry,
//!     ClassStereotype,
//!     ClassUniverse,
//! };
//!
//! let universe = ClassUniverse::new(vec![
//!     ClassEntry::new(0, "Token", ClassStereotype::Contract, "/src/Token.sol")
//!         .with_attribute(Attribute::new("owner", "address", AttributeKind::Elementary))
//!         .with_attribute(Attribute::new("paused", "bool", AttributeKind::Elementary))
//!         .with_attribute(Attribute::new("supply", "uint256", AttributeKind::Elementary)),
//! ]);
//!
//! let layout = slb::new(&universe)
//!     .build_layout("Token", None)
//!     .unwrap()
//!     .into_layout();
//!
//! // `owner` and `paused` share slot 0, and `supply` takes slot 1
//! assert_eq!(layout.root().variables.len(), 3);
//! assert_eq!(layout.variable("supply").unwrap().from_slot, 1);
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod constant;
pub mod decode;
pub mod error;
pub mod extractor;
pub mod layout;
pub mod model;
pub mod resolver;
pub mod slots;
pub mod utility;

// Re-exports to provide the library interface.
pub use extractor::new;
pub use layout::{StorageLayout, StorageSection, Variable};
pub use slots::{HttpTransport, SlotValueClient};
