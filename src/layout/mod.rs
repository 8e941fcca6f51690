//! This module contains the definitions for the storage layout representation
//! types, along with the engine that computes them.
//!
//! A layout is a tree of [`StorageSection`]s. The root section holds the
//! variables of the contract itself, and every struct, array, or long `string`
//! and `bytes` value that a variable points into gets a section of its own. The
//! sections are stored in an arena and linked by [`SectionId`] rather than by
//! reference.

pub mod builder;
pub mod dynamic;
pub mod size;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

pub use builder::{build_layout, build_layout_with_config, calc_section_offset};
pub use dynamic::{dynamic_slot_size, expand_dynamic};
pub use size::{calc_byte_size, find_dimension_length, is_elementary, ElementaryType, TypeSize};

use crate::{
    constant::DEFAULT_MAXIMUM_ARRAY_EXPANSION,
    error::layout::{Error, Result},
    model::AttributeKind,
    utility::U256Wrapper,
};

/// The configuration for building and expanding a layout.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The maximum number of elements that will be synthesised for any one
    /// array, or of chunks for any one long `string` or `bytes` value.
    ///
    /// Applies both to fixed arrays when the layout is built and to dynamic
    /// arrays once their length is read. Elements beyond it are left out, but
    /// the section still records the full length.
    ///
    /// Defaults to [`DEFAULT_MAXIMUM_ARRAY_EXPANSION`].
    pub maximum_array_expansion: usize,
}

impl Config {
    /// Sets the `maximum_array_expansion` config parameter to `value`.
    #[must_use]
    pub fn with_maximum_array_expansion(mut self, value: usize) -> Self {
        self.maximum_array_expansion = value;
        self
    }

    /// Gets the expansion limit as an element count.
    #[must_use]
    pub fn maximum_elements(&self) -> u64 {
        u64::try_from(self.maximum_array_expansion).unwrap_or(u64::MAX)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maximum_array_expansion: DEFAULT_MAXIMUM_ARRAY_EXPANSION,
        }
    }
}

/// The identifier of a section within a [`StorageLayout`].
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct SectionId(pub usize);

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identifier of a variable within a [`StorageLayout`].
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct VariableId(pub usize);

/// Hands out fresh section and variable identifiers.
///
/// Each layout owns its own allocator, so identifiers are deterministic for a
/// given class universe and independent between layouts.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IdAllocator {
    next_section:  usize,
    next_variable: usize,
}

impl IdAllocator {
    /// Constructs a new allocator starting from zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a fresh section identifier.
    pub fn section(&mut self) -> SectionId {
        let id = SectionId(self.next_section);
        self.next_section += 1;
        id
    }

    /// Gets a fresh variable identifier.
    pub fn variable(&mut self) -> VariableId {
        let id = VariableId(self.next_variable);
        self.next_variable += 1;
        id
    }
}

/// The kind of storage region a section describes.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageSectionKind {
    Contract,
    Struct,
    Array,
    Bytes,
    String,
}

/// One packed field within a [`StorageSection`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Variable {
    pub id: VariableId,

    /// The first slot the variable occupies.
    ///
    /// Once a layout is built this is relative to the base slot offset of the
    /// owning section.
    pub from_slot: u64,

    /// The last slot the variable occupies, inclusive.
    pub to_slot: u64,

    /// The offset of the variable within `from_slot`, counted in bytes from
    /// the low-order end of the word.
    pub byte_offset: usize,

    pub byte_size: usize,

    pub type_string: String,

    pub attribute_kind: AttributeKind,

    /// Set for mappings, functions, dynamic arrays, `string` and `bytes`.
    pub is_dynamic: bool,

    /// The declared name, absent for array elements and data chunks.
    pub name: Option<String>,

    /// The contract or struct that declared the variable.
    pub owning_class_name: Option<String>,

    pub should_fetch_value: bool,

    pub should_display_value: bool,

    /// The full 32-byte word of `from_slot`, once fetched.
    pub raw_slot_value: Option<U256Wrapper>,

    pub decoded_value: Option<String>,

    /// The section describing the region this variable points into.
    pub reference_section_id: Option<SectionId>,

    /// For enum-typed variables, the names of the enum members in order.
    pub enum_value_names: Option<Vec<String>>,
}

impl Variable {
    /// Constructs a new variable of type `type_string` at the start of slot
    /// zero, with nothing to fetch or display.
    #[must_use]
    pub fn new(
        id: VariableId,
        type_string: impl Into<String>,
        attribute_kind: AttributeKind,
        size: TypeSize,
    ) -> Self {
        Self {
            id,
            from_slot: 0,
            to_slot: 0,
            byte_offset: 0,
            byte_size: size.bytes,
            type_string: type_string.into(),
            attribute_kind,
            is_dynamic: size.is_dynamic,
            name: None,
            owning_class_name: None,
            should_fetch_value: false,
            should_display_value: false,
            raw_slot_value: None,
            decoded_value: None,
            reference_section_id: None,
            enum_value_names: None,
        }
    }

    /// Places the variable at `byte_offset` in `from_slot`, extending through
    /// `to_slot`.
    #[must_use]
    pub fn at(mut self, from_slot: u64, to_slot: u64, byte_offset: usize) -> Self {
        self.from_slot = from_slot;
        self.to_slot = to_slot;
        self.byte_offset = byte_offset;
        self
    }

    /// Sets whether the value of the variable is fetched and shown.
    #[must_use]
    pub fn showing_value(mut self, shown: bool) -> Self {
        self.should_fetch_value = shown;
        self.should_display_value = shown;
        self
    }

    /// Checks if the variable is a `string` or `bytes` value, or a chunk of
    /// one.
    #[must_use]
    pub fn is_string_or_bytes(&self) -> bool {
        matches!(self.type_string.as_str(), "string" | "bytes")
    }
}

/// One packed region of storage.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageSection {
    pub id: SectionId,

    pub name: String,

    pub kind: StorageSectionKind,

    /// The absolute slot that the section's relative slot numbers are counted
    /// from. [`None`] is equivalent to slot zero.
    pub base_slot_offset: Option<U256Wrapper>,

    /// The address of the contract whose storage was read, if any.
    pub address: Option<String>,

    /// The number of elements for arrays, or the number of bytes for long
    /// `string` and `bytes` values.
    ///
    /// This is always the full length, even where fewer variables were
    /// synthesised than it calls for.
    pub array_length: Option<u64>,

    pub is_dynamic_length: bool,

    /// Set when the section lives behind a mapping key and so cannot be
    /// addressed by static slot arithmetic.
    pub under_mapping: bool,

    /// The variables in non-decreasing `from_slot` order.
    pub variables: Vec<Variable>,
}

impl StorageSection {
    /// Constructs a new, empty section.
    #[must_use]
    pub fn new(
        id: SectionId,
        name: impl Into<String>,
        kind: StorageSectionKind,
        under_mapping: bool,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            base_slot_offset: None,
            address: None,
            array_length: None,
            is_dynamic_length: false,
            under_mapping,
            variables: Vec::new(),
        }
    }

    /// Computes the absolute storage key of the section-relative `slot`.
    #[must_use]
    pub fn slot_key(&self, slot: u64) -> U256Wrapper {
        let base = self.base_slot_offset.unwrap_or_default();
        U256Wrapper(base.0.wrapping_add(slot.into()))
    }
}

/// The storage layout of a single contract.
///
/// # Invariants
///
/// The root section is always the first section.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StorageLayout {
    sections: Vec<StorageSection>,

    #[serde(skip)]
    positions: HashMap<SectionId, usize>,

    #[serde(skip)]
    ids: IdAllocator,

    #[serde(skip)]
    config: Config,
}

impl StorageLayout {
    /// Constructs a layout from its `root` section and the sections derived
    /// beneath it, taking over the allocator that produced their ids.
    #[must_use]
    pub fn new(root: StorageSection, derived: Vec<StorageSection>, ids: IdAllocator) -> Self {
        let mut layout = Self {
            sections: Vec::with_capacity(derived.len() + 1),
            positions: HashMap::new(),
            ids,
            config: Config::default(),
        };
        layout.push(root);
        derived.into_iter().for_each(|section| layout.push(section));
        layout
    }

    /// Sets the configuration used when expanding the layout further.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Gets the configuration used when expanding the layout further.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Adds a `section` to the layout.
    pub fn push(&mut self, section: StorageSection) {
        self.positions.insert(section.id, self.sections.len());
        self.sections.push(section);
    }

    /// Gets the sections making up the layout, root first.
    #[must_use]
    pub fn sections(&self) -> &[StorageSection] {
        &self.sections
    }

    /// Gets the root section, which describes the contract itself.
    #[must_use]
    pub fn root(&self) -> &StorageSection {
        &self.sections[0]
    }

    /// Gets the identifier of the root section.
    #[must_use]
    pub fn root_id(&self) -> SectionId {
        self.root().id
    }

    /// Gets the section with the provided `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no such section is part of the layout.
    pub fn section(&self, id: SectionId) -> Result<&StorageSection> {
        self.positions
            .get(&id)
            .map(|position| &self.sections[*position])
            .ok_or(Error::UnknownSection { id })
    }

    /// Gets the section with the provided `id` mutably.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no such section is part of the layout.
    pub fn section_mut(&mut self, id: SectionId) -> Result<&mut StorageSection> {
        self.positions
            .get(&id)
            .map(|position| &mut self.sections[*position])
            .ok_or(Error::UnknownSection { id })
    }

    /// Gets the section with the provided `id` mutably, alongside the
    /// allocator for any new variables or sections it needs.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no such section is part of the layout.
    pub fn section_with_ids(&mut self, id: SectionId) -> Result<(&mut StorageSection, &mut IdAllocator)> {
        let position = *self.positions.get(&id).ok_or(Error::UnknownSection { id })?;
        Ok((&mut self.sections[position], &mut self.ids))
    }

    /// Gets every section mutably.
    pub fn sections_mut(&mut self) -> impl Iterator<Item = &mut StorageSection> {
        self.sections.iter_mut()
    }

    /// Removes the sections that the variables of the section with `id` point
    /// into, along with every section beneath them.
    ///
    /// The section with `id` itself is kept.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no such section is part of the layout.
    pub fn remove_children(&mut self, id: SectionId) -> Result<()> {
        let mut removed = HashSet::new();
        let mut pending: Vec<_> = self
            .section(id)?
            .variables
            .iter()
            .filter_map(|v| v.reference_section_id)
            .collect();
        while let Some(current) = pending.pop() {
            if current == id || !removed.insert(current) {
                continue;
            }
            if let Ok(section) = self.section(current) {
                pending.extend(section.variables.iter().filter_map(|v| v.reference_section_id));
            }
        }
        if removed.is_empty() {
            return Ok(());
        }

        self.sections.retain(|section| !removed.contains(&section.id));
        self.positions = self
            .sections
            .iter()
            .enumerate()
            .map(|(position, section)| (section.id, position))
            .collect();

        Ok(())
    }
}

/// Additional utility functions to enable cleaner testing with the storage
/// layout.
impl StorageLayout {
    /// Gets the first variable in the root section named `name`.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.root().variables.iter().find(|v| v.name.as_deref() == Some(name))
    }

    /// Gets the section that the root variable called `name` points into.
    #[must_use]
    pub fn referenced_by(&self, name: &str) -> Option<&StorageSection> {
        let id = self.variable(name)?.reference_section_id?;
        self.section(id).ok()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        layout::{
            IdAllocator,
            SectionId,
            StorageLayout,
            StorageSection,
            StorageSectionKind,
            TypeSize,
            Variable,
            VariableId,
        },
        model::AttributeKind,
        utility::U256Wrapper,
    };

    #[test]
    fn allocates_ids_independently() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.section(), SectionId(0));
        assert_eq!(ids.section(), SectionId(1));
        assert_eq!(ids.variable().0, 0);
        assert_eq!(IdAllocator::new().section(), SectionId(0));
    }

    #[test]
    fn keeps_the_root_first_and_finds_sections_by_id() -> anyhow::Result<()> {
        let root = StorageSection::new(SectionId(0), "Vault", StorageSectionKind::Contract, false);
        let child = StorageSection::new(SectionId(3), "Info", StorageSectionKind::Struct, false);
        let layout = StorageLayout::new(root, vec![child], IdAllocator::new());

        assert_eq!(layout.root_id(), SectionId(0));
        assert_eq!(layout.section(SectionId(3))?.name, "Info");
        assert!(layout.section(SectionId(1)).is_err());

        Ok(())
    }

    #[test]
    fn removes_everything_beneath_a_section() -> anyhow::Result<()> {
        let pointing_to = |id: usize| {
            let mut variable =
                Variable::new(VariableId(id), "T", AttributeKind::UserDefined, TypeSize::fixed(32));
            variable.reference_section_id = Some(SectionId(id));
            variable
        };
        let mut root = StorageSection::new(SectionId(0), "Vault", StorageSectionKind::Contract, false);
        root.variables = vec![pointing_to(1), pointing_to(3)];
        let mut array = StorageSection::new(SectionId(1), "T[]", StorageSectionKind::Array, false);
        array.variables = vec![pointing_to(2)];
        let element = StorageSection::new(SectionId(2), "T", StorageSectionKind::Struct, false);
        let sibling = StorageSection::new(SectionId(3), "U", StorageSectionKind::Struct, false);
        let mut layout = StorageLayout::new(root, vec![array, element, sibling], IdAllocator::new());

        layout.remove_children(SectionId(1))?;
        let ids: Vec<_> = layout.sections().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![SectionId(0), SectionId(1), SectionId(3)]);
        assert_eq!(layout.section(SectionId(3))?.name, "U");
        assert!(layout.section(SectionId(2)).is_err());
        assert!(layout.remove_children(SectionId(2)).is_err());

        Ok(())
    }

    #[test]
    fn computes_slot_keys_from_the_base() {
        let mut section = StorageSection::new(SectionId(0), "x", StorageSectionKind::Array, false);
        assert_eq!(section.slot_key(4), U256Wrapper::from(4u64));

        section.base_slot_offset = Some(U256Wrapper::from(10u64));
        assert_eq!(section.slot_key(4), U256Wrapper::from(14u64));
    }
}
