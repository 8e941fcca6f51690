//! This module contains the layout engine, which turns the class model of a
//! contract into its tree of storage sections.
//!
//! # How it Works
//!
//! Layout happens in two passes:
//!
//! 1. The variables of the contract are collected, parents first, and packed
//!    into slots. Any variable whose type has contents of its own (structs,
//!    arrays and mappings of structs) gets a section derived for it, with slot
//!    numbers relative to the start of that section.
//! 2. The section tree is walked from the root, shifting static child sections
//!    so that they sit under the variable that owns them, and moving the
//!    contents of dynamic arrays to the hash of their length slot.

use std::{ffi::OsStr, path::Path};

use ethnum::U256;
use tracing::{debug, trace, warn};

use crate::{
    constant::{MAXIMUM_PACKED_ELEMENT_BYTES, WORD_SIZE_BYTES},
    error::{layout, Result},
    layout::{
        size::{calc_byte_size, element_slot_bytes, is_elementary, split_array_type},
        find_dimension_length,
        Config,
        IdAllocator,
        SectionId,
        StorageLayout,
        StorageSection,
        StorageSectionKind,
        Variable,
    },
    model::{Attribute, AttributeKind, ClassEntry, ClassId, ClassStereotype, ClassUniverse},
    resolver::Resolver,
    utility::{hash_slot, U256Wrapper},
};

/// Computes the storage layout of the contract called `contract_name`, using
/// the default [`Config`].
///
/// If more than one class has that name, `path_hint` selects the one declared
/// in the matching file. The hint may be the file's relative path or just its
/// file name.
///
/// The result is deterministic for a given `universe`.
///
/// # Errors
///
/// Returns [`Err`] if the contract cannot be found, or if any of the types in
/// its storage cannot be resolved or sized.
pub fn build_layout(
    contract_name: &str,
    universe: &ClassUniverse,
    path_hint: Option<&str>,
) -> Result<StorageLayout> {
    build_layout_with_config(contract_name, universe, path_hint, &Config::default())
}

/// Computes the storage layout of the contract called `contract_name`, as
/// [`build_layout`] does, but limiting fixed arrays to the number of elements
/// that `config` allows.
///
/// The `config` is kept with the layout, so later expansion of dynamic arrays
/// is limited in the same way.
///
/// # Errors
///
/// Returns [`Err`] if the contract cannot be found, or if any of the types in
/// its storage cannot be resolved or sized.
pub fn build_layout_with_config(
    contract_name: &str,
    universe: &ClassUniverse,
    path_hint: Option<&str>,
    config: &Config,
) -> Result<StorageLayout> {
    let contract = find_contract(contract_name, universe, path_hint)?;
    debug!(contract = contract_name, path = %contract.path, "found contract");

    let mut builder = LayoutBuilder::new(universe, config.maximum_elements());
    let root_id = builder.ids.section();

    let mut variables = Vec::new();
    builder.collect_variables(contract, &mut Vec::new(), &mut variables, false)?;

    let mut root = StorageSection::new(root_id, contract_name, StorageSectionKind::Contract, false);
    root.variables = variables;

    let LayoutBuilder { ids, sections, .. } = builder;
    let mut layout = StorageLayout::new(root, sections, ids).with_config(config.clone());
    adjust_slots(&mut layout, root_id, 0)?;

    Ok(layout)
}

/// Finds the class called `name`, optionally in the file at `path_hint`.
fn find_contract<'u>(
    name: &str,
    universe: &'u ClassUniverse,
    path_hint: Option<&str>,
) -> layout::Result<&'u ClassEntry> {
    universe
        .classes()
        .iter()
        .find(|class| {
            class.name == name
                && path_hint.map_or(true, |hint| {
                    let hint = hint.trim_start_matches("./");
                    class.display_path.trim_start_matches("./") == hint
                        || class.path == hint
                        || Path::new(&class.display_path).file_name() == Some(OsStr::new(hint))
                })
        })
        .ok_or_else(|| layout::Error::ContractNotFound {
            name: name.to_string(),
            path: path_hint.map(ToString::to_string),
        })
}

/// The working state of a single layout computation.
struct LayoutBuilder<'u> {
    resolver: Resolver<'u>,
    ids:      IdAllocator,

    /// Every section derived so far, excluding the root.
    sections: Vec<StorageSection>,

    /// The structs whose sections are currently being derived, used to stop at
    /// self-referential structs.
    deriving: Vec<ClassId>,

    /// The most elements derived for any one fixed array.
    maximum_elements: u64,
}

impl<'u> LayoutBuilder<'u> {
    fn new(universe: &'u ClassUniverse, maximum_elements: u64) -> Self {
        Self {
            resolver:         Resolver::new(universe),
            ids:              IdAllocator::new(),
            sections:         Vec::new(),
            deriving:         Vec::new(),
            maximum_elements,
        }
    }

    /// Appends the storage variables of `class` to `variables`, after those of
    /// its parents.
    ///
    /// Every contract named in `inherited` has already been laid out, and is
    /// skipped so that a common ancestor contributes its variables only once.
    fn collect_variables(
        &mut self,
        class: &'u ClassEntry,
        inherited: &mut Vec<String>,
        variables: &mut Vec<Variable>,
        under_mapping: bool,
    ) -> Result<()> {
        let new_parents: Vec<_> = class
            .parent_contracts()
            .filter(|parent| !inherited.contains(&parent.target_name))
            .collect();
        inherited.extend(new_parents.iter().map(|p| p.target_name.clone()));

        for parent in new_parents {
            let parent_class = self.resolver.resolve_parent(parent, class)?;
            self.collect_variables(parent_class, inherited, variables, under_mapping)?;
        }

        for attribute in class.attributes.iter().filter(|a| !a.is_compiled_constant) {
            let size = calc_byte_size(attribute, class, &self.resolver)?;
            let reference = self.derive_section(attribute, class, under_mapping)?;
            let shown = !under_mapping
                && should_fetch_value(attribute.kind, size.is_dynamic, self.kind_of(reference));
            let (from_slot, to_slot, byte_offset) = next_position(variables.last(), size.bytes);

            let mut variable = Variable::new(
                self.ids.variable(),
                &attribute.type_string,
                attribute.kind,
                size,
            )
            .at(from_slot, to_slot, byte_offset)
            .showing_value(shown);
            variable.name = Some(attribute.name.clone());
            variable.owning_class_name = Some(class.name.clone());
            variable.reference_section_id = reference;
            variable.enum_value_names = self.enum_value_names(attribute, class)?;

            variables.push(variable);
        }

        Ok(())
    }

    /// Derives the section that `attribute` points into, if its type has one.
    fn derive_section(
        &mut self,
        attribute: &Attribute,
        class: &'u ClassEntry,
        under_mapping: bool,
    ) -> Result<Option<SectionId>> {
        match attribute.kind {
            AttributeKind::Array => self.derive_array_section(attribute, class, under_mapping),
            AttributeKind::UserDefined => {
                let target = self.resolver.resolve_type(&attribute.type_string, class)?;
                if target.stereotype == ClassStereotype::Struct {
                    self.derive_struct_section(target, &attribute.type_string, under_mapping)
                } else {
                    Ok(None)
                }
            }
            AttributeKind::Mapping => {
                let Some(value_type) = mapping_value_type(&attribute.type_string) else {
                    return Ok(None);
                };
                if is_elementary(value_type) {
                    return Ok(None);
                }
                let target = self.resolver.resolve_type(value_type, class)?;
                if target.stereotype == ClassStereotype::Struct {
                    self.derive_struct_section(target, &target.name, true)
                } else {
                    Ok(None)
                }
            }
            AttributeKind::Elementary | AttributeKind::Function => Ok(None),
        }
    }

    /// Derives a section holding the fields of `structure`.
    fn derive_struct_section(
        &mut self,
        structure: &'u ClassEntry,
        name: &str,
        under_mapping: bool,
    ) -> Result<Option<SectionId>> {
        if self.deriving.contains(&structure.id) {
            trace!(name, "not deriving a section for a self-referential struct");
            return Ok(None);
        }

        let id = self.ids.section();
        self.deriving.push(structure.id);
        let mut variables = Vec::new();
        self.collect_variables(structure, &mut Vec::new(), &mut variables, under_mapping)?;
        self.deriving.pop();

        let mut section = StorageSection::new(id, name, StorageSectionKind::Struct, under_mapping);
        section.variables = variables;
        debug!(section = name, under_mapping, "derived struct section");
        self.sections.push(section);

        Ok(Some(id))
    }

    /// Derives a section holding the elements of the outermost dimension of
    /// the array `attribute`.
    ///
    /// Fixed arrays get one variable per element, up to the expansion limit.
    /// Dynamic arrays get a single representative element until their length
    /// is known. Only the first element points into the section for the
    /// element type.
    fn derive_array_section(
        &mut self,
        attribute: &Attribute,
        class: &'u ClassEntry,
        under_mapping: bool,
    ) -> Result<Option<SectionId>> {
        let type_string = attribute.type_string.as_str();
        let (_, dimensions) = split_array_type(type_string)?;
        let outer = dimensions.last().copied().unwrap_or_default();
        let base_type = type_string[..type_string.rfind('[').unwrap_or_default()].trim();

        let is_dynamic_length = outer.is_empty();
        let array_length = if is_dynamic_length {
            None
        } else {
            Some(find_dimension_length(class, outer, self.resolver.universe())?)
        };

        let base_kind = if is_elementary(base_type) {
            AttributeKind::Elementary
        } else if base_type.ends_with(']') {
            AttributeKind::Array
        } else {
            AttributeKind::UserDefined
        };
        let base_attribute = Attribute::new(base_type, base_type, base_kind);

        let id = self.ids.section();
        let element_size = calc_byte_size(&base_attribute, class, &self.resolver)?;
        let slot_bytes = element_slot_bytes(element_size.bytes);
        let nested = match base_kind {
            AttributeKind::Elementary => None,
            _ => self.derive_section(&base_attribute, class, under_mapping)?,
        };
        let shown = !under_mapping
            && should_fetch_value(base_kind, element_size.is_dynamic, self.kind_of(nested));
        let enum_value_names = self.enum_value_names(&base_attribute, class)?;

        let mut first = Variable::new(self.ids.variable(), base_type, base_kind, element_size)
            .showing_value(shown);
        let (_, to_slot, _) = element_position(0, slot_bytes);
        first.to_slot = to_slot;
        first.enum_value_names = enum_value_names;

        let declared = array_length.unwrap_or_default();
        if declared > self.maximum_elements {
            warn!(
                array = type_string,
                length = declared,
                maximum = self.maximum_elements,
                "truncating fixed array elements"
            );
        }

        let mut variables = Vec::new();
        for index in 1..declared.min(self.maximum_elements) {
            let (from_slot, to_slot, byte_offset) = element_position(index, slot_bytes);
            variables.push(
                Variable {
                    id: self.ids.variable(),
                    ..first.clone()
                }
                .at(from_slot, to_slot, byte_offset),
            );
        }
        first.reference_section_id = nested;
        variables.insert(0, first);

        let name = format!("{type_string}: {}", attribute.name);
        let mut section = StorageSection::new(id, &name, StorageSectionKind::Array, under_mapping);
        section.array_length = array_length;
        section.is_dynamic_length = is_dynamic_length;
        section.variables = variables;
        debug!(section = %name, length = ?array_length, under_mapping, "derived array section");
        self.sections.push(section);

        Ok(Some(id))
    }

    /// Gets the kind of the derived section with `id`.
    fn kind_of(&self, id: Option<SectionId>) -> Option<StorageSectionKind> {
        let id = id?;
        self.sections.iter().find(|s| s.id == id).map(|s| s.kind)
    }

    /// Gets the member names of the enum that `attribute` is typed as, if it is
    /// typed as one.
    fn enum_value_names(
        &self,
        attribute: &Attribute,
        class: &'u ClassEntry,
    ) -> Result<Option<Vec<String>>> {
        if attribute.kind != AttributeKind::UserDefined {
            return Ok(None);
        }
        let target = self.resolver.resolve_type(&attribute.type_string, class)?;
        let names = (target.stereotype == ClassStereotype::Enum)
            .then(|| target.attributes.iter().map(|a| a.name.clone()).collect());

        Ok(names)
    }
}

/// Checks whether the slot value of a variable should be fetched and shown.
///
/// This holds for elementary types, user-defined types other than structs,
/// and the length of dynamic arrays. Callers are responsible for never showing
/// the values of variables behind a mapping.
#[must_use]
pub fn should_fetch_value(
    kind: AttributeKind,
    is_dynamic: bool,
    reference: Option<StorageSectionKind>,
) -> bool {
    match kind {
        AttributeKind::Elementary => true,
        AttributeKind::UserDefined => reference != Some(StorageSectionKind::Struct),
        AttributeKind::Array => is_dynamic,
        AttributeKind::Mapping | AttributeKind::Function => false,
    }
}

/// Computes where a variable of `bytes` goes after `last`.
///
/// It shares the slot of `last` if it fits in the remaining bytes, and
/// otherwise starts at the beginning of the next slot.
fn next_position(last: Option<&Variable>, bytes: usize) -> (u64, u64, usize) {
    let Some(last) = last else {
        return (0, slots_spanned(bytes), 0);
    };

    let next_offset = last.byte_offset + last.byte_size;
    if next_offset + bytes > WORD_SIZE_BYTES {
        let from_slot = last.to_slot + 1;
        (from_slot, from_slot + slots_spanned(bytes), 0)
    } else {
        (last.to_slot, last.to_slot, next_offset)
    }
}

/// Gets the number of slots after the first that `bytes` spills into.
fn slots_spanned(bytes: usize) -> u64 {
    (bytes.saturating_sub(1) / WORD_SIZE_BYTES) as u64
}

/// Computes the position of the array element at `index`, where each element
/// takes `slot_bytes`.
///
/// Elements of up to half a slot are packed as many to a slot as fit whole.
/// Larger elements take whole slots each.
pub(crate) fn element_position(index: u64, slot_bytes: usize) -> (u64, u64, usize) {
    if slot_bytes == 0 || slot_bytes > MAXIMUM_PACKED_ELEMENT_BYTES {
        let slots_per_element = (slot_bytes / WORD_SIZE_BYTES).max(1) as u64;
        let from_slot = index.saturating_mul(slots_per_element);
        return (from_slot, from_slot.saturating_add(slots_per_element - 1), 0);
    }

    let per_slot = (WORD_SIZE_BYTES / slot_bytes) as u64;
    let from_slot = index / per_slot;
    let byte_offset = (index % per_slot) as usize * slot_bytes;
    (from_slot, from_slot, byte_offset)
}

/// Extracts the value type of the innermost mapping in `type_string`, without
/// any array dimensions.
fn mapping_value_type(type_string: &str) -> Option<&str> {
    let (_, value) = type_string.rsplit_once("=>")?;
    let value = value.trim().trim_end_matches(|c: char| c == ')' || c.is_whitespace());
    let value = value.split('[').next().unwrap_or(value).trim();
    (!value.is_empty()).then_some(value)
}

/// Computes the absolute storage key of `from_slot` in a section based at
/// `base`.
///
/// For dynamic variables this is the hash of that slot, which is where the
/// contents of dynamic arrays and long `string` and `bytes` values begin.
#[must_use]
pub fn calc_section_offset(base: Option<U256Wrapper>, from_slot: u64, is_dynamic: bool) -> U256Wrapper {
    let absolute = U256Wrapper(base.unwrap_or_default().0.wrapping_add(U256::from(from_slot)));
    if is_dynamic {
        hash_slot(absolute)
    } else {
        absolute
    }
}

/// Shifts the slots of the section with `section_id` by `slot_offset`, and
/// places every section beneath it under the variable that points into it.
///
/// Static children inherit the base of their parent and are shifted by the
/// slot of the owning variable. Dynamic arrays have their contents based at
/// the hash of the owning variable's slot. Sections behind mappings are left
/// alone.
///
/// # Errors
///
/// Returns [`Err`] if a variable points to a section that is not in `layout`.
pub fn adjust_slots(
    layout: &mut StorageLayout,
    section_id: SectionId,
    slot_offset: u64,
) -> layout::Result<()> {
    let section = layout.section_mut(section_id)?;
    let base = section.base_slot_offset;

    let mut children = Vec::new();
    for variable in &mut section.variables {
        variable.from_slot += slot_offset;
        variable.to_slot += slot_offset;
        if let Some(child) = variable.reference_section_id {
            children.push((child, variable.from_slot, variable.is_dynamic, variable.attribute_kind));
        }
    }

    for (child, from_slot, is_dynamic, kind) in children {
        if !is_dynamic {
            layout.section_mut(child)?.base_slot_offset = base;
            adjust_slots(layout, child, from_slot)?;
        } else if kind == AttributeKind::Array {
            let offset = calc_section_offset(base, from_slot, true);
            layout.section_mut(child)?.base_slot_offset = Some(offset);
            adjust_slots(layout, child, 0)?;
        }
    }

    Ok(())
}
