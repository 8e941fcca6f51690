//! This module contains the expansion of a layout using fetched slot values.
//!
//! Some of the layout of a contract can only be known once its storage has
//! been read: the number of elements in a dynamic array, and the length of a
//! `string` or `bytes` value too long to be stored in place. Expansion reads
//! each section's values, synthesises the variables those values reveal, and
//! then moves on to the sections beneath it.

use ethnum::U256;
use tracing::{debug, warn};

use crate::{
    constant::{SHORT_DYNAMIC_MAXIMUM_BYTES, UNALLOCATED_TYPE_NAME, WORD_SIZE_BYTES},
    error::Result,
    layout::{
        builder::element_position,
        size::element_slot_bytes,
        IdAllocator,
        SectionId,
        StorageLayout,
        StorageSection,
        StorageSectionKind,
        TypeSize,
        Variable,
    },
    model::AttributeKind,
    slots::{add_slot_values, SlotValueClient, Transport},
    utility::{hash_slot, U256Wrapper},
};

/// Gets the byte length of a long-form `string` or `bytes` value from its
/// length `word`.
///
/// Returns zero if the word holds a short-form value, which is the case when
/// its lowest bit is clear. Lengths that do not fit in a [`u64`] saturate.
#[must_use]
pub fn dynamic_slot_size(word: U256Wrapper) -> u64 {
    if word.0 & U256::ONE == U256::ZERO {
        return 0;
    }
    let length = (word.0 - U256::ONE) / 2;
    if length > U256::from(u64::MAX) {
        u64::MAX
    } else {
        length.as_u64()
    }
}

/// Reads the slot values of the section with `section_id` and every section
/// beneath it, synthesising the variables of dynamic arrays and of long
/// `string` and `bytes` values as their lengths become known.
///
/// Sections behind mappings are skipped. Expanding a section a second time
/// reads nothing new and synthesises nothing new. The number of elements or
/// chunks synthesised for any one value is limited by the layout's
/// [`crate::layout::Config`].
///
/// # Errors
///
/// Returns [`Err`] if any slot values could not be read. The layout is left
/// partly expanded in that case, and should be discarded.
pub async fn expand_dynamic<T: Transport>(
    layout: &mut StorageLayout,
    section_id: SectionId,
    client: &mut SlotValueClient<T>,
) -> Result<()> {
    let maximum = layout.config().maximum_elements();

    // Each step must finish reading before the next knows what to read
    let mut pending = vec![section_id];
    while let Some(current) = pending.pop() {
        if layout.section(current)?.under_mapping {
            continue;
        }
        add_slot_values(layout.section_mut(current)?, client).await?;

        let mut new_sections = Vec::new();
        let (section, ids) = layout.section_with_ids(current)?;
        let base = section.base_slot_offset;
        for variable in &mut section.variables {
            if let Some(long) = long_value_section(variable, base, ids, maximum) {
                variable.reference_section_id = Some(long.id);
                new_sections.push(long);
            }
        }

        let array_lengths: Vec<_> = section
            .variables
            .iter()
            .filter(|v| v.attribute_kind == AttributeKind::Array && v.is_dynamic)
            .filter_map(|v| Some((v.reference_section_id?, dynamic_array_length(v)?)))
            .collect();

        let children: Vec<_> = section
            .variables
            .iter()
            .filter_map(|v| v.reference_section_id)
            .collect();

        new_sections.into_iter().for_each(|s| layout.push(s));
        for (child, length) in array_lengths {
            expand_array(layout, child, length, maximum)?;
        }
        pending.extend(children.into_iter().rev());
    }

    Ok(())
}

/// Gets the number of elements of the dynamic array `variable`, once its length
/// word has been read. Lengths that do not fit in a [`u64`] saturate.
fn dynamic_array_length(variable: &Variable) -> Option<u64> {
    let word = variable.raw_slot_value?.0;
    let length = if word > U256::from(u64::MAX) {
        u64::MAX
    } else {
        word.as_u64()
    };
    Some(length)
}

/// Synthesises the elements of the dynamic array section with `id` after the
/// first, now that it is known to have `length` elements.
///
/// The new elements share the shape of the first, but never its nested
/// section. No more than `maximum` elements are synthesised, while the section
/// records the full `length`. An empty array loses its representative element
/// and everything beneath it.
fn expand_array(layout: &mut StorageLayout, id: SectionId, length: u64, maximum: u64) -> Result<()> {
    let section = layout.section_mut(id)?;
    if section.array_length.is_some() {
        return Ok(());
    }
    section.array_length = Some(length);

    if length == 0 {
        layout.remove_children(id)?;
        let section = layout.section_mut(id)?;
        section.variables.clear();
        debug!(section = %section.name, "dynamic array is empty");
        return Ok(());
    }

    let (section, ids) = layout.section_with_ids(id)?;
    let Some(first) = section.variables.first().cloned() else {
        return Ok(());
    };
    if length > maximum {
        warn!(
            section = %section.name,
            length,
            maximum,
            "truncating expansion of dynamic array"
        );
    }

    let slot_bytes = element_slot_bytes(first.byte_size);
    for index in 1..length.min(maximum) {
        let (from_slot, to_slot, byte_offset) = element_position(index, slot_bytes);
        section.variables.push(
            Variable {
                id: ids.variable(),
                raw_slot_value: None,
                decoded_value: None,
                reference_section_id: None,
                ..first.clone()
            }
            .at(first.from_slot + from_slot, first.from_slot + to_slot, byte_offset),
        );
    }
    debug!(section = %section.name, length, "expanded dynamic array");

    Ok(())
}

/// Builds the section holding the data of `variable`, if it is a long-form
/// `string` or `bytes` value whose length word has been read.
///
/// The data is split into one variable per slot. The last slot is split into
/// the remaining data at its high-order end, and unallocated padding at its
/// low-order end.
fn long_value_section(
    variable: &Variable,
    base: Option<U256Wrapper>,
    ids: &mut IdAllocator,
    maximum: u64,
) -> Option<StorageSection> {
    if !variable.is_string_or_bytes()
        || !variable.is_dynamic
        || variable.reference_section_id.is_some()
    {
        return None;
    }
    let length = dynamic_slot_size(variable.raw_slot_value?);
    if length <= SHORT_DYNAMIC_MAXIMUM_BYTES as u64 {
        return None;
    }

    let word = WORD_SIZE_BYTES as u64;
    let chunks = length.div_ceil(word);
    if chunks > maximum {
        warn!(
            value = %variable.type_string,
            length,
            maximum,
            "truncating expansion of long value"
        );
    }
    let last = chunks - 1;
    let last_bytes = (length - last * word) as usize;

    let mut variables = Vec::new();
    for chunk in 0..chunks.min(maximum) {
        let bytes = if chunk == last { last_bytes } else { WORD_SIZE_BYTES };
        let data = Variable::new(
            ids.variable(),
            &variable.type_string,
            AttributeKind::Elementary,
            TypeSize::fixed(bytes),
        )
        .showing_value(true);

        let padding = WORD_SIZE_BYTES - bytes;
        if padding > 0 {
            let mut unallocated = Variable::new(
                ids.variable(),
                UNALLOCATED_TYPE_NAME,
                AttributeKind::UserDefined,
                TypeSize::fixed(padding),
            )
            .at(chunk, chunk, 0);
            unallocated.owning_class_name = variable.owning_class_name.clone();
            variables.push(unallocated);
        }

        let mut data = data.at(chunk, chunk, padding);
        data.owning_class_name = variable.owning_class_name.clone();
        variables.push(data);
    }

    let kind = if variable.type_string == "string" {
        StorageSectionKind::String
    } else {
        StorageSectionKind::Bytes
    };
    let name = match &variable.name {
        Some(name) => format!("{}: {name}", variable.type_string),
        None => variable.type_string.clone(),
    };
    let absolute = U256Wrapper(
        base.unwrap_or_default()
            .0
            .wrapping_add(U256::from(variable.from_slot)),
    );

    let mut section = StorageSection::new(ids.section(), &name, kind, false);
    section.base_slot_offset = Some(hash_slot(absolute));
    section.array_length = Some(length);
    section.is_dynamic_length = true;
    section.variables = variables;
    debug!(section = %name, length, "derived long value section");

    Some(section)
}
