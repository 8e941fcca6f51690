//! This module contains the association resolver, which links a type named in
//! the context of one class to the class that actually declares it.
//!
//! # How it Works
//!
//! Resolution proceeds in two phases:
//!
//! 1. A breadth-first walk of the import graph starting at the referencing
//!    class. At each file visited, the reference is checked against the classes
//!    declared in that file and the names imported into it, following aliases
//!    back to their original names.
//! 2. If the import walk finds nothing, the inheritance graph of every class
//!    visited in phase 1 is walked looking for a struct or enum of the target
//!    name declared inside a parent contract.
//!
//! Phase 2 resolves each parent contract through the phase 1 primitive alone,
//! which has no way to recurse back into phase 2.

use std::collections::{HashSet, VecDeque};

use tracing::trace;

use crate::{
    error::resolution::{Error, Result},
    model::{Association, ClassEntry, ClassId, ClassUniverse},
};

/// Resolves references between the classes of a single [`ClassUniverse`].
#[derive(Clone, Copy, Debug)]
pub struct Resolver<'u> {
    universe: &'u ClassUniverse,
}

impl<'u> Resolver<'u> {
    /// Constructs a new resolver over the classes in `universe`.
    #[must_use]
    pub fn new(universe: &'u ClassUniverse) -> Self {
        Self { universe }
    }

    /// Gets the universe that the resolver searches.
    #[must_use]
    pub fn universe(&self) -> &'u ClassUniverse {
        self.universe
    }

    /// Finds the class denoted by `reference` when it appears in the context of
    /// `from`.
    ///
    /// Returns [`None`] if the reference cannot be found through either the
    /// import graph or the inheritance graph. It is up to the caller to decide
    /// whether this is fatal.
    #[must_use]
    pub fn resolve(&self, reference: &Association, from: &'u ClassEntry) -> Option<&'u ClassEntry> {
        let search = find_via_imports(reference, from, self.universe);
        if let Some(found) = search.found {
            return Some(found);
        }

        // Shared across all sources as inheritance chains can reconverge
        let mut visited_class_ids = HashSet::new();
        search.visited_sources.into_iter().find_map(|source| {
            find_inherited_type(reference, source, self.universe, &mut visited_class_ids)
        })
    }

    /// Finds the class that declares the user-defined type written as
    /// `type_name` in the context of `from`.
    ///
    /// Struct fields may name types that are only visible to the contract the
    /// struct is declared in, so the enclosing class is tried second.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the type cannot be resolved.
    pub fn resolve_type(&self, type_name: &str, from: &'u ClassEntry) -> Result<&'u ClassEntry> {
        let reference = Association::reference(type_name);
        self.resolve(&reference, from)
            .or_else(|| {
                let enclosing = self.universe.enclosing_class(from.id)?;
                self.resolve(&reference, enclosing)
            })
            .ok_or_else(|| Error::UnresolvedType {
                type_name:  type_name.to_string(),
                class_name: from.name.clone(),
            })
    }

    /// Finds the contract that the inheritance edge `parent` of `from` points
    /// to.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the parent cannot be resolved.
    pub fn resolve_parent(
        &self,
        parent: &Association,
        from: &'u ClassEntry,
    ) -> Result<&'u ClassEntry> {
        self.resolve(parent, from).ok_or_else(|| Error::UnresolvedParent {
            parent_name: parent.qualified_name(),
            class_path:  from.path.clone(),
        })
    }
}

/// The outcome of walking the import graph.
struct ImportSearch<'u> {
    /// The class that the reference resolved to, if any.
    found: Option<&'u ClassEntry>,

    /// One class per distinct file visited, in visit order.
    visited_sources: Vec<&'u ClassEntry>,
}

/// Walks the import graph breadth-first from `source`, checking for a direct
/// match of `reference` at every file visited.
///
/// The walk is keyed on `(file, target name)` pairs so that it terminates on
/// cyclic imports.
fn find_via_imports<'u>(
    reference: &Association,
    source: &'u ClassEntry,
    universe: &'u ClassUniverse,
) -> ImportSearch<'u> {
    let mut searched: HashSet<(&'u str, String)> = HashSet::new();
    let mut visited_paths: HashSet<&'u str> = HashSet::new();
    let mut visited_sources = Vec::new();
    let mut queue = VecDeque::from([(source, reference.target_name.clone())]);

    while let Some((current, target_name)) = queue.pop_front() {
        if !searched.insert((current.path.as_str(), target_name.clone())) {
            continue;
        }

        if visited_paths.insert(current.path.as_str()) {
            visited_sources.push(current);
        }

        // The target name may have been de-aliased on the way here
        let current_reference = Association {
            target_name: target_name.clone(),
            ..reference.clone()
        };
        if let Some(found) = try_direct_match(&current_reference, current, universe) {
            trace!(
                target = %reference.qualified_name(),
                found = %found.name,
                path = %found.path,
                "resolved through imports"
            );
            return ImportSearch {
                found: Some(found),
                visited_sources,
            };
        }

        let leading_imports = current.imports.iter().filter(|import| {
            import.is_wildcard()
                || import.class_names.iter().any(|name| {
                    (name.class_name == target_name && name.alias.is_none())
                        || name.alias.as_deref() == Some(target_name.as_str())
                })
        });
        for import in leading_imports {
            let Some(imported) = universe.first_in_file(&import.absolute_path) else {
                continue;
            };

            if !searched.contains(&(imported.path.as_str(), target_name.clone())) {
                queue.push_back((imported, target_name.clone()));
            }

            // Further chains are expressed in terms of the original name
            for name in &import.class_names {
                if name.alias.as_deref() == Some(target_name.as_str())
                    && !searched.contains(&(imported.path.as_str(), name.class_name.clone()))
                {
                    queue.push_back((imported, name.class_name.clone()));
                }
            }
        }
    }

    ImportSearch {
        found: None,
        visited_sources,
    }
}

/// Finds a class that `source` can see directly under the name in
/// `reference`, either in its own file or through one of its imports.
fn try_direct_match<'u>(
    reference: &Association,
    source: &ClassEntry,
    universe: &'u ClassUniverse,
) -> Option<&'u ClassEntry> {
    universe.classes().iter().find(|target| {
        let target_parent = reference
            .parent_name
            .as_ref()
            .and_then(|_| universe.enclosing_class(target.id));
        is_associated(reference, source, target, target_parent)
    })
}

/// Checks whether `reference`, written in the context of `source`, denotes
/// `target`, whose enclosing class (if any) is `target_parent`.
fn is_associated(
    reference: &Association,
    source: &ClassEntry,
    target: &ClassEntry,
    target_parent: Option<&ClassEntry>,
) -> bool {
    if reference.target_name != target.name {
        return false;
    }
    let same_file = source.path == target.path;
    let imports_of_target = || {
        source
            .imports
            .iter()
            .filter(move |import| import.absolute_path == target.path)
    };

    match &reference.parent_name {
        Some(parent_name) => {
            let Some(target_parent) = target_parent else {
                return false;
            };
            let parent_matches = &target_parent.name == parent_name;

            (parent_matches && same_file)
                || (parent_matches && imports_of_target().any(|i| i.is_wildcard()))
                || imports_of_target().any(|import| {
                    import.class_names.iter().any(|name| {
                        name.class_name == target_parent.name
                            && match &name.alias {
                                None => &name.class_name == parent_name,
                                Some(alias) => alias == parent_name,
                            }
                    })
                })
        }
        None => {
            same_file
                || imports_of_target().any(|i| i.is_wildcard())
                || imports_of_target().any(|import| {
                    import.class_names.iter().any(|name| {
                        name.class_name == target.name
                            && match &name.alias {
                                None => name.class_name == reference.target_name,
                                Some(alias) => alias == &reference.target_name,
                            }
                    })
                })
        }
    }
}

/// Walks the inheritance graph upwards from `source` looking for a struct or
/// enum named by `reference` that is declared inside one of its ancestors.
///
/// Each class is visited at most once across the whole search, as diamond
/// inheritance can reach the same ancestor along multiple paths.
fn find_inherited_type<'u>(
    reference: &Association,
    source: &'u ClassEntry,
    universe: &'u ClassUniverse,
    visited_class_ids: &mut HashSet<ClassId>,
) -> Option<&'u ClassEntry> {
    if !visited_class_ids.insert(source.id) {
        return None;
    }

    for parent_edge in source.parent_contracts() {
        let Some(parent) = find_via_imports(parent_edge, source, universe).found else {
            continue;
        };

        let declared = parent
            .struct_ids
            .iter()
            .chain(parent.enum_ids.iter())
            .filter_map(|id| universe.get(*id))
            .find(|nested| nested.name == reference.target_name);
        if let Some(declared) = declared {
            trace!(
                target = %reference.qualified_name(),
                parent = %parent.name,
                "resolved through inheritance"
            );
            return Some(declared);
        }

        if let Some(found) = find_inherited_type(reference, parent, universe, visited_class_ids) {
            return Some(found);
        }
    }

    None
}
