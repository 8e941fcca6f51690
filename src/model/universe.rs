//! This module contains the container for the full set of classes known to a
//! resolution pass.

use std::collections::HashMap;

use crate::model::{ClassEntry, ClassId};

/// Every class known to a single resolution pass, with the lookups that the
/// resolver and layout engine need.
///
/// # Invariants
///
/// Class ids are unique within the universe. The classes are never mutated
/// once the universe is constructed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClassUniverse {
    /// The classes in the order the front-end supplied them.
    classes: Vec<ClassEntry>,

    /// The position of each class in `classes`, by id.
    positions: HashMap<ClassId, usize>,

    /// For each struct or enum, the class that it is declared inside.
    enclosing: HashMap<ClassId, ClassId>,
}

impl ClassUniverse {
    /// Constructs a new universe containing the provided `classes`.
    ///
    /// Where two classes share an id, the first one wins.
    #[must_use]
    pub fn new(classes: Vec<ClassEntry>) -> Self {
        let mut positions = HashMap::with_capacity(classes.len());
        let mut enclosing = HashMap::new();
        for (position, class) in classes.iter().enumerate() {
            positions.entry(class.id).or_insert(position);
            for nested in class.struct_ids.iter().chain(class.enum_ids.iter()) {
                enclosing.entry(*nested).or_insert(class.id);
            }
        }

        Self {
            classes,
            positions,
            enclosing,
        }
    }

    /// Gets all of the classes in the universe.
    #[must_use]
    pub fn classes(&self) -> &[ClassEntry] {
        &self.classes
    }

    /// Gets the class with the provided `id`, if it exists.
    #[must_use]
    pub fn get(&self, id: ClassId) -> Option<&ClassEntry> {
        self.positions.get(&id).map(|position| &self.classes[*position])
    }

    /// Gets the first class declared in the file at `path`.
    #[must_use]
    pub fn first_in_file(&self, path: &str) -> Option<&ClassEntry> {
        self.classes.iter().find(|class| class.path == path)
    }

    /// Gets the class that the struct or enum with `id` is declared inside, if
    /// it is declared inside one.
    #[must_use]
    pub fn enclosing_class(&self, id: ClassId) -> Option<&ClassEntry> {
        self.enclosing.get(&id).and_then(|parent| self.get(*parent))
    }

    /// Gets the number of classes in the universe.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Checks if the universe contains no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl From<Vec<ClassEntry>> for ClassUniverse {
    fn from(value: Vec<ClassEntry>) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{ClassEntry, ClassId, ClassStereotype, ClassUniverse};

    #[test]
    fn finds_enclosing_classes() {
        let universe = ClassUniverse::new(vec![
            ClassEntry::new(0, "Vault", ClassStereotype::Contract, "/vault.sol")
                .with_struct(1)
                .with_enum(2),
            ClassEntry::new(1, "Position", ClassStereotype::Struct, "/vault.sol"),
            ClassEntry::new(2, "Status", ClassStereotype::Enum, "/vault.sol"),
            ClassEntry::new(3, "Loose", ClassStereotype::Struct, "/vault.sol"),
        ]);

        assert_eq!(universe.enclosing_class(ClassId(1)).map(|c| c.id), Some(ClassId(0)));
        assert_eq!(universe.enclosing_class(ClassId(2)).map(|c| c.id), Some(ClassId(0)));
        assert!(universe.enclosing_class(ClassId(3)).is_none());
        assert_eq!(universe.first_in_file("/vault.sol").map(|c| c.id), Some(ClassId(0)));
        assert_eq!(universe.len(), 4);
    }
}
