//! This module contains the class model that the layout engine consumes.
//!
//! The model is produced by a source front-end that has already walked the
//! contract sources. It describes every contract, interface, library, struct,
//! enum and file-level constant along with the edges between them, and is
//! treated as read-only by the rest of the library.

pub mod universe;

use serde::{Deserialize, Serialize};

pub use universe::ClassUniverse;

/// The stable identifier of a class within one resolution pass.
///
/// It is used as a weak back-reference key between classes and never implies
/// ownership.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct ClassId(pub usize);

/// The kind of declaration that a [`ClassEntry`] represents.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassStereotype {
    #[default]
    None,
    Library,
    Interface,
    Abstract,
    Contract,
    Struct,
    Enum,
    Constant,
    Import,
}

impl ClassStereotype {
    /// Checks if values of this class are stored as a 20-byte address when used
    /// as the type of a storage variable.
    #[must_use]
    pub fn is_address_like(self) -> bool {
        matches!(
            self,
            Self::Contract | Self::Abstract | Self::Interface | Self::Library
        )
    }
}

/// The visibility of an attribute as it was declared.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    None,
    Public,
    External,
    Internal,
    Private,
}

/// The broad category of an attribute's declared type.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Elementary,
    UserDefined,
    Function,
    Array,
    Mapping,
}

/// A storage variable (or struct field, or enum member) declared on a class.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Attribute {
    /// The declared name of the attribute.
    pub name: String,

    /// The raw declared type, such as `uint256[][3]` or `mapping(address =>
    /// Info)`.
    pub type_string: String,

    /// The category of the declared type.
    pub kind: AttributeKind,

    /// The declared visibility.
    #[serde(default)]
    pub visibility: Visibility,

    /// Set for `constant` and `immutable` declarations, which occupy no
    /// storage.
    #[serde(default)]
    pub is_compiled_constant: bool,
}

impl Attribute {
    /// Constructs a new storage attribute called `name` of type `type_string`.
    #[must_use]
    pub fn new(name: impl Into<String>, type_string: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            type_string: type_string.into(),
            kind,
            visibility: Visibility::default(),
            is_compiled_constant: false,
        }
    }

    /// Marks the attribute as a `constant` or `immutable` declaration.
    #[must_use]
    pub fn compiled_constant(mut self) -> Self {
        self.is_compiled_constant = true;
        self
    }
}

/// A name brought into scope by an import, optionally under an alias.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ImportedName {
    pub class_name: String,
    #[serde(default)]
    pub alias:      Option<String>,
}

/// An import of another source file.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Import {
    /// The absolute path of the imported file.
    pub absolute_path: String,

    /// The names imported from the file. An empty list is a wildcard import
    /// through which any name may resolve.
    #[serde(default)]
    pub class_names: Vec<ImportedName>,
}

impl Import {
    /// Constructs an import of the file at `absolute_path` that names what it
    /// brings into scope, through [`Self::with_name`] and [`Self::with_alias`].
    ///
    /// Until a name is added, the import is a wildcard.
    #[must_use]
    pub fn new(absolute_path: impl Into<String>) -> Self {
        Self {
            absolute_path: absolute_path.into(),
            class_names:   Vec::new(),
        }
    }

    /// Constructs a wildcard import of the file at `absolute_path`.
    #[must_use]
    pub fn wildcard(absolute_path: impl Into<String>) -> Self {
        Self::new(absolute_path)
    }

    /// Adds `class_name` to the names imported from the file.
    #[must_use]
    pub fn with_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_names.push(ImportedName {
            class_name: class_name.into(),
            alias:      None,
        });
        self
    }

    /// Adds `class_name`, imported under `alias`, to the names imported from
    /// the file.
    #[must_use]
    pub fn with_alias(mut self, class_name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.class_names.push(ImportedName {
            class_name: class_name.into(),
            alias:      Some(alias.into()),
        });
        self
    }

    /// Checks if this import brings every name of the file into scope.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.class_names.is_empty()
    }
}

/// Whether an association refers to a value in memory or in storage.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    #[default]
    Memory,
    Storage,
}

/// A typed edge from a class to a named target type.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Association {
    /// The name of the referenced type as written at the reference site.
    pub target_name: String,

    /// The class the target is declared inside, when the reference was
    /// qualified as `Parent.Target`.
    #[serde(default)]
    pub parent_name: Option<String>,

    #[serde(default)]
    pub reference_kind: ReferenceKind,

    /// Set when the edge represents `is`: inheritance or implementation.
    #[serde(default)]
    pub is_inheritance_edge: bool,
}

impl Association {
    /// Constructs a reference to the type named `target_name`.
    ///
    /// A qualified name of the form `Parent.Target` is split into its parent
    /// and target parts.
    #[must_use]
    pub fn reference(target_name: impl AsRef<str>) -> Self {
        let (parent_name, target_name) = match target_name.as_ref().split_once('.') {
            Some((parent, target)) => (Some(parent.to_string()), target.to_string()),
            None => (None, target_name.as_ref().to_string()),
        };
        Self {
            target_name,
            parent_name,
            reference_kind: ReferenceKind::Storage,
            is_inheritance_edge: false,
        }
    }

    /// Constructs an inheritance edge to the contract named `target_name`.
    #[must_use]
    pub fn inherits(target_name: impl Into<String>) -> Self {
        Self {
            target_name:         target_name.into(),
            parent_name:         None,
            reference_kind:      ReferenceKind::Storage,
            is_inheritance_edge: true,
        }
    }

    /// Gets the name as written at the reference site, including any parent
    /// qualifier.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.parent_name {
            Some(parent) => format!("{parent}.{}", self.target_name),
            None => self.target_name.clone(),
        }
    }
}

/// A named numeric constant declared in a contract or at file level.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Constant {
    pub name:  String,
    pub value: u64,
}

/// A contract, interface, library, abstract contract, struct, enum or
/// file-level constant.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClassEntry {
    pub id: ClassId,

    pub name: String,

    #[serde(default)]
    pub stereotype: ClassStereotype,

    /// The absolute path of the declaring file.
    pub path: String,

    /// The path of the declaring file relative to the project root.
    #[serde(default)]
    pub display_path: String,

    #[serde(default)]
    pub imports: Vec<Import>,

    /// Storage variables, struct fields or enum members, in declaration order.
    #[serde(default)]
    pub attributes: Vec<Attribute>,

    #[serde(default)]
    pub associations: Vec<Association>,

    /// The structs declared inside this class.
    #[serde(default)]
    pub struct_ids: Vec<ClassId>,

    /// The enums declared inside this class.
    #[serde(default)]
    pub enum_ids: Vec<ClassId>,

    #[serde(default)]
    pub constants: Vec<Constant>,
}

impl ClassEntry {
    /// Constructs an empty class with the provided `id`, `name` and
    /// `stereotype`, declared in the file at `path`.
    #[must_use]
    pub fn new(
        id: usize,
        name: impl Into<String>,
        stereotype: ClassStereotype,
        path: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self {
            id: ClassId(id),
            name: name.into(),
            stereotype,
            display_path: path.clone(),
            path,
            imports: Vec::new(),
            attributes: Vec::new(),
            associations: Vec::new(),
            struct_ids: Vec::new(),
            enum_ids: Vec::new(),
            constants: Vec::new(),
        }
    }

    /// Sets the relative path shown for the class.
    #[must_use]
    pub fn with_display_path(mut self, display_path: impl Into<String>) -> Self {
        self.display_path = display_path.into();
        self
    }

    /// Adds an import to the class.
    #[must_use]
    pub fn with_import(mut self, import: Import) -> Self {
        self.imports.push(import);
        self
    }

    /// Appends an attribute to the class.
    #[must_use]
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Adds an inheritance edge to the contract named `parent`.
    #[must_use]
    pub fn inheriting(mut self, parent: impl Into<String>) -> Self {
        self.associations.push(Association::inherits(parent));
        self
    }

    /// Adds an association to the class.
    #[must_use]
    pub fn with_association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    /// Records that the struct with `id` is declared inside this class.
    #[must_use]
    pub fn with_struct(mut self, id: usize) -> Self {
        self.struct_ids.push(ClassId(id));
        self
    }

    /// Records that the enum with `id` is declared inside this class.
    #[must_use]
    pub fn with_enum(mut self, id: usize) -> Self {
        self.enum_ids.push(ClassId(id));
        self
    }

    /// Adds a numeric constant to the class.
    #[must_use]
    pub fn with_constant(mut self, name: impl Into<String>, value: u64) -> Self {
        self.constants.push(Constant {
            name: name.into(),
            value,
        });
        self
    }

    /// Gets the immediate parent contracts this class inherits from, in
    /// declaration order.
    ///
    /// Grandparents are not included and need to be found recursively.
    pub fn parent_contracts(&self) -> impl Iterator<Item = &Association> {
        self.associations.iter().filter(|a| a.is_inheritance_edge)
    }
}
