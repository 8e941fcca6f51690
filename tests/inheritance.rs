//! This module is an integration test that tests how the library lays out
//! contracts spread over several files and inheritance chains, and how it
//! reports contracts it cannot lay out.
#![cfg(test)]

use storage_layout_builder as slb;
use storage_layout_builder::{
    error::{resolution, Error},
    model::{Attribute, AttributeKind, ClassEntry, ClassStereotype, ClassUniverse, Import},
};

fn uint(name: &str) -> Attribute {
    Attribute::new(name, "uint256", AttributeKind::Elementary)
}

/// `Token is Pausable, Ownable` where both parents inherit `Context`, each
/// declared in its own file.
///
/// `Token` imports its parents by name only, so the `Pause` struct declared in
/// `Pausable.sol` is visible to it through inheritance alone.
fn token_universe() -> ClassUniverse {
    ClassUniverse::new(vec![
        ClassEntry::new(0, "Context", ClassStereotype::Abstract, "/c/Context.sol")
            .with_attribute(uint("context")),
        ClassEntry::new(1, "Ownable", ClassStereotype::Abstract, "/c/Ownable.sol")
            .with_import(Import::wildcard("/c/Context.sol"))
            .inheriting("Context")
            .with_attribute(uint("owner")),
        ClassEntry::new(2, "Pausable", ClassStereotype::Abstract, "/c/Pausable.sol")
            .with_import(Import::wildcard("/c/Context.sol"))
            .inheriting("Context")
            .with_attribute(uint("paused"))
            .with_struct(3),
        ClassEntry::new(3, "Pause", ClassStereotype::Struct, "/c/Pausable.sol")
            .with_attribute(uint("since"))
            .with_attribute(uint("until")),
        ClassEntry::new(4, "Token", ClassStereotype::Contract, "/c/Token.sol")
            .with_import(Import::new("/c/Pausable.sol").with_name("Pausable"))
            .with_import(Import::new("/c/Ownable.sol").with_name("Ownable"))
            .inheriting("Pausable")
            .inheriting("Ownable")
            .with_attribute(uint("supply"))
            .with_attribute(Attribute::new("pause", "Pausable.Pause", AttributeKind::UserDefined))
            .with_attribute(Attribute::new("last", "Pause", AttributeKind::UserDefined)),
    ])
}

#[test]
fn lays_out_parents_before_children_and_ancestors_once() -> anyhow::Result<()> {
    let universe = token_universe();
    let layout = slb::new(&universe).build_layout("Token", None)?.into_layout();

    let names: Vec<_> = layout
        .root()
        .variables
        .iter()
        .map(|v| (v.name.as_deref().unwrap_or_default(), v.from_slot))
        .collect();
    assert_eq!(
        names,
        vec![
            ("context", 0),
            ("paused", 1),
            ("owner", 2),
            ("supply", 3),
            ("pause", 4),
            ("last", 6),
        ]
    );

    // Both the qualified and the inherited name find the struct in the parent
    for name in ["pause", "last"] {
        let section = layout.referenced_by(name).unwrap();
        assert_eq!(section.name, if name == "pause" { "Pausable.Pause" } else { "Pause" });
        assert_eq!(section.variables.len(), 2);
    }
    let last = layout.referenced_by("last").unwrap();
    assert_eq!(last.variables[0].from_slot, 6);
    assert_eq!(last.variables[1].from_slot, 7);

    Ok(())
}

#[test]
fn fails_on_inherited_types_once_the_parent_is_gone() {
    // Without `Pausable` as a parent, nothing in scope of `Token` declares `Pause`
    let classes = token_universe()
        .classes()
        .iter()
        .cloned()
        .map(|class| {
            if class.name == "Token" {
                ClassEntry::new(4, "Token", ClassStereotype::Contract, "/c/Token.sol")
                    .with_import(Import::new("/c/Pausable.sol").with_name("Pausable"))
                    .with_attribute(Attribute::new("last", "Pause", AttributeKind::UserDefined))
            } else {
                class
            }
        })
        .collect::<Vec<_>>();
    let universe = ClassUniverse::new(classes);

    let error = slb::new(&universe).build_layout("Token", None).unwrap_err();
    assert_eq!(
        error,
        Error::Resolution(resolution::Error::UnresolvedType {
            type_name:  "Pause".into(),
            class_name: "Token".into(),
        })
    );
}

#[test]
fn builds_identical_layouts_every_time() -> anyhow::Result<()> {
    let universe = token_universe();
    let first = slb::new(&universe).build_layout("Token", None)?.into_layout();
    let second = slb::new(&universe).build_layout("Token", None)?.into_layout();
    assert_eq!(first, second);

    Ok(())
}

#[test]
fn fails_on_unresolvable_types() {
    let universe = ClassUniverse::new(vec![ClassEntry::new(
        0,
        "Broken",
        ClassStereotype::Contract,
        "/c/Broken.sol",
    )
    .with_attribute(Attribute::new("info", "Missing", AttributeKind::UserDefined))]);

    let error = slb::new(&universe).build_layout("Broken", None).unwrap_err();
    assert_eq!(
        error,
        Error::Resolution(resolution::Error::UnresolvedType {
            type_name:  "Missing".into(),
            class_name: "Broken".into(),
        })
    );
    assert!(error.is_structural());
    assert_eq!(
        error.to_string(),
        "Failed to find user defined type \"Missing\" referenced from \"Broken\""
    );
}

#[test]
fn reports_the_file_of_missing_contracts() {
    let universe = token_universe();
    let error = slb::new(&universe).build_layout("Token", Some("Other.sol")).unwrap_err();
    assert_eq!(
        error.to_string(),
        "Failed to find contract with name \"Token\" in filename \"Other.sol\""
    );
}
