use std::sync::Arc;

use beans_core::{
    bean_class, merged_definition, resolve, DocumentSet, MemoryParser, ProjectRegistry,
    ResolveContext,
};
use beans_model::{DocumentId, ParsedDocument, RawAlias, RawBean, RawGroup, RawValue, SourceLocation};
use pretty_assertions::assert_eq;

use super::support::{collaborators, document, parsed};

fn context(parser: &Arc<MemoryParser>, resource: &str) -> ResolveContext {
    ResolveContext::Document(document(&collaborators(parser, &[]), resource))
}

#[test]
fn child_scope_overrides_and_class_is_inherited() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document(
        "app.xml",
        parsed(vec![
            RawBean {
                scope: Some("singleton".to_string()),
                ..RawBean::with_id("parent").class("X")
            },
            RawBean {
                scope: Some("prototype".to_string()),
                ..RawBean::with_id("child").parent("parent")
            },
        ]),
    );
    let ctx = context(&parser, "app.xml");

    let child = resolve("child", &ctx).unwrap();
    let merged = merged_definition(&child.bean, &ctx);
    assert_eq!(merged.class_name.as_deref(), Some("X"));
    assert_eq!(merged.scope.as_deref(), Some("prototype"));
    assert_eq!(merged.name, "child");
    assert_eq!(merged.parent_name, None);
    assert_eq!(bean_class(&child.bean, &ctx).as_deref(), Some("X"));
}

#[test]
fn merging_a_merged_definition_changes_nothing() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document(
        "app.xml",
        parsed(vec![
            RawBean::with_id("root")
                .class("Root")
                .property("a", RawValue::Literal("1".to_string()))
                .property("b", RawValue::Literal("2".to_string())),
            RawBean::with_id("middle")
                .parent("root")
                .property("b", RawValue::Literal("middle".to_string())),
            RawBean::with_id("leaf")
                .parent("middle")
                .property("c", RawValue::Reference("root".to_string())),
        ]),
    );
    let ctx = context(&parser, "app.xml");

    let leaf = resolve("leaf", &ctx).unwrap();
    let once = merged_definition(&leaf.bean, &ctx);
    let twice = merged_definition(&once, &ctx);
    assert_eq!(once, twice);

    let properties: Vec<_> = once.properties.keys().cloned().collect();
    assert_eq!(properties, vec!["a", "b", "c"]);
    assert_eq!(
        once.properties["b"],
        beans_model::Value::Literal("middle".to_string())
    );
}

#[test]
fn parent_cycles_terminate_and_merge_idempotently() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document(
        "app.xml",
        parsed(vec![
            RawBean::with_id("a").parent("b"),
            RawBean::with_id("b").parent("a").class("B"),
            RawBean::with_id("self").parent("self").class("S"),
        ]),
    );
    let ctx = context(&parser, "app.xml");

    let a = resolve("a", &ctx).unwrap();
    let merged = merged_definition(&a.bean, &ctx);
    assert_eq!(merged.name, "a");
    assert_eq!(merged.class_name.as_deref(), Some("B"));
    assert_eq!(merged_definition(&merged, &ctx), merged);

    let own = resolve("self", &ctx).unwrap();
    assert_eq!(merged_definition(&own.bean, &ctx), *own.bean);
}

#[test]
fn aliases_resolve_to_their_target() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document(
        "app.xml",
        ParsedDocument {
            beans: vec![RawBean::with_id("b").class("B")],
            aliases: vec![RawAlias {
                name: "a".to_string(),
                target: "b".to_string(),
                location: SourceLocation::line("app.xml", 2),
            }],
            ..ParsedDocument::default()
        },
    );
    let ctx = context(&parser, "app.xml");

    assert_eq!(resolve("a", &ctx), resolve("b", &ctx));
    assert!(resolve("a", &ctx).is_some());
    assert_eq!(resolve("missing", &ctx), None);
}

#[test]
fn groups_are_searched_and_filtered_by_profile_in_sets() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document(
        "app.xml",
        ParsedDocument {
            groups: vec![RawGroup {
                profiles: vec!["dev".to_string()],
                groups: vec![RawGroup {
                    beans: vec![RawBean::with_id("nested").class("Nested")],
                    ..RawGroup::default()
                }],
                beans: vec![RawBean::with_id("devOnly").class("Dev")],
                ..RawGroup::default()
            }],
            ..ParsedDocument::default()
        },
    );
    let registry = ProjectRegistry::new(collaborators(&parser, &[]));
    registry.add_document("app.xml");
    registry
        .add_document_set(DocumentSet::new("dev").with_document("app.xml").with_profile("dev"))
        .unwrap();
    registry
        .add_document_set(DocumentSet::new("prod").with_document("app.xml").with_profile("prod"))
        .unwrap();
    registry
        .add_document_set(DocumentSet::new("plain").with_document("app.xml"))
        .unwrap();

    let document = registry.document_context("app.xml").unwrap();
    assert!(resolve("nested", &document).is_some());
    assert!(resolve("devOnly", &document).is_some());

    let dev = registry.set_context("dev").unwrap();
    assert!(resolve("nested", &dev).is_some());
    assert_eq!(dev.beans().len(), 2);

    let prod = registry.set_context("prod").unwrap();
    assert!(resolve("nested", &prod).is_none());
    assert!(prod.beans().is_empty());

    let plain = registry.set_context("plain").unwrap();
    assert!(resolve("devOnly", &plain).is_none());
}

#[test]
fn overriding_decides_which_document_wins_in_a_set() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document("one.xml", parsed(vec![RawBean::with_id("svc").class("One")]));
    parser.set_document("two.xml", parsed(vec![RawBean::with_id("svc").class("Two")]));
    let registry = ProjectRegistry::new(collaborators(&parser, &[]));
    registry.add_document("one.xml");
    registry.add_document("two.xml");
    registry
        .add_document_set(
            DocumentSet::new("overriding")
                .with_document("one.xml")
                .with_document("two.xml"),
        )
        .unwrap();
    registry
        .add_document_set(
            DocumentSet::new("strict")
                .with_document("one.xml")
                .with_document("two.xml")
                .with_overriding(false),
        )
        .unwrap();

    let overriding = registry.set_context("overriding").unwrap();
    let strict = registry.set_context("strict").unwrap();
    assert_eq!(
        resolve("svc", &overriding).unwrap().document,
        DocumentId::new("two.xml")
    );
    assert_eq!(
        resolve("svc", &strict).unwrap().document,
        DocumentId::new("one.xml")
    );
}
