use std::sync::Arc;

use beans_config::BeansConfig;
use beans_core::{
    resolve, BeansError, Collaborators, DocumentKind, DocumentSet, LoadSettings, MemoryParser,
    MemoryResourceResolver, ProjectRegistry,
};
use beans_model::{DocumentId, ParsedDocument, RawBean};
use pretty_assertions::assert_eq;

use super::support::{collaborators, import, parsed};

fn names(registry: &ProjectRegistry) -> Vec<String> {
    registry
        .documents()
        .iter()
        .map(|node| node.id().to_string())
        .collect()
}

fn auto(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[test]
fn manual_documents_shadow_and_absorb_auto_detected_ones() {
    let parser = Arc::new(MemoryParser::new());
    let registry = ProjectRegistry::new(collaborators(&parser, &[]));

    registry.set_auto_detected("scanner", &auto(&["a.xml", "b.xml"]), None);
    assert_eq!(names(&registry), vec!["a.xml", "b.xml"]);
    assert_eq!(
        registry.resolve("a.xml").unwrap().kind(),
        &DocumentKind::AutoDetected {
            locator: "scanner".to_string()
        }
    );

    let manual = registry.add_document("a.xml");
    assert_eq!(manual.kind(), &DocumentKind::Manual);
    assert!(Arc::ptr_eq(&registry.add_document("a.xml"), &manual));
    assert_eq!(names(&registry), vec!["a.xml", "b.xml"]);

    registry.set_auto_detected("scanner", &auto(&["a.xml", "c.xml"]), None);
    assert_eq!(names(&registry), vec!["a.xml", "c.xml"]);
    assert_eq!(registry.resolve("a.xml").unwrap().kind(), &DocumentKind::Manual);

    registry.remove_auto_detected("scanner");
    assert_eq!(names(&registry), vec!["a.xml"]);
    assert!(registry.resolve("c.xml").is_none());
}

#[test]
fn auto_detection_keeps_existing_nodes() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document("a.xml", ParsedDocument::default());
    let registry = ProjectRegistry::new(collaborators(&parser, &[]));

    registry.set_auto_detected("scanner", &auto(&["a.xml"]), None);
    let before = registry.resolve("a.xml").unwrap();
    before.snapshot();
    registry.set_auto_detected("scanner", &auto(&["a.xml", "b.xml"]), None);
    let after = registry.resolve("a.xml").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(after.is_populated());
}

#[test]
fn locators_contribute_document_sets() {
    let parser = Arc::new(MemoryParser::new());
    let registry = ProjectRegistry::new(collaborators(&parser, &[]));

    registry.set_auto_detected(
        "web",
        &auto(&["web.xml"]),
        Some(DocumentSet::new("web").with_document("web.xml")),
    );
    assert_eq!(registry.document_sets().len(), 1);
    registry.remove_auto_detected("web");
    assert!(registry.document_sets().is_empty());
}

#[test]
fn document_sets_are_managed_by_name() {
    let parser = Arc::new(MemoryParser::new());
    let registry = ProjectRegistry::new(collaborators(&parser, &[]));
    registry.add_document("a.xml");
    registry.add_document("b.xml");

    let set = DocumentSet::new("main")
        .with_document("a.xml")
        .with_document("b.xml");
    registry.add_document_set(set.clone()).unwrap();
    assert_eq!(
        registry.add_document_set(DocumentSet::new("main")),
        Err(BeansError::DuplicateDocumentSet("main".to_string()))
    );
    assert_eq!(registry.document_set("main"), Some(set.clone()));
    assert!(matches!(
        registry.set_context("other"),
        Err(BeansError::UnknownDocumentSet(_))
    ));
    assert!(matches!(
        registry.document_context("missing.xml"),
        Err(BeansError::UnknownDocument(_))
    ));

    assert!(registry.remove_document("a.xml"));
    assert!(!registry.remove_document("a.xml"));
    assert_eq!(
        registry.document_set("main").unwrap().documents,
        vec![DocumentId::new("b.xml")]
    );
    assert_eq!(registry.set_generation("main"), Some(1));

    assert_eq!(
        registry.remove_document_set("main").map(|set| set.name),
        Ok("main".to_string())
    );
    assert_eq!(
        registry.remove_document_set("main"),
        Err(BeansError::UnknownDocumentSet("main".to_string()))
    );
}

#[test]
fn resets_bump_the_generation_of_containing_sets() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document("a.xml", ParsedDocument::default());
    let registry = ProjectRegistry::new(collaborators(&parser, &[]));
    let node = registry.add_document("a.xml");
    registry.add_document("b.xml");
    registry
        .add_document_set(DocumentSet::new("with-a").with_document("a.xml"))
        .unwrap();
    registry
        .add_document_set(DocumentSet::new("without-a").with_document("b.xml"))
        .unwrap();

    node.snapshot();
    node.reload();
    assert_eq!(registry.set_generation("with-a"), Some(1));
    assert_eq!(registry.set_generation("without-a"), Some(0));

    node.snapshot();
    registry.reset();
    assert!(!node.is_populated());
    assert_eq!(registry.set_generation("with-a"), Some(2));
    assert_eq!(registry.set_generation("without-a"), Some(1));
    assert_eq!(registry.set_generation("unknown"), None);
}

#[test]
fn lookups_fall_back_to_containing_sets() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document("child.xml", parsed(vec![RawBean::with_id("child").parent("base")]));
    parser.set_document("base.xml", parsed(vec![RawBean::with_id("base").class("Base")]));
    let registry = ProjectRegistry::new(collaborators(&parser, &[]));
    registry.add_document("child.xml");
    registry.add_document("base.xml");

    assert_eq!(registry.resolve_with_sets("base", "child.xml"), Ok(None));
    let child = resolve("child", &registry.document_context("child.xml").unwrap()).unwrap();
    assert_eq!(registry.bean_class(&child), None);

    registry
        .add_document_set(
            DocumentSet::new("app")
                .with_document("child.xml")
                .with_document("base.xml"),
        )
        .unwrap();
    let base = registry.resolve_with_sets("base", "child.xml").unwrap().unwrap();
    assert_eq!(base.document, DocumentId::new("base.xml"));
    assert_eq!(registry.bean_class(&child).as_deref(), Some("Base"));
    assert_eq!(
        registry.resolve_with_sets("base", "missing.xml"),
        Err(BeansError::UnknownDocument("missing.xml".to_string()))
    );
}

#[test]
fn documents_are_found_by_resource_and_classes_are_indexed() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document(
        "main.xml",
        ParsedDocument {
            beans: vec![RawBean::with_id("app").class("App")],
            imports: vec![import("common.xml", "main.xml", 1)],
            ..ParsedDocument::default()
        },
    );
    parser.set_document("common.xml", parsed(vec![RawBean::with_id("shared").class("Shared")]));
    let registry = ProjectRegistry::new(collaborators(&parser, &["common.xml"]));
    registry.add_document("main.xml");
    registry.add_document("common.xml");

    let direct: Vec<_> = registry
        .documents_for_resource("common.xml", false)
        .iter()
        .map(|node| node.id().to_string())
        .collect();
    assert_eq!(direct, vec!["common.xml"]);
    let with_importers: Vec<_> = registry
        .documents_for_resource("common.xml", true)
        .iter()
        .map(|node| node.id().to_string())
        .collect();
    assert_eq!(with_importers, vec!["main.xml", "common.xml"]);

    assert!(registry.is_bean_class("Shared"));
    assert!(!registry.is_bean_class("Missing"));
    assert_eq!(
        registry.bean_classes().into_iter().collect::<Vec<_>>(),
        vec!["App", "Shared"]
    );

    let shared = resolve("shared", &registry.document_context("main.xml").unwrap()).unwrap();
    assert_eq!(registry.bean_class(&shared).as_deref(), Some("Shared"));
}

#[test]
fn settings_come_from_configuration() {
    let config = BeansConfig::load_from_str_with_diagnostics(
        "[loading]\ntimeout_ms = 250\nimports_enabled = false\n",
    )
    .unwrap()
    .0;
    let settings = LoadSettings::from(&config);
    assert_eq!(settings.timeout.as_millis(), 250);
    assert!(!settings.imports_enabled);

    let parser = Arc::new(MemoryParser::new());
    let registry = ProjectRegistry::new(
        Collaborators::new(parser, Arc::new(MemoryResourceResolver::default()))
            .with_settings(settings.clone()),
    );
    assert_eq!(*registry.collaborators().settings, settings);
}
