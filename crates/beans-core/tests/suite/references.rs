use std::sync::Arc;

use beans_config::DEFAULT_PROXY_FACTORY_CLASS;
use beans_core::{
    resolve, transitive_references, BeansError, DocumentSet, ElementRef, MemoryParser,
    ProjectRegistry, ResolveContext,
};
use beans_model::{
    BeanId, ConnectionKind, ContextId, ElementId, MethodOverride, MethodOverrideKind, RawBean,
    RawValue,
};
use pretty_assertions::assert_eq;

use super::support::{collaborators, document, parsed};

fn context(parser: &Arc<MemoryParser>) -> ResolveContext {
    ResolveContext::Document(document(&collaborators(parser, &[]), "app.xml"))
}

fn bean_ref(name: &str, ctx: &ResolveContext) -> ElementRef {
    ElementRef::Bean(resolve(name, ctx).unwrap())
}

fn id(name: &str) -> BeanId {
    BeanId::new("app.xml", name)
}

fn edges(element: &ElementRef, ctx: &ResolveContext, recursive: bool) -> Vec<(ConnectionKind, String)> {
    transitive_references(element, ctx, recursive)
        .unwrap()
        .into_iter()
        .map(|connection| (connection.kind, connection.target.name))
        .collect()
}

#[test]
fn list_property_yields_one_edge_per_reference() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document(
        "app.xml",
        parsed(vec![
            RawBean::with_id("a").class("A").property(
                "deps",
                RawValue::List(vec![
                    RawValue::Reference("b".to_string()),
                    RawValue::Reference("c".to_string()),
                    RawValue::Literal("plain".to_string()),
                ]),
            ),
            RawBean::with_id("b").class("B"),
            RawBean::with_id("c").class("C"),
        ]),
    );
    let ctx = context(&parser);

    let connections = transitive_references(&bean_ref("a", &ctx), &ctx, false).unwrap();
    assert_eq!(connections.len(), 2);
    for connection in &connections {
        assert_eq!(connection.kind, ConnectionKind::Standard);
        assert_eq!(
            connection.source,
            ElementId::Property {
                bean: id("a"),
                name: "deps".to_string()
            }
        );
        assert_eq!(connection.context, ContextId::Document("app.xml".into()));
        assert!(!connection.is_inner);
    }
}

#[test]
fn every_edge_kind_is_discovered() {
    let parser = Arc::new(MemoryParser::new());
    let mut worker = RawBean::with_id("worker").parent("base");
    worker.factory_bean = Some("factory".to_string());
    worker.factory_method = Some("create".to_string());
    worker.depends_on = vec!["setup".to_string()];
    worker.method_overrides = vec![MethodOverride {
        kind: MethodOverrideKind::Lookup,
        method_name: "next".to_string(),
        target: "prototype".to_string(),
    }];
    let worker = worker.property(
        "lookup",
        RawValue::Map(vec![(
            RawValue::Reference("key".to_string()),
            RawValue::NameReference("value".to_string()),
        )]),
    );
    let mut names = vec![
        "base", "factory", "setup", "prototype", "key", "value", "audit", "tracing",
    ]
    .into_iter()
    .map(|name| RawBean::with_id(name).class("Plain"))
    .collect::<Vec<_>>();
    names.push(worker);
    names.push(
        RawBean::with_id("proxy")
            .class(DEFAULT_PROXY_FACTORY_CLASS)
            .property("interceptorNames", RawValue::Literal("audit, tracing".to_string())),
    );
    parser.set_document("app.xml", parsed(names));
    let ctx = context(&parser);

    assert_eq!(
        edges(&bean_ref("worker", &ctx), &ctx, false),
        vec![
            (ConnectionKind::Parent, "base".to_string()),
            (ConnectionKind::Factory, "factory".to_string()),
            (ConnectionKind::DependsOn, "setup".to_string()),
            (ConnectionKind::MethodOverride, "prototype".to_string()),
            (ConnectionKind::Standard, "key".to_string()),
            (ConnectionKind::Standard, "value".to_string()),
        ]
    );
    assert_eq!(
        edges(&bean_ref("proxy", &ctx), &ctx, false),
        vec![
            (ConnectionKind::Interceptor, "audit".to_string()),
            (ConnectionKind::Interceptor, "tracing".to_string()),
        ]
    );
}

#[test]
fn interceptor_names_are_plain_values_on_other_classes() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document(
        "app.xml",
        parsed(vec![
            RawBean::with_id("audit").class("Audit"),
            RawBean::with_id("holder")
                .class("NotAProxy")
                .property("interceptorNames", RawValue::Literal("audit".to_string())),
        ]),
    );
    let ctx = context(&parser);
    assert!(edges(&bean_ref("holder", &ctx), &ctx, false).is_empty());
}

#[test]
fn recursion_follows_targets_and_terminates_on_cycles() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document(
        "app.xml",
        parsed(vec![
            RawBean::with_id("a")
                .class("A")
                .property("next", RawValue::Reference("b".to_string())),
            RawBean::with_id("b")
                .class("B")
                .property("next", RawValue::Reference("c".to_string())),
            RawBean::with_id("c")
                .class("C")
                .property("back", RawValue::Reference("a".to_string())),
        ]),
    );
    let ctx = context(&parser);
    let start = bean_ref("a", &ctx);

    assert_eq!(
        edges(&start, &ctx, false),
        vec![(ConnectionKind::Standard, "b".to_string())]
    );
    assert_eq!(
        edges(&start, &ctx, true),
        vec![
            (ConnectionKind::Standard, "b".to_string()),
            (ConnectionKind::Standard, "c".to_string()),
            (ConnectionKind::Standard, "a".to_string()),
        ]
    );
}

#[test]
fn parent_cycles_yield_each_edge_once() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document(
        "app.xml",
        parsed(vec![
            RawBean::with_id("a").parent("b"),
            RawBean::with_id("b").parent("a"),
        ]),
    );
    let ctx = context(&parser);

    let connections = transitive_references(&bean_ref("a", &ctx), &ctx, true).unwrap();
    let pairs: Vec<_> = connections
        .iter()
        .map(|connection| {
            (
                connection.source.bean().map(|bean| bean.name.clone()),
                connection.target.name.clone(),
            )
        })
        .collect();
    assert_eq!(
        pairs,
        vec![
            (Some("a".to_string()), "b".to_string()),
            (Some("b".to_string()), "a".to_string()),
        ]
    );
}

#[test]
fn inner_bean_references_are_attributed_to_the_outer_bean() {
    let parser = Arc::new(MemoryParser::new());
    let inner = RawBean::default()
        .class("Inner")
        .property("dep", RawValue::Reference("shared".to_string()))
        .property("owner", RawValue::Reference("outer".to_string()));
    parser.set_document(
        "app.xml",
        parsed(vec![
            RawBean::with_id("outer")
                .class("Outer")
                .property("helper", RawValue::Inner(Box::new(inner))),
            RawBean::with_id("shared").class("Shared"),
        ]),
    );
    let ctx = context(&parser);

    let connections: Vec<_> = transitive_references(&bean_ref("outer", &ctx), &ctx, false)
        .unwrap()
        .into_iter()
        .collect();
    let holder = ElementId::Property {
        bean: id("outer"),
        name: "helper".to_string(),
    };
    assert_eq!(connections.len(), 2);
    assert_eq!(connections[0].kind, ConnectionKind::Inner);
    assert_eq!(connections[0].source, holder);
    assert_eq!(connections[0].target, id("Inner#1"));
    assert!(!connections[0].is_inner);

    assert_eq!(connections[1].kind, ConnectionKind::Standard);
    assert_eq!(connections[1].source, ElementId::Bean(id("outer")));
    assert_eq!(connections[1].target, id("shared"));
    assert!(connections[1].is_inner);
}

#[test]
fn single_properties_arguments_and_groups_can_be_walked() {
    let parser = Arc::new(MemoryParser::new());
    let mut a = RawBean::with_id("a")
        .class("A")
        .property("first", RawValue::Reference("b".to_string()));
    a.constructor_args
        .push(beans_model::RawConstructorArg::new(RawValue::Reference("c".to_string())));
    parser.set_document(
        "app.xml",
        beans_model::ParsedDocument {
            beans: vec![
                a,
                RawBean::with_id("b").class("B"),
                RawBean::with_id("c").class("C"),
            ],
            groups: vec![beans_model::RawGroup {
                beans: vec![RawBean::with_id("grouped")
                    .class("G")
                    .property("to", RawValue::Reference("a".to_string()))],
                ..beans_model::RawGroup::default()
            }],
            ..beans_model::ParsedDocument::default()
        },
    );
    let ctx = context(&parser);
    let a = resolve("a", &ctx).unwrap();

    let property = ElementRef::Property {
        bean: a.clone(),
        name: "first".to_string(),
    };
    assert_eq!(
        edges(&property, &ctx, false),
        vec![(ConnectionKind::Standard, "b".to_string())]
    );

    let argument = ElementRef::ConstructorArg {
        bean: a.clone(),
        index: 0,
    };
    assert_eq!(
        edges(&argument, &ctx, false),
        vec![(ConnectionKind::Standard, "c".to_string())]
    );

    let missing = ElementRef::Property {
        bean: a.clone(),
        name: "nope".to_string(),
    };
    assert_eq!(
        transitive_references(&missing, &ctx, false).unwrap_err(),
        BeansError::UnknownElement {
            bean: "a".to_string(),
            element: "property 'nope'".to_string()
        }
    );
    assert!(matches!(
        transitive_references(&ElementRef::ConstructorArg { bean: a, index: 3 }, &ctx, false),
        Err(BeansError::UnknownElement { .. })
    ));

    let ResolveContext::Document(node) = &ctx else {
        unreachable!("document context");
    };
    let group = ElementRef::Group {
        document: node.id().clone(),
        group: node.groups()[0].clone(),
    };
    assert_eq!(
        edges(&group, &ctx, true),
        vec![
            (ConnectionKind::Standard, "a".to_string()),
            (ConnectionKind::Standard, "c".to_string()),
            (ConnectionKind::Standard, "b".to_string()),
        ]
    );
}

#[test]
fn set_contexts_tag_connections_with_the_set() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document(
        "one.xml",
        parsed(vec![RawBean::with_id("a")
            .class("A")
            .property("dep", RawValue::Reference("b".to_string()))]),
    );
    parser.set_document("two.xml", parsed(vec![RawBean::with_id("b").class("B")]));
    let registry = ProjectRegistry::new(collaborators(&parser, &[]));
    registry.add_document("one.xml");
    registry.add_document("two.xml");
    registry
        .add_document_set(
            DocumentSet::new("all")
                .with_document("one.xml")
                .with_document("two.xml"),
        )
        .unwrap();
    let ctx = registry.set_context("all").unwrap();

    let connections: Vec<_> = transitive_references(&bean_ref("a", &ctx), &ctx, false)
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].target, BeanId::new("two.xml", "b"));
    assert_eq!(connections[0].context, ContextId::Set("all".to_string()));
}
