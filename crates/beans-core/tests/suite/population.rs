use std::sync::{Arc, Barrier, Weak};
use std::thread;
use std::time::{Duration, Instant};

use beans_core::{
    DocumentEvent, DocumentListener, DocumentNode, Element, MemoryParser, ParseAbort,
    RecordingListener,
};
use beans_model::{DocumentId, ParsedDocument, Problem, RawAlias, RawBean, Severity, SourceLocation};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::support::{collaborators, document, import, parsed, with_timeout};

#[test]
fn concurrent_callers_share_one_population_run() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document("app.xml", parsed(vec![RawBean::with_id("a").class("A")]));
    parser.set_delay("app.xml", Duration::from_millis(50));
    let node = document(&collaborators(&parser, &[]), "app.xml");

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let node = Arc::clone(&node);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                node.snapshot()
            })
        })
        .collect();
    let snapshots: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(parser.calls(), 1);
    assert!(snapshots
        .iter()
        .all(|snapshot| Arc::ptr_eq(snapshot, &snapshots[0])));
    assert!(snapshots[0].beans().contains_key("a"));
}

#[test]
fn hung_parser_times_out_with_one_error() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document("slow.xml", parsed(vec![RawBean::with_id("a").class("A")]));
    parser.hang("slow.xml");
    let timeout = Duration::from_millis(100);
    let node = document(&with_timeout(collaborators(&parser, &[]), timeout), "slow.xml");

    let started = Instant::now();
    let problems = node.problems();
    assert!(started.elapsed() < timeout + Duration::from_secs(2));

    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].severity, Severity::Error);
    assert_eq!(problems[0].message, "Load exceeded timeout of 100 ms");
    assert!(node.is_populated());
    assert!(node.beans().is_empty());
}

#[test]
fn missing_resource_is_reported_and_node_is_populated() {
    let parser = Arc::new(MemoryParser::new());
    let node = document(&collaborators(&parser, &[]), "missing.xml");

    assert_eq!(
        node.problems(),
        vec![Problem::error(
            "Beans config file 'missing.xml' not accessible",
            "missing.xml",
            None
        )]
    );
    assert!(node.is_populated());
}

#[test]
fn fatal_parse_abort_keeps_partial_content() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_result(
        "broken.xml",
        Err(ParseAbort::Fatal {
            message: "unexpected end of file".to_string(),
            line: Some(9),
            partial: ParsedDocument {
                beans: vec![RawBean::with_id("early").class("Early")],
                imports: vec![import("other.xml", "broken.xml", 2)],
                ..ParsedDocument::default()
            },
        }),
    );
    parser.set_document("other.xml", ParsedDocument::default());
    let node = document(&collaborators(&parser, &["other.xml"]), "broken.xml");

    assert!(node.has_bean("early"));
    assert_eq!(
        node.problems(),
        vec![Problem::error("unexpected end of file", "broken.xml", Some(9))]
    );
    let imports = node.imports();
    assert_eq!(imports.len(), 1);
    assert!(imports[0].documents.is_empty());
}

#[test]
fn reload_resets_and_repopulates_lazily() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document("app.xml", parsed(vec![RawBean::with_id("a").class("A")]));
    let node = document(&collaborators(&parser, &[]), "app.xml");
    let listener = Arc::new(RecordingListener::new());
    node.register_listener(listener.clone());
    let id = DocumentId::new("app.xml");

    assert_eq!(node.beans().len(), 1);
    assert_eq!(
        listener.take(),
        vec![
            DocumentEvent::ReadStarted {
                document: id.clone()
            },
            DocumentEvent::ReadFinished {
                document: id.clone()
            },
        ]
    );
    assert!(!node.is_stale());

    parser.set_document(
        "app.xml",
        parsed(vec![
            RawBean::with_id("a").class("A"),
            RawBean::with_id("b").class("B"),
        ]),
    );
    assert!(node.is_stale());

    node.reload();
    assert!(!node.is_populated());
    assert_eq!(
        listener.take(),
        vec![DocumentEvent::Reset {
            document: id.clone()
        }]
    );
    assert_eq!(parser.calls(), 1);

    assert_eq!(node.beans().len(), 2);
    assert_eq!(parser.calls(), 2);
    assert!(!node.is_stale());
    assert_eq!(node.modification_stamp(), Some(2));
}

#[test]
fn unregistered_and_dropped_listeners_stop_receiving_events() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document("app.xml", ParsedDocument::default());
    let node = document(&collaborators(&parser, &[]), "app.xml");

    let listener = Arc::new(RecordingListener::new());
    let id = node.register_listener(listener.clone());
    assert!(node.unregister_listener(id));
    assert!(!node.unregister_listener(id));

    let rx = node.subscribe();
    node.snapshot();
    assert!(listener.events().is_empty());
    assert_eq!(rx.try_iter().count(), 2);

    drop(rx);
    node.reload();
    node.snapshot();
}

/// Reads the node's beans from inside event delivery.
struct ReadsBack {
    node: Weak<DocumentNode>,
    seen: Mutex<Vec<(&'static str, usize)>>,
}

impl DocumentListener for ReadsBack {
    fn on_event(&self, event: &DocumentEvent) {
        let kind = match event {
            DocumentEvent::Reset { .. } => "reset",
            DocumentEvent::ReadFinished { .. } => "read-finished",
            _ => return,
        };
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let count = node.beans().len();
        self.seen.lock().push((kind, count));
    }
}

#[test]
fn listeners_can_read_the_node_they_observe() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document("app.xml", parsed(vec![RawBean::with_id("a").class("A")]));
    let node = document(&collaborators(&parser, &[]), "app.xml");
    let listener = Arc::new(ReadsBack {
        node: Arc::downgrade(&node),
        seen: Mutex::new(Vec::new()),
    });
    node.register_listener(listener.clone());

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let worker = {
        let node = Arc::clone(&node);
        let parser = Arc::clone(&parser);
        thread::spawn(move || {
            assert_eq!(node.beans().len(), 1);
            parser.set_document(
                "app.xml",
                parsed(vec![
                    RawBean::with_id("a").class("A"),
                    RawBean::with_id("b").class("B"),
                ]),
            );
            node.reload();
            done_tx.send(()).unwrap();
        })
    };
    done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("listener re-entry deadlocked");
    worker.join().unwrap();

    assert_eq!(parser.calls(), 2);
    assert!(node.is_populated());
    assert_eq!(
        listener.seen.lock().clone(),
        vec![("read-finished", 1), ("read-finished", 2), ("reset", 2)]
    );
}

#[test]
fn elements_are_sorted_by_start_line() {
    let parser = Arc::new(MemoryParser::new());
    parser.set_document(
        "app.xml",
        ParsedDocument {
            beans: vec![
                RawBean::with_id("late").class("Late").at("app.xml", 10),
                RawBean::with_id("early").class("Early").at("app.xml", 3),
            ],
            aliases: vec![RawAlias {
                name: "alias".to_string(),
                target: "late".to_string(),
                location: SourceLocation::line("app.xml", 5),
            }],
            imports: vec![import("other.xml", "app.xml", 1)],
            ..ParsedDocument::default()
        },
    );
    parser.set_document("other.xml", ParsedDocument::default());
    let node = document(&collaborators(&parser, &["other.xml"]), "app.xml");

    let lines: Vec<u32> = node.elements().iter().map(Element::start_line).collect();
    assert_eq!(lines, vec![1, 3, 5, 10]);
    assert!(matches!(node.elements()[0], Element::Import(_)));
    assert!(matches!(node.elements()[2], Element::Alias(_)));
}
