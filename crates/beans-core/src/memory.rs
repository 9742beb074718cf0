//! In-memory collaborators for tests and embedders without a real parser.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use beans_model::ParsedDocument;
use beans_scheduler::CancellationToken;
use globset::GlobBuilder;
use parking_lot::Mutex;

use crate::parser::{DocumentParser, ResourceResolver};
use crate::{ParseAbort, ResourceError};

const SLEEP_SLICE: Duration = Duration::from_millis(2);

#[derive(Default)]
struct ParserState {
    documents: BTreeMap<String, Result<ParsedDocument, ParseAbort>>,
    delays: BTreeMap<String, Duration>,
    stamps: BTreeMap<String, u64>,
}

/// Serves canned parse results by resource name.
#[derive(Default)]
pub struct MemoryParser {
    state: Mutex<ParserState>,
    calls: AtomicUsize,
}

impl MemoryParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result for `resource` and bumps its modification stamp.
    pub fn set_document(&self, resource: impl Into<String>, document: ParsedDocument) {
        self.set_result(resource, Ok(document));
    }

    pub fn set_result(&self, resource: impl Into<String>, result: Result<ParsedDocument, ParseAbort>) {
        let resource = resource.into();
        let mut state = self.state.lock();
        *state.stamps.entry(resource.clone()).or_insert(0) += 1;
        state.documents.insert(resource, result);
    }

    pub fn remove_document(&self, resource: &str) {
        let mut state = self.state.lock();
        state.documents.remove(resource);
        state.stamps.remove(resource);
    }

    /// Makes parsing `resource` take at least `delay`. The wait ends early on cancellation.
    pub fn set_delay(&self, resource: impl Into<String>, delay: Duration) {
        self.state.lock().delays.insert(resource.into(), delay);
    }

    /// Makes parsing `resource` block until cancelled.
    pub fn hang(&self, resource: impl Into<String>) {
        self.set_delay(resource, Duration::MAX);
    }

    /// Number of `parse` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DocumentParser for MemoryParser {
    fn parse(&self, resource: &str, cancel: &CancellationToken) -> Result<ParsedDocument, ParseAbort> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().delays.get(resource).copied();
        if let Some(delay) = delay {
            let started = Instant::now();
            while started.elapsed() < delay {
                if cancel.is_cancelled() {
                    return Err(ParseAbort::fatal("parsing cancelled", None));
                }
                thread::sleep(SLEEP_SLICE);
            }
        }

        self.state
            .lock()
            .documents
            .get(resource)
            .cloned()
            .unwrap_or_else(|| {
                Err(ParseAbort::NotFound {
                    resource: resource.to_string(),
                })
            })
    }

    fn modification_stamp(&self, resource: &str) -> Option<u64> {
        self.state.lock().stamps.get(resource).copied()
    }
}

/// Resolves import locators against a fixed list of resource names.
///
/// Locators containing `*` are matched as ant-style globs; others name one resource, either
/// verbatim or relative to the importing resource's directory.
#[derive(Debug, Default)]
pub struct MemoryResourceResolver {
    resources: Mutex<Vec<String>>,
}

impl MemoryResourceResolver {
    pub fn new<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resources: Mutex::new(resources.into_iter().map(Into::into).collect()),
        }
    }

    pub fn add_resource(&self, resource: impl Into<String>) {
        let resource = resource.into();
        let mut resources = self.resources.lock();
        if !resources.contains(&resource) {
            resources.push(resource);
        }
    }
}

impl ResourceResolver for MemoryResourceResolver {
    fn resolve(&self, pattern: &str, relative_to: &str) -> Result<Vec<String>, ResourceError> {
        let pattern = pattern.trim();
        let relative = match relative_to.rfind('/') {
            Some(slash) => format!("{}/{}", &relative_to[..slash], pattern),
            None => pattern.to_string(),
        };
        let resources = self.resources.lock();

        if pattern.contains('*') {
            let matcher = |glob: &str| {
                GlobBuilder::new(glob)
                    .literal_separator(true)
                    .build()
                    .map(|glob| glob.compile_matcher())
                    .map_err(|err| ResourceError {
                        pattern: pattern.to_string(),
                        message: err.to_string(),
                    })
            };
            let absolute = matcher(pattern)?;
            let relative = matcher(&relative)?;
            return Ok(resources
                .iter()
                .filter(|resource| absolute.is_match(resource.as_str()) || relative.is_match(resource.as_str()))
                .cloned()
                .collect());
        }

        if resources.iter().any(|resource| resource == pattern) {
            return Ok(vec![pattern.to_string()]);
        }
        if resources.iter().any(|resource| *resource == relative) {
            return Ok(vec![relative]);
        }
        Ok(vec![pattern.to_string()])
    }
}
