//! Turns raw parser records into beans and registers them for one document.

use std::collections::BTreeSet;
use std::sync::Arc;

use beans_model::{
    Alias, Bean, ConstructorArg, DocumentId, Group, ParsedDocument, Problem, RawBean, RawGroup,
    RawImport, RawValue, Severity, SourceLocation, Value,
};
use beans_scheduler::CancellationToken;
use indexmap::IndexMap;

const INNER_BEAN_BASE: &str = "(inner bean)";

/// Registration target shared by the parser output and extensions.
#[derive(Debug)]
pub(crate) struct DocumentBuilder {
    document: DocumentId,
    resource: String,
    pub(crate) beans: IndexMap<String, Arc<Bean>>,
    pub(crate) aliases: IndexMap<String, Alias>,
    pub(crate) groups: Vec<Arc<Group>>,
    pub(crate) imports: Vec<RawImport>,
    pub(crate) problems: Vec<Problem>,
    inner_counter: u32,
}

impl DocumentBuilder {
    pub(crate) fn new(document: DocumentId, resource: impl Into<String>) -> Self {
        Self {
            document,
            resource: resource.into(),
            beans: IndexMap::new(),
            aliases: IndexMap::new(),
            groups: Vec::new(),
            imports: Vec::new(),
            problems: Vec::new(),
            inner_counter: 0,
        }
    }

    pub(crate) fn document(&self) -> &DocumentId {
        &self.document
    }

    pub(crate) fn take(&mut self) -> DocumentBuilder {
        let empty = DocumentBuilder::new(self.document.clone(), self.resource.clone());
        std::mem::replace(self, empty)
    }

    /// Registers everything in `parsed`, stopping between records once `cancel` fires.
    pub(crate) fn register_document(&mut self, parsed: ParsedDocument, cancel: &CancellationToken) {
        self.problems.extend(parsed.problems);
        for raw in parsed.beans {
            if cancel.is_cancelled() {
                return;
            }
            self.register_raw_bean(raw);
        }
        for alias in parsed.aliases {
            self.register_alias(alias.name, alias.target, alias.location);
        }
        for raw in parsed.groups {
            if cancel.is_cancelled() {
                return;
            }
            let group = self.build_group(raw);
            self.groups.push(Arc::new(group));
        }
        self.imports.extend(parsed.imports);
    }

    fn register_raw_bean(&mut self, raw: RawBean) {
        let beans = &self.beans;
        match bean_name(&raw, |candidate| beans.contains_key(candidate)) {
            Some((name, aliases)) => {
                let bean = self.build_bean(raw, name, aliases, false);
                self.register_bean(Arc::new(bean));
            }
            None => self.report_unnamed(&raw.location),
        }
    }

    /// Adds a top-level bean. A duplicate name replaces the earlier bean and records an error.
    pub(crate) fn register_bean(&mut self, bean: Arc<Bean>) {
        if self.beans.contains_key(&bean.name) {
            self.problem_at(
                Severity::Error,
                format!("Bean name '{}' is already used in this document", bean.name),
                &bean.location,
            );
        }
        for alias in &bean.aliases {
            self.aliases.insert(
                alias.clone(),
                Alias {
                    name: alias.clone(),
                    target: bean.name.clone(),
                    location: bean.location.clone(),
                },
            );
        }
        self.beans.insert(bean.name.clone(), bean);
    }

    pub(crate) fn register_alias(&mut self, name: String, target: String, location: SourceLocation) {
        self.aliases.insert(
            name.clone(),
            Alias {
                name,
                target,
                location,
            },
        );
    }

    pub(crate) fn register_group(&mut self, group: Group) {
        self.groups.push(Arc::new(group));
    }

    pub(crate) fn problem(&mut self, severity: Severity, message: impl Into<String>, line: Option<u32>) {
        self.problems.push(Problem {
            severity,
            message: message.into(),
            resource: self.resource.clone(),
            line,
        });
    }

    fn problem_at(&mut self, severity: Severity, message: String, location: &SourceLocation) {
        let line = (location.start_line > 0).then_some(location.start_line);
        self.problem(severity, message, line);
    }

    fn report_unnamed(&mut self, location: &SourceLocation) {
        self.problem_at(
            Severity::Error,
            "Unnamed bean definition specifies neither 'class' nor 'parent' nor 'factory-bean'"
                .to_string(),
            location,
        );
    }

    fn build_group(&mut self, raw: RawGroup) -> Group {
        let mut group = Group {
            name: raw.name,
            profiles: raw
                .profiles
                .into_iter()
                .map(|profile| profile.trim().to_string())
                .filter(|profile| !profile.is_empty())
                .collect(),
            location: raw.location,
            ..Group::default()
        };

        for raw_bean in raw.beans {
            let named = {
                let top_level = &self.beans;
                let local = &group.beans;
                bean_name(&raw_bean, |candidate| {
                    top_level.contains_key(candidate) || local.contains_key(candidate)
                })
            };
            let Some((name, aliases)) = named else {
                self.report_unnamed(&raw_bean.location);
                continue;
            };
            let bean = self.build_bean(raw_bean, name, aliases, false);
            if group.beans.contains_key(&bean.name) {
                self.problem_at(
                    Severity::Error,
                    format!("Bean name '{}' is already used in this document", bean.name),
                    &bean.location,
                );
            }
            group.beans.insert(bean.name.clone(), Arc::new(bean));
        }

        for nested in raw.groups {
            let nested = self.build_group(nested);
            group.groups.push(Arc::new(nested));
        }
        group
    }

    fn build_bean(
        &mut self,
        raw: RawBean,
        name: String,
        aliases: BTreeSet<String>,
        is_inner: bool,
    ) -> Bean {
        let constructor_args = raw
            .constructor_args
            .into_iter()
            .map(|arg| ConstructorArg {
                index: arg.index,
                name: arg.name,
                type_name: arg.type_name,
                value: self.build_value(arg.value),
            })
            .collect();
        let mut properties = IndexMap::new();
        for property in raw.properties {
            let value = self.build_value(property.value);
            properties.insert(property.name, value);
        }

        Bean {
            name,
            class_name: non_empty(raw.class_name),
            parent_name: non_empty(raw.parent_name),
            scope: non_empty(raw.scope),
            is_abstract: raw.is_abstract,
            lazy_init: raw.lazy_init,
            init_method: non_empty(raw.init_method),
            destroy_method: non_empty(raw.destroy_method),
            factory_bean: non_empty(raw.factory_bean),
            factory_method: non_empty(raw.factory_method),
            depends_on: raw
                .depends_on
                .into_iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            constructor_args,
            properties,
            method_overrides: raw.method_overrides,
            is_inner,
            aliases,
            location: raw.location,
        }
    }

    fn build_inner(&mut self, raw: RawBean) -> Bean {
        self.inner_counter += 1;
        let counter = self.inner_counter;
        let (name, aliases) = match explicit_name(&raw) {
            Some(named) => named,
            None => {
                let base = generated_base(&raw).unwrap_or_else(|| INNER_BEAN_BASE.to_string());
                (format!("{base}#{counter:x}"), BTreeSet::new())
            }
        };
        self.build_bean(raw, name, aliases, true)
    }

    fn build_value(&mut self, raw: RawValue) -> Value {
        match raw {
            RawValue::Literal(text) => Value::Literal(text),
            RawValue::Reference(name) => Value::Reference(name.trim().to_string()),
            RawValue::NameReference(name) => Value::NameReference(name.trim().to_string()),
            RawValue::Inner(raw) => Value::Inner(Arc::new(self.build_inner(*raw))),
            RawValue::List(items) => {
                Value::List(items.into_iter().map(|item| self.build_value(item)).collect())
            }
            RawValue::Set(items) => {
                Value::Set(items.into_iter().map(|item| self.build_value(item)).collect())
            }
            RawValue::Map(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (self.build_value(key), self.build_value(value)))
                    .collect(),
            ),
            RawValue::Properties(props) => Value::Properties(props),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Name from `id`, else the first of `names`; the remaining names become aliases.
fn explicit_name(raw: &RawBean) -> Option<(String, BTreeSet<String>)> {
    let mut names = raw
        .names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let id = raw
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let name = match id {
        Some(id) => id,
        None => names.next()?,
    };
    let mut aliases: BTreeSet<String> = names.collect();
    aliases.remove(&name);
    Some((name, aliases))
}

fn generated_base(raw: &RawBean) -> Option<String> {
    let present = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    present(&raw.class_name)
        .or_else(|| present(&raw.parent_name).map(|parent| format!("{parent}$child")))
        .or_else(|| present(&raw.factory_bean).map(|factory| format!("{factory}$created")))
}

/// Resolves the name of a top-level or group bean, generating `<base>#<n>` when unnamed.
fn bean_name(
    raw: &RawBean,
    taken: impl Fn(&str) -> bool,
) -> Option<(String, BTreeSet<String>)> {
    if let Some(named) = explicit_name(raw) {
        return Some(named);
    }
    let base = generated_base(raw)?;
    (0_usize..)
        .map(|n| format!("{base}#{n}"))
        .find(|candidate| !taken(candidate))
        .map(|name| (name, BTreeSet::new()))
}
