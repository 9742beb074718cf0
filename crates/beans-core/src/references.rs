//! Transitive reference discovery.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use beans_model::{Bean, BeanId, Connection, ConnectionKind, ContextId, DocumentId, ElementId, Group, Value};
use indexmap::IndexSet;

use crate::resolve::{bean_class, merged_definition, resolve, BeanHandle, ResolveContext};
use crate::BeansError;

/// Property walked as a list of interceptor names on proxy factory beans.
pub const INTERCEPTOR_NAMES: &str = "interceptorNames";

/// An element whose outgoing references can be walked.
#[derive(Clone, Debug)]
pub enum ElementRef {
    Bean(BeanHandle),
    ConstructorArg { bean: BeanHandle, index: usize },
    Property { bean: BeanHandle, name: String },
    Group { document: DocumentId, group: Arc<Group> },
}

/// Connections reachable from `element`, in discovery order.
///
/// With `recursive`, the references of every reached bean are followed too; each bean is walked
/// at most once. Connections found inside inner beans are attributed to the outer bean and
/// flagged `is_inner`.
pub fn transitive_references(
    element: &ElementRef,
    ctx: &ResolveContext,
    recursive: bool,
) -> Result<IndexSet<Connection>, BeansError> {
    let mut walker = Walker::new(ctx, recursive);
    match element {
        ElementRef::Bean(handle) => {
            walker.visited.insert(handle.id());
            walker.bean(handle);
        }
        ElementRef::ConstructorArg { bean, index } => {
            let arg = bean.bean.constructor_args.get(*index).ok_or_else(|| {
                BeansError::UnknownElement {
                    bean: bean.bean.name.clone(),
                    element: format!("constructor argument {index}"),
                }
            })?;
            let id = bean.id();
            walker.visited.insert(id.clone());
            let source = ElementId::ConstructorArg {
                bean: id.clone(),
                index: *index,
            };
            walker.value(&arg.value, &source, &id);
        }
        ElementRef::Property { bean, name } => {
            let value = bean.bean.properties.get(name).ok_or_else(|| {
                BeansError::UnknownElement {
                    bean: bean.bean.name.clone(),
                    element: format!("property '{name}'"),
                }
            })?;
            let id = bean.id();
            walker.visited.insert(id.clone());
            let source = ElementId::Property {
                bean: id.clone(),
                name: name.clone(),
            };
            walker.property(&bean.bean, name, value, &source, &id);
        }
        ElementRef::Group { document, group } => walker.group(document, group),
    }
    Ok(walker.out)
}

struct Walker<'a> {
    ctx: &'a ResolveContext,
    context: ContextId,
    recursive: bool,
    visited: HashSet<BeanId>,
    out: IndexSet<Connection>,
}

impl<'a> Walker<'a> {
    fn new(ctx: &'a ResolveContext, recursive: bool) -> Self {
        Self {
            ctx,
            context: ctx.id(),
            recursive,
            visited: HashSet::new(),
            out: IndexSet::new(),
        }
    }

    fn group(&mut self, document: &DocumentId, group: &Group) {
        if let Some(active) = self.ctx.active_profiles() {
            if !group.is_profile_enabled(active) {
                return;
            }
        }
        for bean in group.beans.values() {
            let handle = BeanHandle::new(document.clone(), Arc::clone(bean));
            self.visited.insert(handle.id());
            self.bean(&handle);
        }
        for nested in &group.groups {
            self.group(document, nested);
        }
    }

    fn bean(&mut self, handle: &BeanHandle) {
        let id = handle.id();
        let source = ElementId::Bean(id.clone());
        let bean = &handle.bean;

        if let Some(parent_name) = &bean.parent_name {
            if self.recursive {
                let mut seen = BTreeSet::new();
                let mut next = Some(parent_name.clone());
                while let Some(name) = next.take() {
                    if !seen.insert(name.clone()) {
                        break;
                    }
                    let Some(parent) = resolve(&name, self.ctx) else {
                        break;
                    };
                    next = parent.bean.parent_name.clone();
                    self.add(ConnectionKind::Parent, &source, &id, parent);
                }
            } else if let Some(parent) = resolve(parent_name, self.ctx) {
                self.add(ConnectionKind::Parent, &source, &id, parent);
            }
        }

        let merged;
        let definition: &Bean = if self.recursive {
            merged = merged_definition(bean, self.ctx);
            &merged
        } else {
            &**bean
        };
        if let Some(factory) = definition.factory_delegate() {
            self.add_named(ConnectionKind::Factory, factory, &source, &id);
        }
        for name in &definition.depends_on {
            self.add_named(ConnectionKind::DependsOn, name, &source, &id);
        }
        for method in &definition.method_overrides {
            self.add_named(ConnectionKind::MethodOverride, &method.target, &source, &id);
        }

        for (index, arg) in bean.constructor_args.iter().enumerate() {
            let arg_source = ElementId::ConstructorArg {
                bean: id.clone(),
                index,
            };
            self.value(&arg.value, &arg_source, &id);
        }
        for (name, value) in &bean.properties {
            let property_source = ElementId::Property {
                bean: id.clone(),
                name: name.clone(),
            };
            self.property(bean, name, value, &property_source, &id);
        }
    }

    fn property(&mut self, bean: &Bean, name: &str, value: &Value, source: &ElementId, owner: &BeanId) {
        if name == INTERCEPTOR_NAMES && self.is_proxy_factory(bean) {
            for interceptor in interceptor_names(value) {
                self.add_named(ConnectionKind::Interceptor, &interceptor, source, owner);
            }
        } else {
            self.value(value, source, owner);
        }
    }

    fn is_proxy_factory(&self, bean: &Bean) -> bool {
        bean_class(bean, self.ctx).is_some_and(|class| self.ctx.settings().is_proxy_factory(&class))
    }

    fn value(&mut self, value: &Value, source: &ElementId, owner: &BeanId) {
        match value {
            Value::Reference(name) | Value::NameReference(name) => {
                self.add_named(ConnectionKind::Standard, name, source, owner);
            }
            Value::List(items) | Value::Set(items) => {
                for item in items {
                    self.value(item, source, owner);
                }
            }
            Value::Map(entries) => {
                for (key, value) in entries {
                    self.value(key, source, owner);
                    self.value(value, source, owner);
                }
            }
            Value::Inner(inner) => self.inner(inner, source, owner),
            Value::Literal(_) | Value::Properties(_) => {}
        }
    }

    /// Walks an inner bean and re-attributes what it references to the outer bean.
    fn inner(&mut self, inner: &Arc<Bean>, source: &ElementId, owner: &BeanId) {
        let handle = BeanHandle::new(owner.document.clone(), Arc::clone(inner));
        let inner_id = handle.id();
        self.out.insert(Connection::new(
            ConnectionKind::Inner,
            source.clone(),
            inner_id.clone(),
            self.context.clone(),
        ));
        if !self.visited.insert(inner_id.clone()) {
            return;
        }

        let outer = std::mem::take(&mut self.out);
        self.bean(&handle);
        let found = std::mem::replace(&mut self.out, outer);
        for mut connection in found {
            if connection.source.bean() == Some(&inner_id) {
                if connection.target == *owner {
                    continue;
                }
                connection.source = ElementId::Bean(owner.clone());
                connection.is_inner = true;
            }
            self.out.insert(connection);
        }
    }

    fn add_named(&mut self, kind: ConnectionKind, name: &str, source: &ElementId, owner: &BeanId) {
        if let Some(target) = resolve(name, self.ctx) {
            self.add(kind, source, owner, target);
        }
    }

    fn add(&mut self, kind: ConnectionKind, source: &ElementId, owner: &BeanId, target: BeanHandle) {
        let target_id = target.id();
        if target_id == *owner {
            return;
        }
        self.out.insert(Connection::new(
            kind,
            source.clone(),
            target_id.clone(),
            self.context.clone(),
        ));
        if self.recursive && self.visited.insert(target_id) {
            self.bean(&target);
        }
    }
}

/// Names listed by an `interceptorNames` value: a list of names or one comma separated string.
fn interceptor_names(value: &Value) -> Vec<String> {
    let split = |text: &str| -> Vec<String> {
        text.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    };
    match value {
        Value::Literal(text) => split(text),
        Value::List(items) | Value::Set(items) => items
            .iter()
            .flat_map(|item| match item {
                Value::Literal(text) => split(text),
                Value::Reference(name) | Value::NameReference(name) => vec![name.clone()],
                _ => Vec::new(),
            })
            .collect(),
        Value::Reference(name) | Value::NameReference(name) => vec![name.clone()],
        _ => Vec::new(),
    }
}
