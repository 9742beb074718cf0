use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{SourceLocation, Value};

pub const DEFAULT_SCOPE: &str = "singleton";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstructorArg {
    pub index: Option<usize>,
    pub name: Option<String>,
    pub type_name: Option<String>,
    pub value: Value,
}

impl ConstructorArg {
    pub fn new(value: Value) -> Self {
        Self {
            index: None,
            name: None,
            type_name: None,
            value,
        }
    }

    pub fn indexed(index: usize, value: Value) -> Self {
        Self {
            index: Some(index),
            ..Self::new(value)
        }
    }

    pub fn named(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(value)
        }
    }

    fn same_slot(&self, other: &ConstructorArg) -> bool {
        match (self.index, other.index) {
            (Some(a), Some(b)) => return a == b,
            (Some(_), None) | (None, Some(_)) => return false,
            (None, None) => {}
        }
        match (&self.name, &other.name) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self == other,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodOverrideKind {
    Lookup,
    Replace,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodOverride {
    pub kind: MethodOverrideKind,
    pub method_name: String,
    /// Looked-up bean for `Lookup`, replacer bean for `Replace`.
    pub target: String,
}

/// One component definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bean {
    pub name: String,
    pub class_name: Option<String>,
    pub parent_name: Option<String>,
    pub scope: Option<String>,
    pub is_abstract: bool,
    pub lazy_init: Option<bool>,
    pub init_method: Option<String>,
    pub destroy_method: Option<String>,
    pub factory_bean: Option<String>,
    pub factory_method: Option<String>,
    pub depends_on: Vec<String>,
    pub constructor_args: Vec<ConstructorArg>,
    pub properties: IndexMap<String, Value>,
    pub method_overrides: Vec<MethodOverride>,
    pub is_inner: bool,
    pub aliases: BTreeSet<String>,
    pub location: SourceLocation,
}

impl Bean {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_name: None,
            parent_name: None,
            scope: None,
            is_abstract: false,
            lazy_init: None,
            init_method: None,
            destroy_method: None,
            factory_bean: None,
            factory_method: None,
            depends_on: Vec::new(),
            constructor_args: Vec::new(),
            properties: IndexMap::new(),
            method_overrides: Vec::new(),
            is_inner: false,
            aliases: BTreeSet::new(),
            location: SourceLocation::default(),
        }
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_parent(mut self, parent_name: impl Into<String>) -> Self {
        self.parent_name = Some(parent_name.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_constructor_arg(mut self, arg: ConstructorArg) -> Self {
        self.constructor_args.push(arg);
        self
    }

    pub fn with_depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn with_factory(mut self, bean: impl Into<String>, method: impl Into<String>) -> Self {
        self.factory_bean = Some(bean.into());
        self.factory_method = Some(method.into());
        self
    }

    pub fn with_method_override(
        mut self,
        kind: MethodOverrideKind,
        method_name: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.method_overrides.push(MethodOverride {
            kind,
            method_name: method_name.into(),
            target: target.into(),
        });
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// A child bean inherits from the bean named by `parent_name`.
    pub fn is_child(&self) -> bool {
        self.parent_name.is_some()
    }

    pub fn effective_scope(&self) -> &str {
        self.scope.as_deref().unwrap_or(DEFAULT_SCOPE)
    }

    /// Factory delegation needs both halves of the pair.
    pub fn factory_delegate(&self) -> Option<&str> {
        match (&self.factory_bean, &self.factory_method) {
            (Some(bean), Some(_)) => Some(bean),
            _ => None,
        }
    }

    /// Inner beans declared directly in constructor args and property values.
    pub fn inner_beans(&self) -> Vec<Arc<Bean>> {
        let mut out = Vec::new();
        let mut push = |bean: &Arc<Bean>| out.push(Arc::clone(bean));
        for arg in &self.constructor_args {
            arg.value.for_each_inner_bean(&mut push);
        }
        for value in self.properties.values() {
            value.for_each_inner_bean(&mut push);
        }
        out
    }

    /// Applies `child` on top of `self`.
    ///
    /// Explicitly set child fields win; unset ones keep the accumulated value. Identity fields
    /// (name, aliases, inner flag, location) and `is_abstract` always come from the child.
    /// `parent_name` is left untouched so the result points past the folded chain.
    pub fn override_from(&mut self, child: &Bean) {
        self.name = child.name.clone();
        self.aliases = child.aliases.clone();
        self.is_inner = child.is_inner;
        self.location = child.location.clone();
        self.is_abstract = child.is_abstract;

        override_option(&mut self.class_name, &child.class_name);
        override_option(&mut self.scope, &child.scope);
        override_option(&mut self.init_method, &child.init_method);
        override_option(&mut self.destroy_method, &child.destroy_method);
        override_option(&mut self.factory_bean, &child.factory_bean);
        override_option(&mut self.factory_method, &child.factory_method);
        if child.lazy_init.is_some() {
            self.lazy_init = child.lazy_init;
        }

        if !child.depends_on.is_empty() {
            self.depends_on = child.depends_on.clone();
        }

        for arg in &child.constructor_args {
            match self
                .constructor_args
                .iter_mut()
                .find(|existing| existing.same_slot(arg))
            {
                Some(existing) => *existing = arg.clone(),
                None => self.constructor_args.push(arg.clone()),
            }
        }

        for (name, value) in &child.properties {
            self.properties.insert(name.clone(), value.clone());
        }

        for method in &child.method_overrides {
            match self
                .method_overrides
                .iter_mut()
                .find(|existing| {
                    existing.kind == method.kind && existing.method_name == method.method_name
                }) {
                Some(existing) => *existing = method.clone(),
                None => self.method_overrides.push(method.clone()),
            }
        }
    }
}

fn override_option(target: &mut Option<String>, source: &Option<String>) {
    if let Some(value) = source.as_ref().filter(|value| !value.is_empty()) {
        *target = Some(value.clone());
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    pub target: String,
    pub location: SourceLocation,
}

/// A nested declaration scope, optionally restricted to a set of profiles.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: Option<String>,
    pub profiles: BTreeSet<String>,
    pub beans: IndexMap<String, Arc<Bean>>,
    pub groups: Vec<Arc<Group>>,
    pub location: SourceLocation,
}

impl Group {
    /// A group without profiles is always enabled; otherwise one of its profiles must be active.
    pub fn is_profile_enabled(&self, active: &BTreeSet<String>) -> bool {
        self.profiles.is_empty() || !self.profiles.is_disjoint(active)
    }

    /// Every bean in this group and its nested groups, in declaration order.
    pub fn all_beans(&self) -> Vec<Arc<Bean>> {
        let mut out = Vec::new();
        self.collect_beans(None, &mut out);
        out
    }

    /// Like [`Group::all_beans`], skipping nested groups disabled for `active` profiles.
    pub fn enabled_beans(&self, active: &BTreeSet<String>) -> Vec<Arc<Bean>> {
        let mut out = Vec::new();
        if self.is_profile_enabled(active) {
            self.collect_beans(Some(active), &mut out);
        }
        out
    }

    fn collect_beans(&self, active: Option<&BTreeSet<String>>, out: &mut Vec<Arc<Bean>>) {
        out.extend(self.beans.values().cloned());
        for group in &self.groups {
            if active.map_or(true, |active| group.is_profile_enabled(active)) {
                group.collect_beans(active, out);
            }
        }
    }
}
