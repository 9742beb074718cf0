use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Bean;

/// A constructor-argument or property value.
///
/// `Set` keeps declaration order for display; membership semantics are the consumer's concern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Literal(String),
    /// Reference resolved by bean name, including type-aware resolution by the host.
    Reference(String),
    /// Reference by bean name only (`idref`).
    NameReference(String),
    Inner(Arc<Bean>),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Properties(BTreeMap<String, String>),
}

impl Value {
    pub fn literal(value: impl Into<String>) -> Self {
        Value::Literal(value.into())
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Value::Reference(name.into())
    }

    /// The bean name targeted by a `Reference` or `NameReference`.
    pub fn referenced_name(&self) -> Option<&str> {
        match self {
            Value::Reference(name) | Value::NameReference(name) => Some(name),
            _ => None,
        }
    }

    /// Calls `f` for every inner bean reachable from this value, descending into containers.
    pub fn for_each_inner_bean(&self, f: &mut dyn FnMut(&Arc<Bean>)) {
        match self {
            Value::Inner(bean) => f(bean),
            Value::List(items) | Value::Set(items) => {
                for item in items {
                    item.for_each_inner_bean(f);
                }
            }
            Value::Map(entries) => {
                for (key, value) in entries {
                    key.for_each_inner_bean(f);
                    value.for_each_inner_bean(f);
                }
            }
            Value::Literal(_)
            | Value::Reference(_)
            | Value::NameReference(_)
            | Value::Properties(_) => {}
        }
    }
}

const MAX_NAME_LEN: usize = 30;
const HEAD_LEN: usize = 12;
const TAIL_LEN: usize = 13;

/// Short, human readable rendering of a value for labels and hovers.
pub fn value_name(value: &Value) -> String {
    match value {
        Value::Literal(text) => format!("\"{}\"", abbreviate(text)),
        Value::Reference(name) => format!("reference <{}>", abbreviate(name)),
        Value::NameReference(name) => format!("idref <{}>", abbreviate(name)),
        Value::Inner(bean) => match (&bean.class_name, &bean.parent_name) {
            (Some(class), _) => format!("bean [{class}]"),
            (None, Some(parent)) => format!("bean <{parent}>"),
            (None, None) => "bean".to_string(),
        },
        Value::List(_) => "list".to_string(),
        Value::Set(_) => "set".to_string(),
        Value::Map(_) => "map".to_string(),
        Value::Properties(_) => "props".to_string(),
    }
}

fn abbreviate(text: &str) -> String {
    let len = text.chars().count();
    if len <= MAX_NAME_LEN {
        return text.to_string();
    }
    let head: String = text.chars().take(HEAD_LEN).collect();
    let tail: String = text.chars().skip(len - TAIL_LEN).collect();
    format!("{head} .. {tail}")
}
