use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{BeanId, ContextId, ElementId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Parent,
    Factory,
    DependsOn,
    MethodOverride,
    Interceptor,
    /// Outer bean to one of its inner beans.
    Inner,
    Standard,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionKind::Parent => "parent",
            ConnectionKind::Factory => "factory",
            ConnectionKind::DependsOn => "depends-on",
            ConnectionKind::MethodOverride => "method-override",
            ConnectionKind::Interceptor => "interceptor",
            ConnectionKind::Inner => "inner",
            ConnectionKind::Standard => "standard",
        };
        f.write_str(name)
    }
}

/// A reference edge discovered by the resolver. Transient query output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub kind: ConnectionKind,
    pub source: ElementId,
    pub target: BeanId,
    pub context: ContextId,
    /// The edge was found inside an inner bean and re-attributed to the outer one.
    pub is_inner: bool,
}

impl Connection {
    pub fn new(kind: ConnectionKind, source: ElementId, target: BeanId, context: ContextId) -> Self {
        Self {
            kind,
            source,
            target,
            context,
            is_inner: false,
        }
    }
}
