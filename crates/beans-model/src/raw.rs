//! Records produced by a document parser, before names are assigned and values are built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{MethodOverride, Problem, SourceLocation};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RawValue {
    Literal(String),
    Reference(String),
    NameReference(String),
    Inner(Box<RawBean>),
    List(Vec<RawValue>),
    Set(Vec<RawValue>),
    Map(Vec<(RawValue, RawValue)>),
    Properties(BTreeMap<String, String>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawConstructorArg {
    pub index: Option<usize>,
    pub name: Option<String>,
    pub type_name: Option<String>,
    pub value: RawValue,
}

impl RawConstructorArg {
    pub fn new(value: RawValue) -> Self {
        Self {
            index: None,
            name: None,
            type_name: None,
            value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawProperty {
    pub name: String,
    pub value: RawValue,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBean {
    pub id: Option<String>,
    /// Additional names, already split on `,`, `;` and whitespace.
    pub names: Vec<String>,
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
    pub constructor_args: Vec<RawConstructorArg>,
    pub properties: Vec<RawProperty>,
    pub method_overrides: Vec<MethodOverride>,
    pub location: SourceLocation,
}

impl RawBean {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn parent(mut self, parent_name: impl Into<String>) -> Self {
        self.parent_name = Some(parent_name.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: RawValue) -> Self {
        self.properties.push(RawProperty {
            name: name.into(),
            value,
        });
        self
    }

    pub fn at(mut self, resource: impl Into<String>, line: u32) -> Self {
        self.location = SourceLocation::line(resource, line);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAlias {
    pub name: String,
    pub target: String,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImport {
    /// Resource locator, possibly an ant-style pattern.
    pub resource: String,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawGroup {
    pub name: Option<String>,
    pub profiles: Vec<String>,
    pub beans: Vec<RawBean>,
    pub groups: Vec<RawGroup>,
    pub location: SourceLocation,
}

/// Everything a parser extracted from one resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedDocument {
    pub beans: Vec<RawBean>,
    pub aliases: Vec<RawAlias>,
    pub imports: Vec<RawImport>,
    pub groups: Vec<RawGroup>,
    pub problems: Vec<Problem>,
}
