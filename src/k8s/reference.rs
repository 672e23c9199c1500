//! Pointers between cluster objects
//!
//! Routes point at backends and policies point at gateways or routes by
//! identity only. The target may or may not exist at any given moment.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to another object by group/kind/name
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    #[serde(default)]
    pub group: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl Reference {
    pub fn new(group: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn section_name(mut self, section: impl Into<String>) -> Self {
        self.section_name = Some(section.into());
        self
    }

    /// Core Service in the given namespace
    pub fn service(name: impl Into<String>, namespace: impl Into<String>, port: u16) -> Self {
        Self::new("", "Service", name).namespace(namespace).port(port)
    }

    /// `namespace/name` form used in status messages
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}/{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Objects that other objects can point at
pub trait Referencable {
    fn reference(&self) -> Reference;
}

impl Referencable for Reference {
    fn reference(&self) -> Reference {
        self.clone()
    }
}
