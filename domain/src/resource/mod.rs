//! Declarative resources a query can reference.
//!
//! These are the strongly-typed forms of the objects kept by the resource
//! store. They are validated when loaded and immutable afterwards.

pub mod agent;
pub mod model;
pub mod tool;

use crate::query::selector::Labels;
use serde::{Deserialize, Serialize};

/// Identity and labels shared by every resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub labels: Labels,
}

pub fn default_namespace() -> String {
    "default".to_string()
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: Labels::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Location of an external conversation-memory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryResource {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    pub address: String,
}
