//! Resource registry
//!
//! The closed set of CRM resource kinds this layer operates over, with
//! name, endpoint and capability lookups. Dispatch logic never branches on
//! resource names directly; it asks the registry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A CRM resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Companies,
    People,
    Lists,
    Records,
    Deals,
    Tasks,
}

impl ResourceType {
    /// All resource kinds, in registry order
    pub const ALL: [ResourceType; 6] = [
        ResourceType::Companies,
        ResourceType::People,
        ResourceType::Lists,
        ResourceType::Records,
        ResourceType::Deals,
        ResourceType::Tasks,
    ];

    /// Plural resource name as used in API paths and messages
    pub fn plural_name(&self) -> &'static str {
        match self {
            ResourceType::Companies => "companies",
            ResourceType::People => "people",
            ResourceType::Lists => "lists",
            ResourceType::Records => "records",
            ResourceType::Deals => "deals",
            ResourceType::Tasks => "tasks",
        }
    }

    /// Singular resource name for user-facing messages
    pub fn singular_name(&self) -> &'static str {
        match self {
            ResourceType::Companies => "company",
            ResourceType::People => "person",
            ResourceType::Lists => "list",
            ResourceType::Records => "record",
            ResourceType::Deals => "deal",
            ResourceType::Tasks => "task",
        }
    }

    /// API endpoint path for this resource's collection
    pub fn endpoint(&self) -> String {
        if self.supports_object_records_api() {
            format!("objects/{}/records", self.plural_name())
        } else {
            self.plural_name().to_string()
        }
    }

    /// Whether this resource is served by the generic object-records API
    /// (server-side filtered query endpoint)
    pub fn supports_object_records_api(&self) -> bool {
        matches!(
            self,
            ResourceType::Companies
                | ResourceType::People
                | ResourceType::Records
                | ResourceType::Deals
        )
    }

    /// Whether this resource needs a dedicated code path rather than the
    /// generic object-records handling
    pub fn requires_special_handling(&self) -> bool {
        matches!(self, ResourceType::Tasks | ResourceType::Lists)
    }

    /// Normalize any casing or singular/plural form into a resource type.
    ///
    /// Returns `None` for names outside the closed set.
    pub fn normalize(input: &str) -> Option<ResourceType> {
        match input.trim().to_lowercase().as_str() {
            "companies" | "company" => Some(ResourceType::Companies),
            "people" | "person" => Some(ResourceType::People),
            "lists" | "list" => Some(ResourceType::Lists),
            "records" | "record" | "objects" | "object" => Some(ResourceType::Records),
            "deals" | "deal" => Some(ResourceType::Deals),
            "tasks" | "task" => Some(ResourceType::Tasks),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.plural_name())
    }
}

/// The verb being performed against a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Get,
    Search,
    Batch,
}

impl OperationKind {
    /// Verb name for user-facing messages
    pub fn verb(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Get => "get",
            OperationKind::Search => "search",
            OperationKind::Batch => "batch",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb())
    }
}
