//! Search strategy system
//!
//! One search algorithm per resource kind behind a common capability
//! interface, selected by the [`SearchDispatcher`]. New resource types add
//! one strategy without touching dispatch logic.

mod cache;
mod strategies;

pub use cache::{CacheLoad, ListCache};
pub use strategies::{ListSearchStrategy, ObjectRecordsStrategy, TaskSearchStrategy};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::CrmClient;
use crate::error::{Result, ServiceError};
use crate::records::Record;
use crate::registry::ResourceType;

fn default_limit() -> usize {
    20
}

/// Search type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Basic,
    Advanced,
    Content,
    Timeframe,
    Relationship,
}

/// Date-range bounds applied to a timestamp attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeframe {
    /// Attribute the bounds apply to (defaults to `created_at`)
    #[serde(default)]
    pub attribute: Option<String>,

    /// Inclusive lower bound, RFC 3339
    #[serde(default)]
    pub start: Option<String>,

    /// Inclusive upper bound, RFC 3339
    #[serde(default)]
    pub end: Option<String>,
}

impl Timeframe {
    pub fn attribute_name(&self) -> &str {
        self.attribute.as_deref().unwrap_or("created_at")
    }
}

/// How content matching compares values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    #[default]
    Partial,
}

/// Content query over a configurable field list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentQuery {
    pub query: String,

    /// Fields to match against; strategy defaults apply when empty
    #[serde(default)]
    pub fields: Vec<String>,

    #[serde(default)]
    pub match_mode: MatchMode,

    /// Order results by match relevance instead of upstream order
    #[serde(default)]
    pub rank_by_relevance: bool,
}

/// Relationship traversal descriptor: records whose reference attribute
/// points at the given record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipQuery {
    /// Reference attribute on the searched resource
    pub attribute: String,

    /// Target record the reference must point at
    pub record_id: String,
}

/// Filter conditions supported by the structured filter tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCondition {
    Equals,
    Contains,
    StartsWith,
    GreaterThan,
    GreaterThanOrEquals,
    LessThan,
    LessThanOrEquals,
    IsSet,
    IsNotSet,
}

impl FilterCondition {
    fn api_operator(&self) -> &'static str {
        match self {
            FilterCondition::Equals => "$eq",
            FilterCondition::Contains => "$contains",
            FilterCondition::StartsWith => "$starts_with",
            FilterCondition::GreaterThan => "$gt",
            FilterCondition::GreaterThanOrEquals => "$gte",
            FilterCondition::LessThan => "$lt",
            FilterCondition::LessThanOrEquals => "$lte",
            FilterCondition::IsSet => "$not_empty",
            FilterCondition::IsNotSet => "$empty",
        }
    }
}

/// Structured filter tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Condition {
        attribute: String,
        condition: FilterCondition,
        value: Value,
    },
}

impl Filter {
    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Condition {
            attribute: attribute.into(),
            condition: FilterCondition::Contains,
            value: json!(value.into()),
        }
    }

    pub fn equals(attribute: impl Into<String>, value: Value) -> Self {
        Filter::Condition {
            attribute: attribute.into(),
            condition: FilterCondition::Equals,
            value,
        }
    }

    /// Serialize to the upstream filter object shape
    pub fn to_api_value(&self) -> Value {
        match self {
            Filter::And(children) => {
                json!({ "$and": children.iter().map(Filter::to_api_value).collect::<Vec<_>>() })
            }
            Filter::Or(children) => {
                json!({ "$or": children.iter().map(Filter::to_api_value).collect::<Vec<_>>() })
            }
            Filter::Condition {
                attribute,
                condition,
                value,
            } => match condition {
                FilterCondition::IsSet | FilterCondition::IsNotSet => {
                    json!({ attribute: { condition.api_operator(): true } })
                }
                _ => json!({ attribute: { condition.api_operator(): value } }),
            },
        }
    }
}

/// Merge a timeframe-derived date filter into an existing filter tree.
///
/// Pure: neither input is mutated. Returns the original filter unchanged
/// when the timeframe carries no bounds.
pub fn merge_date_filter(base: Option<Filter>, timeframe: &Timeframe) -> Option<Filter> {
    let attribute = timeframe.attribute_name().to_string();
    let mut bounds = Vec::new();

    if let Some(start) = &timeframe.start {
        bounds.push(Filter::Condition {
            attribute: attribute.clone(),
            condition: FilterCondition::GreaterThanOrEquals,
            value: json!(start),
        });
    }
    if let Some(end) = &timeframe.end {
        bounds.push(Filter::Condition {
            attribute,
            condition: FilterCondition::LessThanOrEquals,
            value: json!(end),
        });
    }

    match (base, bounds.is_empty()) {
        (base, true) => base,
        (None, false) => Some(Filter::And(bounds)),
        (Some(Filter::And(mut children)), false) => {
            children.extend(bounds);
            Some(Filter::And(children))
        }
        (Some(other), false) => {
            let mut children = vec![other];
            children.extend(bounds);
            Some(Filter::And(children))
        }
    }
}

/// Parameters for one search invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub resource_type: ResourceType,

    /// Free-text query
    #[serde(default)]
    pub query: Option<String>,

    /// Structured filter tree (advanced search)
    #[serde(default)]
    pub filters: Option<Filter>,

    #[serde(default)]
    pub timeframe: Option<Timeframe>,

    #[serde(default)]
    pub content: Option<ContentQuery>,

    #[serde(default)]
    pub relationship: Option<RelationshipQuery>,

    /// Explicit discriminator; inferred from shape when absent
    #[serde(default)]
    pub search_type: Option<SearchType>,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

impl SearchParams {
    /// Basic query search over a resource
    pub fn basic(resource_type: ResourceType, query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::empty(resource_type)
        }
    }

    /// A parameter set with nothing but the resource type (a plain listing)
    pub fn empty(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            query: None,
            filters: None,
            timeframe: None,
            content: None,
            relationship: None,
            search_type: None,
            limit: default_limit(),
            offset: 0,
        }
    }

    /// Resolve the discriminator: explicit wins, otherwise inferred from
    /// which parameter groups are populated.
    pub fn effective_search_type(&self) -> SearchType {
        if let Some(explicit) = self.search_type {
            return explicit;
        }
        if self.filters.is_some() {
            SearchType::Advanced
        } else if self.content.is_some() {
            SearchType::Content
        } else if self.relationship.is_some() {
            SearchType::Relationship
        } else if self.timeframe.is_some() {
            SearchType::Timeframe
        } else {
            SearchType::Basic
        }
    }
}

/// A resource-specific search algorithm
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    /// Resource kind this strategy serves
    fn resource_type(&self) -> ResourceType;

    /// Whether structured-filter (advanced) search is supported
    fn supports_advanced_filtering(&self) -> bool;

    /// Whether free-text query search is supported
    fn supports_query_search(&self) -> bool;

    /// Run the search
    async fn search(&self, params: &SearchParams) -> Result<Vec<Record>>;
}

/// Selects and runs a search strategy by resource type
pub struct SearchDispatcher {
    strategies: HashMap<ResourceType, Arc<dyn SearchStrategy>>,
}

impl SearchDispatcher {
    /// Build the standard strategy set over a shared client
    pub fn standard(client: Arc<CrmClient>) -> Self {
        let mut strategies: HashMap<ResourceType, Arc<dyn SearchStrategy>> = HashMap::new();

        for resource_type in ResourceType::ALL {
            let strategy: Arc<dyn SearchStrategy> = match resource_type {
                ResourceType::Tasks => Arc::new(TaskSearchStrategy::new(Arc::clone(&client))),
                ResourceType::Lists => Arc::new(ListSearchStrategy::new(Arc::clone(&client))),
                _ => Arc::new(ObjectRecordsStrategy::new(resource_type, Arc::clone(&client))),
            };
            strategies.insert(resource_type, strategy);
        }

        Self { strategies }
    }

    /// Build a dispatcher from an explicit strategy set (used in tests)
    pub fn with_strategies(strategies: Vec<Arc<dyn SearchStrategy>>) -> Self {
        Self {
            strategies: strategies
                .into_iter()
                .map(|s| (s.resource_type(), s))
                .collect(),
        }
    }

    /// The strategy registered for a resource type
    pub fn strategy(&self, resource_type: ResourceType) -> Result<&Arc<dyn SearchStrategy>> {
        self.strategies.get(&resource_type).ok_or_else(|| {
            ServiceError::internal(format!("No search strategy registered for {}", resource_type))
        })
    }

    /// Select a strategy and run the search.
    ///
    /// Requesting advanced search against a strategy without advanced
    /// filtering support is a contract violation, never a silent fallback.
    pub async fn search(&self, params: &SearchParams) -> Result<Vec<Record>> {
        let strategy = self.strategy(params.resource_type)?;
        let search_type = params.effective_search_type();

        if search_type == SearchType::Advanced && !strategy.supports_advanced_filtering() {
            return Err(ServiceError::invalid_filter(format!(
                "Advanced filtering is not supported for {}; use a basic or content search instead",
                params.resource_type
            )));
        }

        log::debug!(
            "Dispatching {:?} search for {} (limit {}, offset {})",
            search_type,
            params.resource_type,
            params.limit,
            params.offset
        );
        strategy.search(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_search_type_wins_over_shape() {
        let mut params = SearchParams::basic(ResourceType::Companies, "acme");
        params.filters = Some(Filter::contains("name", "acme"));
        params.search_type = Some(SearchType::Basic);
        assert_eq!(params.effective_search_type(), SearchType::Basic);
    }

    #[test]
    fn search_type_inferred_from_shape() {
        let mut params = SearchParams::empty(ResourceType::Companies);
        assert_eq!(params.effective_search_type(), SearchType::Basic);

        params.timeframe = Some(Timeframe {
            attribute: None,
            start: Some("2024-01-01T00:00:00Z".into()),
            end: None,
        });
        assert_eq!(params.effective_search_type(), SearchType::Timeframe);

        params.filters = Some(Filter::contains("name", "acme"));
        assert_eq!(params.effective_search_type(), SearchType::Advanced);
    }

    #[test]
    fn filter_tree_serializes_to_api_shape() {
        let filter = Filter::And(vec![
            Filter::contains("name", "acme"),
            Filter::Or(vec![
                Filter::equals("stage", serde_json::json!("won")),
                Filter::Condition {
                    attribute: "value".into(),
                    condition: FilterCondition::GreaterThan,
                    value: serde_json::json!(1000),
                },
            ]),
        ]);

        assert_eq!(
            filter.to_api_value(),
            serde_json::json!({
                "$and": [
                    {"name": {"$contains": "acme"}},
                    {"$or": [
                        {"stage": {"$eq": "won"}},
                        {"value": {"$gt": 1000}}
                    ]}
                ]
            })
        );
    }

    #[test]
    fn merge_date_filter_is_pure_and_additive() {
        let timeframe = Timeframe {
            attribute: None,
            start: Some("2024-01-01T00:00:00Z".into()),
            end: Some("2024-02-01T00:00:00Z".into()),
        };

        let merged = merge_date_filter(None, &timeframe).unwrap();
        match &merged {
            Filter::And(children) => assert_eq!(children.len(), 2),
            other => panic!("expected And, got {:?}", other),
        }

        let base = Filter::And(vec![Filter::contains("name", "acme")]);
        let merged = merge_date_filter(Some(base), &timeframe).unwrap();
        match merged {
            Filter::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }

        // No bounds: base passes through untouched.
        let empty = Timeframe {
            attribute: None,
            start: None,
            end: None,
        };
        let base = Filter::contains("name", "acme");
        assert_eq!(merge_date_filter(Some(base.clone()), &empty), Some(base));
    }
}
