//! Resource-specific search strategies

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;

use crate::client::CrmClient;
use crate::error::{Result, ServiceError};
use crate::records::{canonicalize_list_entry, ApiTask, Record};
use crate::registry::ResourceType;
use crate::search::{
    merge_date_filter, ContentQuery, Filter, ListCache, MatchMode, SearchParams, SearchStrategy,
    SearchType, Timeframe,
};

/// Fields content matching falls back to for tasks
const DEFAULT_TASK_FIELDS: &[&str] = &["content", "status", "assignee"];

/// Page size used when a strategy has to filter client-side
const CLIENT_FILTER_PAGE: usize = 500;

/// Strategy for resources served by the server-side filtered query endpoint
/// (companies, people, deals, generic records)
pub struct ObjectRecordsStrategy {
    resource_type: ResourceType,
    client: Arc<CrmClient>,
}

impl ObjectRecordsStrategy {
    pub fn new(resource_type: ResourceType, client: Arc<CrmClient>) -> Self {
        debug_assert!(resource_type.supports_object_records_api());
        Self {
            resource_type,
            client,
        }
    }

    /// Default fields a free-text query matches against
    fn query_fields(&self) -> &'static [&'static str] {
        match self.resource_type {
            ResourceType::Companies => &["name", "domains"],
            ResourceType::People => &["name", "email_addresses"],
            _ => &["name"],
        }
    }

    fn query_filter(&self, query: &str) -> Filter {
        let conditions = self
            .query_fields()
            .iter()
            .map(|field| Filter::contains(*field, query))
            .collect::<Vec<_>>();
        if conditions.len() == 1 {
            conditions.into_iter().next().unwrap()
        } else {
            Filter::Or(conditions)
        }
    }

    fn content_filter(&self, content: &ContentQuery) -> Filter {
        let fields: Vec<&str> = if content.fields.is_empty() {
            self.query_fields().to_vec()
        } else {
            content.fields.iter().map(String::as_str).collect()
        };

        let conditions = fields
            .into_iter()
            .map(|field| Filter::contains(field, content.query.clone()))
            .collect::<Vec<_>>();
        if conditions.len() == 1 {
            conditions.into_iter().next().unwrap()
        } else {
            Filter::Or(conditions)
        }
    }

    fn build_filter(&self, params: &SearchParams) -> Result<Option<Filter>> {
        let filter = match params.effective_search_type() {
            SearchType::Advanced => params.filters.clone(),
            SearchType::Content => params.content.as_ref().map(|c| self.content_filter(c)),
            SearchType::Relationship => {
                let relationship = params.relationship.as_ref().ok_or_else(|| {
                    ServiceError::validation(
                        "Relationship search requires a relationship descriptor",
                    )
                })?;
                Some(Filter::equals(
                    format!("{}.target_record_id", relationship.attribute),
                    Value::String(relationship.record_id.clone()),
                ))
            }
            SearchType::Basic | SearchType::Timeframe => {
                params.query.as_ref().map(|q| self.query_filter(q))
            }
        };

        let filter = match &params.timeframe {
            Some(timeframe) => merge_date_filter(filter, timeframe),
            None => filter,
        };
        Ok(filter)
    }
}

#[async_trait]
impl SearchStrategy for ObjectRecordsStrategy {
    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn supports_advanced_filtering(&self) -> bool {
        true
    }

    fn supports_query_search(&self) -> bool {
        true
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<Record>> {
        let filter = self.build_filter(params)?;
        let had_filters = filter.is_some();
        let api_filter = filter.as_ref().map(Filter::to_api_value);

        match self
            .client
            .query_records(self.resource_type, api_filter, params.limit, params.offset)
            .await
        {
            Ok(records) => Ok(records),
            Err(err) if !had_filters => {
                // Plain listing: degrade to an empty result rather than
                // failing the caller.
                warn!(
                    "Plain {} listing failed, returning empty result: {}",
                    self.resource_type, err
                );
                Ok(Vec::new())
            }
            Err(err) => Err(ServiceError::invalid_filter(format!(
                "{} search filter was rejected: {}",
                self.resource_type, err
            ))),
        }
    }
}

/// Strategy for tasks. The upstream API has no server-side filtering for
/// this resource, so the full set is loaded through the cache and matched
/// in process; pagination is applied after filtering.
pub struct TaskSearchStrategy {
    client: Arc<CrmClient>,
    cache: Arc<ListCache<ApiTask>>,
}

impl TaskSearchStrategy {
    pub fn new(client: Arc<CrmClient>) -> Self {
        Self {
            client,
            cache: Arc::new(ListCache::new()),
        }
    }

    /// The strategy's cache, for invalidation after task mutations
    pub fn cache(&self) -> Arc<ListCache<ApiTask>> {
        Arc::clone(&self.cache)
    }

    fn effective_content(params: &SearchParams) -> Option<ContentQuery> {
        params.content.clone().or_else(|| {
            params.query.as_ref().map(|query| ContentQuery {
                query: query.clone(),
                fields: Vec::new(),
                match_mode: MatchMode::Partial,
                rank_by_relevance: false,
            })
        })
    }
}

fn field_text(record: &Record, field: &str) -> Option<String> {
    let value = record
        .first_value(field)
        .or_else(|| record.extra.get(field))?;
    Some(match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Match score of one record: exact field hits outweigh partial ones
fn relevance_score(record: &Record, fields: &[&str], needle: &str, mode: MatchMode) -> u32 {
    let mut score = 0;
    for field in fields {
        let Some(text) = field_text(record, field) else {
            continue;
        };
        let text = text.to_lowercase();
        if text == needle {
            score += 3;
        } else if mode == MatchMode::Partial && text.contains(needle) {
            score += 1;
        }
    }
    score
}

fn within_timeframe(timestamp: Option<DateTime<Utc>>, timeframe: &Timeframe) -> bool {
    let Some(timestamp) = timestamp else {
        return false;
    };
    let parse = |s: &str| {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    };

    if let Some(start) = timeframe.start.as_deref().and_then(parse) {
        if timestamp < start {
            return false;
        }
    }
    if let Some(end) = timeframe.end.as_deref().and_then(parse) {
        if timestamp > end {
            return false;
        }
    }
    true
}

#[async_trait]
impl SearchStrategy for TaskSearchStrategy {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Tasks
    }

    fn supports_advanced_filtering(&self) -> bool {
        false
    }

    fn supports_query_search(&self) -> bool {
        true
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<Record>> {
        let load = self
            .cache
            .get_or_load(|| async { self.client.list_tasks().await })
            .await?;
        debug!(
            "Task search over {} tasks (from_cache: {})",
            load.items.len(),
            load.from_cache
        );

        let mut records: Vec<Record> = load.items.iter().map(ApiTask::to_record).collect();

        if let Some(content) = Self::effective_content(params) {
            let fields: Vec<&str> = if content.fields.is_empty() {
                DEFAULT_TASK_FIELDS.to_vec()
            } else {
                content.fields.iter().map(String::as_str).collect()
            };
            let needle = content.query.to_lowercase();

            let mut scored: Vec<(u32, Record)> = records
                .into_iter()
                .map(|r| (relevance_score(&r, &fields, &needle, content.match_mode), r))
                .filter(|(score, _)| *score > 0)
                .collect();

            if content.rank_by_relevance {
                scored.sort_by(|a, b| b.0.cmp(&a.0));
            }
            records = scored.into_iter().map(|(_, r)| r).collect();
        }

        if let Some(timeframe) = &params.timeframe {
            records.retain(|r| within_timeframe(r.created_at, timeframe));
        }

        // Pagination after filtering, required for correctness.
        Ok(records
            .into_iter()
            .skip(params.offset)
            .take(params.limit)
            .collect())
    }
}

/// Strategy for lists. Entries are canonicalized at the boundary (including
/// the scoping-identifier precedence); query matching runs client-side.
pub struct ListSearchStrategy {
    client: Arc<CrmClient>,
}

impl ListSearchStrategy {
    pub fn new(client: Arc<CrmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchStrategy for ListSearchStrategy {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Lists
    }

    fn supports_advanced_filtering(&self) -> bool {
        false
    }

    fn supports_query_search(&self) -> bool {
        true
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<Record>> {
        let query = params
            .query
            .clone()
            .or_else(|| params.content.as_ref().map(|c| c.query.clone()));

        match query {
            None => match self.client.list_entries(params.limit, params.offset).await {
                Ok(raw) => raw.iter().map(canonicalize_list_entry).collect(),
                Err(err) => {
                    // Plain listing degrade, same contract as the object
                    // strategies.
                    warn!("Plain lists listing failed, returning empty result: {}", err);
                    Ok(Vec::new())
                }
            },
            Some(query) => {
                let raw = self
                    .client
                    .list_entries(CLIENT_FILTER_PAGE, 0)
                    .await
                    .map_err(|err| {
                        ServiceError::search_failed(format!("lists search failed: {}", err))
                    })?;

                let needle = query.to_lowercase();
                let records: Vec<Record> =
                    raw.iter().map(canonicalize_list_entry).collect::<Result<_>>()?;

                Ok(records
                    .into_iter()
                    .filter(|record| {
                        record.values.iter().any(|(_, values)| {
                            values.iter().any(|v| match &v.value {
                                Value::String(s) => s.to_lowercase().contains(&needle),
                                _ => false,
                            })
                        })
                    })
                    .skip(params.offset)
                    .take(params.limit)
                    .collect())
            }
        }
    }
}
