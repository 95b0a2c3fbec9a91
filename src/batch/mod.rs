//! Batch orchestrator
//!
//! Applies one operation across many items with windowed concurrency and
//! isolated per-item failure. Within a window all operations run in
//! parallel with all-settled semantics; a short delay separates windows to
//! respect upstream rate limits. The size ceiling and windowing protect the
//! remote API, not local invariants.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CrmConfig;
use crate::error::{Result, ServiceError};
use crate::records::Record;
use crate::search::SearchParams;

/// Maximum number of items a single batch may carry
pub const MAX_BATCH_SIZE: usize = 50;

/// Operation applied across batch items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperationType {
    Create,
    Update,
    Delete,
    Get,
    Search,
}

/// Raw batch request as supplied by the tool-call surface
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub operation_type: BatchOperationType,

    /// Record payloads, for create/update
    #[serde(default)]
    pub records: Option<Vec<Value>>,

    /// Record identifiers, for delete/get
    #[serde(default)]
    pub ids: Option<Vec<String>>,

    /// Search parameters, for search
    #[serde(default)]
    pub params: Option<SearchParams>,
}

/// A validated batch operation
#[derive(Debug, Clone)]
pub enum BatchOperation {
    Create { records: Vec<Value> },
    Update { records: Vec<Value> },
    Delete { ids: Vec<String> },
    Get { ids: Vec<String> },
    Search { params: SearchParams },
}

impl BatchRequest {
    /// Validate the payload shape against the operation type.
    ///
    /// create/update require a records array; delete/get require an id
    /// array; search requires parameters. Mismatches are precondition
    /// errors raised before any network call.
    pub fn into_operation(self) -> Result<BatchOperation> {
        match self.operation_type {
            BatchOperationType::Create => {
                let records = self.records.ok_or_else(|| {
                    ServiceError::validation("Batch create requires a records array")
                })?;
                Ok(BatchOperation::Create { records })
            }
            BatchOperationType::Update => {
                let records = self.records.ok_or_else(|| {
                    ServiceError::validation("Batch update requires a records array")
                })?;
                Ok(BatchOperation::Update { records })
            }
            BatchOperationType::Delete => {
                let ids = self.ids.ok_or_else(|| {
                    ServiceError::validation("Batch delete requires an id array")
                })?;
                Ok(BatchOperation::Delete { ids })
            }
            BatchOperationType::Get => {
                let ids = self
                    .ids
                    .ok_or_else(|| ServiceError::validation("Batch get requires an id array"))?;
                Ok(BatchOperation::Get { ids })
            }
            BatchOperationType::Search => {
                let params = self.params.ok_or_else(|| {
                    ServiceError::validation("Batch search requires search parameters")
                })?;
                Ok(BatchOperation::Search { params })
            }
        }
    }
}

impl BatchOperation {
    /// Number of itemized inputs (search is not itemized)
    pub fn item_count(&self) -> usize {
        match self {
            BatchOperation::Create { records } | BatchOperation::Update { records } => {
                records.len()
            }
            BatchOperation::Delete { ids } | BatchOperation::Get { ids } => ids.len(),
            BatchOperation::Search { .. } => 1,
        }
    }
}

/// Per-item batch outcome, correlated with the original input
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The original input item, for correlation
    pub input: Value,
}

impl BatchItemResult {
    pub fn ok(input: Value, record: Option<Record>) -> Self {
        Self {
            success: true,
            record,
            error: None,
            input,
        }
    }

    pub fn failure(input: Value, error: impl Into<String>) -> Self {
        Self {
            success: false,
            record: None,
            error: Some(error.into()),
            input,
        }
    }
}

/// Outcome of a batch request.
///
/// Itemized operations yield one result per input, in input order; search
/// is not itemized and yields its record list directly.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchOutcome {
    Items(Vec<BatchItemResult>),
    Records(Vec<Record>),
}

impl BatchOutcome {
    /// Per-item results, for itemized operations
    pub fn items(&self) -> Option<&[BatchItemResult]> {
        match self {
            BatchOutcome::Items(items) => Some(items),
            BatchOutcome::Records(_) => None,
        }
    }

    /// The record list, for search
    pub fn records(&self) -> Option<&[Record]> {
        match self {
            BatchOutcome::Records(records) => Some(records),
            BatchOutcome::Items(_) => None,
        }
    }
}

/// Runs one operation across many items with windowed concurrency
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    window_size: usize,
    window_delay: Duration,
}

impl Default for BatchOrchestrator {
    fn default() -> Self {
        let defaults = CrmConfig::default();
        Self::new(
            defaults.batch_window_size,
            Duration::from_millis(defaults.batch_window_delay_ms),
        )
    }
}

impl BatchOrchestrator {
    pub fn new(window_size: usize, window_delay: Duration) -> Self {
        Self {
            window_size: window_size.max(1),
            window_delay,
        }
    }

    pub fn from_config(config: &CrmConfig) -> Self {
        Self::new(
            config.batch_window_size,
            Duration::from_millis(config.batch_window_delay_ms),
        )
    }

    /// Apply `op` to every item.
    ///
    /// The size ceiling is enforced before any operation is dispatched.
    /// Items are grouped into fixed-size windows; within a window all
    /// operations run in parallel and are awaited together, so one item's
    /// rejection never affects any other item's outcome. Output order
    /// mirrors input order regardless of intra-window completion order.
    pub async fn run_each<F, Fut>(&self, items: Vec<Value>, op: F) -> Result<Vec<BatchItemResult>>
    where
        F: Fn(usize, Value) -> Fut,
        Fut: Future<Output = Result<Option<Record>>>,
    {
        if items.len() > MAX_BATCH_SIZE {
            return Err(ServiceError::validation(format!(
                "Batch size {} exceeds the maximum of {} items",
                items.len(),
                MAX_BATCH_SIZE
            )));
        }

        let indexed: Vec<(usize, Value)> = items.into_iter().enumerate().collect();
        let mut results = Vec::with_capacity(indexed.len());

        for (window_index, window) in indexed.chunks(self.window_size).enumerate() {
            if window_index > 0 && !self.window_delay.is_zero() {
                tokio::time::sleep(self.window_delay).await;
            }

            let window_futures = window.iter().map(|(index, input)| {
                let outcome = op(*index, input.clone());
                let input = input.clone();
                async move {
                    match outcome.await {
                        Ok(record) => BatchItemResult::ok(input, record),
                        Err(err) => BatchItemResult::failure(input, err.to_string()),
                    }
                }
            });

            results.extend(futures::future::join_all(window_futures).await);
        }

        Ok(results)
    }
}
