//! High-level CRM service
//!
//! The verb surface consumed by the tool-call layer. Every mutation failure
//! runs through the enhancement pipeline before it is surfaced, so callers
//! always see actionable diagnostics instead of raw upstream envelopes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::batch::{BatchOperation, BatchOrchestrator, BatchOutcome, BatchRequest};
use crate::client::{AttributeOptions, AttributeSchema, CrmClient};
use crate::enhance::{EnhancerPipeline, ErrorSignal};
use crate::error::{ErrorContext, Result, ServiceError};
use crate::records::{ApiTask, Record};
use crate::registry::{OperationKind, ResourceType};
use crate::search::{
    ContentQuery, Filter, ListCache, ListSearchStrategy, ObjectRecordsStrategy, RelationshipQuery,
    SearchDispatcher, SearchParams, SearchStrategy, SearchType, TaskSearchStrategy, Timeframe,
};

/// Attributes holding record references, for simplified-form conversion
const REFERENCE_ATTRIBUTES: &[&str] = &[
    "company",
    "companies",
    "person",
    "people",
    "associated_people",
    "associated_company",
    "associated_deals",
    "main_contact",
    "parent_record",
    "deal",
];

/// Detail projection groups served by [`CrmService::get_detailed_info`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoType {
    Contact,
    Business,
    Social,
}

impl InfoType {
    /// Attributes projected for this group
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            InfoType::Contact => &["email_addresses", "phone_numbers", "primary_location"],
            InfoType::Business => &[
                "name",
                "domains",
                "industry",
                "categories",
                "estimated_arr_usd",
                "employee_range",
                "stage",
                "value",
            ],
            InfoType::Social => &["linkedin", "twitter", "facebook", "instagram", "angellist"],
        }
    }
}

fn reference_target_object(attribute: &str) -> &'static str {
    match attribute.trim().to_lowercase().as_str() {
        "company" | "companies" | "associated_company" => "companies",
        "person" | "people" | "associated_people" | "main_contact" => "people",
        "deal" | "associated_deals" => "deals",
        _ => "records",
    }
}

fn transform_reference_entry(attribute: &str, entry: &Value) -> Value {
    match entry {
        // Bare id string.
        Value::String(id) => json!({
            "target_object": reference_target_object(attribute),
            "target_record_id": id,
        }),
        Value::Object(map) => {
            if map.contains_key("target_record_id") {
                return entry.clone();
            }
            // Legacy {"record_id": "..."} shape.
            match map.get("record_id").and_then(|v| v.as_str()) {
                Some(id) => json!({
                    "target_object": reference_target_object(attribute),
                    "target_record_id": id,
                }),
                None => entry.clone(),
            }
        }
        other => other.clone(),
    }
}

/// Convert simplified record-reference forms into the structured
/// `{target_object, target_record_id}` shape the API requires.
///
/// Bare id strings and legacy `{"record_id"}` objects are converted, both
/// top-level and under a `values` sub-object; already-structured references
/// and non-reference attributes pass through untouched.
pub fn transform_record_references(data: &Value) -> Value {
    fn transform_map(map: &Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::with_capacity(map.len());
        for (key, value) in map {
            if key == "values" {
                if let Value::Object(nested) = value {
                    out.insert(key.clone(), Value::Object(transform_map(nested)));
                    continue;
                }
            }
            if !REFERENCE_ATTRIBUTES.contains(&key.trim().to_lowercase().as_str()) {
                out.insert(key.clone(), value.clone());
                continue;
            }
            let transformed = match value {
                Value::Array(entries) => Value::Array(
                    entries
                        .iter()
                        .map(|entry| transform_reference_entry(key, entry))
                        .collect(),
                ),
                other => transform_reference_entry(key, other),
            };
            out.insert(key.clone(), transformed);
        }
        out
    }

    match data {
        Value::Object(map) => Value::Object(transform_map(map)),
        other => other.clone(),
    }
}

/// The CRM service: dispatcher, orchestrator and enhancement pipeline over
/// a shared transport client
pub struct CrmService {
    client: Arc<CrmClient>,
    dispatcher: SearchDispatcher,
    orchestrator: BatchOrchestrator,
    pipeline: EnhancerPipeline,
    task_cache: Arc<ListCache<ApiTask>>,
}

impl CrmService {
    /// Build the service with the standard strategy and enhancer sets
    pub fn new(client: Arc<CrmClient>) -> Self {
        let orchestrator = BatchOrchestrator::from_config(client.config());

        let task_strategy = TaskSearchStrategy::new(Arc::clone(&client));
        let task_cache = task_strategy.cache();

        let mut strategies: Vec<Arc<dyn SearchStrategy>> = vec![
            Arc::new(task_strategy),
            Arc::new(ListSearchStrategy::new(Arc::clone(&client))),
        ];
        for resource_type in ResourceType::ALL {
            if resource_type.supports_object_records_api() {
                strategies.push(Arc::new(ObjectRecordsStrategy::new(
                    resource_type,
                    Arc::clone(&client),
                )));
            }
        }

        let options: Arc<dyn AttributeOptions> = Arc::clone(&client) as Arc<dyn AttributeOptions>;

        Self {
            client,
            dispatcher: SearchDispatcher::with_strategies(strategies),
            orchestrator,
            pipeline: EnhancerPipeline::standard(options),
            task_cache,
        }
    }

    /// Build the service from the default environment provider
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Arc::new(CrmClient::from_env()?)))
    }

    /// The underlying transport client
    pub fn client(&self) -> &Arc<CrmClient> {
        &self.client
    }

    /// Run an error through the pipeline, folding any upstream context
    /// (status code, structured validation failures) into the operation
    /// context first.
    async fn enhanced_failure(
        &self,
        err: ServiceError,
        mut context: ErrorContext,
    ) -> (String, ErrorContext) {
        if let Some(upstream) = err.context() {
            context.status_code = context.status_code.or(upstream.status_code);
            if context.validation_errors.is_empty() {
                context.validation_errors = upstream.validation_errors.clone();
            }
        }

        let signal = ErrorSignal::from_error(&err);
        let message = self.pipeline.enhance(&signal, &context).await;
        (message, context)
    }

    async fn invalidate_task_cache(&self, resource_type: ResourceType) {
        if resource_type == ResourceType::Tasks {
            self.task_cache.invalidate().await;
        }
    }

    /// Create a record from an attribute-values payload.
    ///
    /// Simplified record references are converted before dispatch; failures
    /// surface as `CreateFailed` carrying the enhanced diagnostic.
    pub async fn create_record(
        &self,
        resource_type: ResourceType,
        values: Value,
    ) -> Result<Record> {
        let values = transform_record_references(&values);

        match self.client.create_record(resource_type, &values).await {
            Ok(record) => {
                self.invalidate_task_cache(resource_type).await;
                Ok(record)
            }
            Err(err) => {
                let context = ErrorContext::for_operation(OperationKind::Create, resource_type)
                    .record_data(values);
                let (message, context) = self.enhanced_failure(err, context).await;
                Err(ServiceError::create_failed(message).with_context(context))
            }
        }
    }

    /// Update a record's attribute values
    pub async fn update_record(
        &self,
        resource_type: ResourceType,
        record_id: &str,
        values: Value,
    ) -> Result<Record> {
        let values = transform_record_references(&values);

        match self
            .client
            .update_record(resource_type, record_id, &values)
            .await
        {
            Ok(record) => {
                self.invalidate_task_cache(resource_type).await;
                Ok(record)
            }
            Err(err) => {
                let context = ErrorContext::for_operation(OperationKind::Update, resource_type)
                    .record_id(record_id)
                    .record_data(values);
                let (message, context) = self.enhanced_failure(err, context).await;
                Err(ServiceError::update_failed(message).with_context(context))
            }
        }
    }

    /// Delete a record. A missing record surfaces as `NotFound`, every
    /// other failure as `DeleteFailed`.
    pub async fn delete_record(&self, resource_type: ResourceType, record_id: &str) -> Result<()> {
        match self.client.delete_record(resource_type, record_id).await {
            Ok(()) => {
                self.invalidate_task_cache(resource_type).await;
                Ok(())
            }
            Err(err) => {
                if matches!(err.root(), ServiceError::NotFound(_)) {
                    return Err(err);
                }
                let context = ErrorContext::for_operation(OperationKind::Delete, resource_type)
                    .record_id(record_id);
                let (message, context) = self.enhanced_failure(err, context).await;
                Err(ServiceError::delete_failed(message).with_context(context))
            }
        }
    }

    /// Fetch a single record by id
    pub async fn get_record_details(
        &self,
        resource_type: ResourceType,
        record_id: &str,
    ) -> Result<Record> {
        self.client.get_record(resource_type, record_id).await
    }

    /// Run a search with explicit parameters
    pub async fn search(&self, params: &SearchParams) -> Result<Vec<Record>> {
        self.dispatcher.search(params).await
    }

    /// Free-text query search; a `None` query is a plain listing
    pub async fn search_records(
        &self,
        resource_type: ResourceType,
        query: Option<String>,
    ) -> Result<Vec<Record>> {
        let mut params = SearchParams::empty(resource_type);
        params.query = query;
        self.search(&params).await
    }

    /// Structured-filter search
    pub async fn advanced_search(
        &self,
        resource_type: ResourceType,
        filters: Filter,
    ) -> Result<Vec<Record>> {
        let mut params = SearchParams::empty(resource_type);
        params.filters = Some(filters);
        params.search_type = Some(SearchType::Advanced);
        self.search(&params).await
    }

    /// Content search over a configurable field list
    pub async fn search_by_content(
        &self,
        resource_type: ResourceType,
        content: ContentQuery,
    ) -> Result<Vec<Record>> {
        let mut params = SearchParams::empty(resource_type);
        params.content = Some(content);
        params.search_type = Some(SearchType::Content);
        self.search(&params).await
    }

    /// Date-bounded search
    pub async fn search_by_timeframe(
        &self,
        resource_type: ResourceType,
        timeframe: Timeframe,
    ) -> Result<Vec<Record>> {
        let mut params = SearchParams::empty(resource_type);
        params.timeframe = Some(timeframe);
        params.search_type = Some(SearchType::Timeframe);
        self.search(&params).await
    }

    /// Relationship traversal search
    pub async fn search_by_relationship(
        &self,
        resource_type: ResourceType,
        relationship: RelationshipQuery,
    ) -> Result<Vec<Record>> {
        let mut params = SearchParams::empty(resource_type);
        params.relationship = Some(relationship);
        params.search_type = Some(SearchType::Relationship);
        self.search(&params).await
    }

    /// Run a batch request through the orchestrator.
    ///
    /// Per-item failures are isolated into their result slots; only shape
    /// and size precondition violations fail the batch as a whole. Search
    /// is not itemized: it returns its record list directly and a search
    /// failure raises.
    pub async fn batch_operations(
        &self,
        resource_type: ResourceType,
        request: BatchRequest,
    ) -> Result<BatchOutcome> {
        let operation = request.into_operation()?;
        log::debug!(
            "Batch {} over {} items on {}",
            match &operation {
                BatchOperation::Create { .. } => "create",
                BatchOperation::Update { .. } => "update",
                BatchOperation::Delete { .. } => "delete",
                BatchOperation::Get { .. } => "get",
                BatchOperation::Search { .. } => "search",
            },
            operation.item_count(),
            resource_type
        );

        let results = match operation {
            BatchOperation::Create { records } => {
                self.orchestrator
                    .run_each(records, |_, input| async move {
                        self.create_record(resource_type, values_payload(&input))
                            .await
                            .map(Some)
                    })
                    .await?
            }
            BatchOperation::Update { records } => {
                self.orchestrator
                    .run_each(records, |_, input| async move {
                        self.update_item(resource_type, input).await
                    })
                    .await?
            }
            BatchOperation::Delete { ids } => {
                let items = ids.into_iter().map(Value::String).collect();
                self.orchestrator
                    .run_each(items, |_, input| async move {
                        let id = id_from_input(&input)?;
                        self.delete_record(resource_type, &id).await?;
                        Ok(None)
                    })
                    .await?
            }
            BatchOperation::Get { ids } => {
                let items = ids.into_iter().map(Value::String).collect();
                self.orchestrator
                    .run_each(items, |_, input| async move {
                        let id = id_from_input(&input)?;
                        self.get_record_details(resource_type, &id).await.map(Some)
                    })
                    .await?
            }
            BatchOperation::Search { params } => {
                return self.search(&params).await.map(BatchOutcome::Records);
            }
        };
        Ok(BatchOutcome::Items(results))
    }

    async fn update_item(
        &self,
        resource_type: ResourceType,
        input: Value,
    ) -> Result<Option<Record>> {
        let id = input
            .get("id")
            .or_else(|| input.get("record_id"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| {
                ServiceError::validation("Batch update items require an id or record_id field")
            })?;

        let values = match input.get("values") {
            Some(values) => values.clone(),
            None => {
                // Everything except the identifier keys is the payload.
                let mut map = input.as_object().cloned().unwrap_or_default();
                map.remove("id");
                map.remove("record_id");
                Value::Object(map)
            }
        };

        self.update_record(resource_type, &id, values).await.map(Some)
    }

    /// Attribute schema for a resource; with a record id, the attributes
    /// actually populated on that record.
    pub async fn get_attributes(
        &self,
        resource_type: ResourceType,
        record_id: Option<&str>,
    ) -> Result<Vec<AttributeSchema>> {
        let Some(record_id) = record_id else {
            return self.client.list_attributes(resource_type).await;
        };

        let record = self.get_record_details(resource_type, record_id).await?;
        Ok(record
            .values
            .iter()
            .map(|(name, values)| AttributeSchema {
                api_slug: name.clone(),
                title: name.clone(),
                attribute_type: values
                    .first()
                    .and_then(|v| v.attribute_type.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
                is_required: false,
            })
            .collect())
    }

    /// Attribute name to attribute-type mapping for a resource
    pub async fn discover_attributes(
        &self,
        resource_type: ResourceType,
    ) -> Result<BTreeMap<String, String>> {
        let schema = self.client.list_attributes(resource_type).await?;
        Ok(schema
            .into_iter()
            .map(|attribute| (attribute.api_slug, attribute.attribute_type))
            .collect())
    }

    /// Project one detail group (contact, business, social) of a record
    pub async fn get_detailed_info(
        &self,
        resource_type: ResourceType,
        record_id: &str,
        info_type: InfoType,
    ) -> Result<Value> {
        let record = self.get_record_details(resource_type, record_id).await?;

        let mut projection = Map::new();
        for field in info_type.fields() {
            if let Some(value) = record.first_value(field) {
                projection.insert((*field).to_string(), value.clone());
            }
        }

        Ok(json!({
            "record_id": record.id.record_id,
            "info_type": info_type,
            "values": Value::Object(projection),
        }))
    }
}

/// Items may carry their attribute values either bare or under a
/// `values` envelope.
fn values_payload(input: &Value) -> Value {
    input.get("values").cloned().unwrap_or_else(|| input.clone())
}

fn id_from_input(input: &Value) -> Result<String> {
    input
        .as_str()
        .map(String::from)
        .ok_or_else(|| ServiceError::validation("Batch id items must be strings"))
}
