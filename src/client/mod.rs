//! CRM transport client
//!
//! A generic `request(method, path, body)` transport over the CRM REST API.
//! The only coupling to the upstream wire format is the envelope shape:
//! records arrive under `data`, attribute values as arrays of `{value}`.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{header, Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{CrmConfig, DEFAULT_PROVIDER};
use crate::error::{mapping, ErrorContext, Result, ServiceError};
use crate::records::{ApiTask, Record};
use crate::registry::ResourceType;
use crate::resilience::{RetryConfig, RetryExecutor};

/// Default user agent string
const DEFAULT_USER_AGENT: &str = concat!("crm-sdk/", env!("CARGO_PKG_VERSION"));

/// One selectable option of a select/status attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionItem {
    pub id: String,
    pub title: String,
}

/// Valid options for a select/status attribute
#[derive(Debug, Clone)]
pub struct FieldOptions {
    pub options: Vec<OptionItem>,
    pub attribute_type: String,
}

/// Attribute schema entry as exposed by discovery operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub api_slug: String,
    pub title: String,
    #[serde(rename = "type", alias = "attribute_type")]
    pub attribute_type: String,
    #[serde(default)]
    pub is_required: bool,
}

/// Attribute options lookup collaborator.
///
/// Used only by the option-listing error enhancers; lookup failures must
/// degrade the caller to its non-networked fallback, never propagate.
#[async_trait]
pub trait AttributeOptions: Send + Sync {
    async fn get_options(&self, resource_type: ResourceType, field: &str) -> Result<FieldOptions>;
}

/// HTTP client for the CRM API
pub struct CrmClient {
    http: Client,
    config: CrmConfig,
    retry: RetryExecutor,
}

impl CrmClient {
    /// Create a client from explicit configuration
    pub fn new(config: CrmConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(DEFAULT_USER_AGENT),
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .build()
            .map_err(|e| {
                ServiceError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            config,
            retry: RetryExecutor::default(),
        })
    }

    /// Create a client from the default environment provider
    pub fn from_env() -> Result<Self> {
        let config = CrmConfig::from_provider(&**DEFAULT_PROVIDER)?;
        Self::new(config)
    }

    /// Create a new builder
    pub fn builder() -> CrmClientBuilder {
        CrmClientBuilder::default()
    }

    /// The client configuration
    pub fn config(&self) -> &CrmConfig {
        &self.config
    }

    /// Execute a request against the API and return the parsed JSON body.
    ///
    /// Retryable failures (network, timeout, rate limit) are retried with
    /// backoff; everything else surfaces immediately.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        self.retry
            .execute(|| self.send_once(method.clone(), &url, body))
            .await
    }

    async fn send_once(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let request_id = crate::util::generate_request_id();
        debug!("CRM request {}: {} {}", request_id, method, url);

        let mut builder = self
            .http
            .request(method, url)
            .bearer_auth(&self.config.api_key);

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            if status == StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }
            let text = response.text().await?;
            if text.is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text)
                .map_err(|e| ServiceError::parsing(format!("Failed to parse response: {}", e)))
        } else {
            let body_text = match response.text().await {
                Ok(text) => text,
                Err(e) => format!("Failed to read error response: {}", e),
            };
            let mut context = ErrorContext::new();
            let error = mapping::map_http_error(status, &body_text, &mut context);
            Err(error.with_context(context))
        }
    }

    /// GET helper
    pub async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, None).await
    }

    /// POST helper
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// PATCH helper
    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    /// DELETE helper
    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.request(Method::DELETE, path, None).await
    }

    /// Query records through the server-side filtered endpoint
    pub async fn query_records(
        &self,
        resource_type: ResourceType,
        filter: Option<Value>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>> {
        let mut body = serde_json::json!({ "limit": limit, "offset": offset });
        if let Some(filter) = filter {
            body["filter"] = filter;
        }

        let path = format!("{}/query", resource_type.endpoint());
        let response = self.post(&path, &body).await?;
        parse_record_list(&response)
    }

    /// Fetch a single record by id
    pub async fn get_record(&self, resource_type: ResourceType, record_id: &str) -> Result<Record> {
        let path = format!("{}/{}", resource_type.endpoint(), record_id);
        let response = self.get(&path).await?;
        parse_single_record(&response)
    }

    /// Create a record from an attribute-values payload
    pub async fn create_record(&self, resource_type: ResourceType, values: &Value) -> Result<Record> {
        let body = serde_json::json!({ "data": { "values": values } });
        let response = self.post(&resource_type.endpoint(), &body).await?;
        parse_single_record(&response)
    }

    /// Update a record's attribute values
    pub async fn update_record(
        &self,
        resource_type: ResourceType,
        record_id: &str,
        values: &Value,
    ) -> Result<Record> {
        let body = serde_json::json!({ "data": { "values": values } });
        let path = format!("{}/{}", resource_type.endpoint(), record_id);
        let response = self.patch(&path, &body).await?;
        parse_single_record(&response)
    }

    /// Delete a record by id
    pub async fn delete_record(&self, resource_type: ResourceType, record_id: &str) -> Result<()> {
        let path = format!("{}/{}", resource_type.endpoint(), record_id);
        self.delete(&path).await?;
        Ok(())
    }

    /// Load the full task set. The task API has no server-side filtering.
    pub async fn list_tasks(&self) -> Result<Vec<ApiTask>> {
        let response = self.get(ResourceType::Tasks.endpoint().as_str()).await?;
        let items = data_array(&response)?;

        items
            .iter()
            .map(|item| {
                serde_json::from_value(item.clone())
                    .map_err(|e| ServiceError::parsing(format!("Failed to parse task: {}", e)))
            })
            .collect()
    }

    /// Load raw list entries (canonicalized by the list strategy)
    pub async fn list_entries(&self, limit: usize, offset: usize) -> Result<Vec<Value>> {
        let path = format!(
            "{}?limit={}&offset={}",
            ResourceType::Lists.endpoint(),
            limit,
            offset
        );
        let response = self.get(&path).await?;
        Ok(data_array(&response)?.to_vec())
    }

    /// Fetch the attribute schema for an object resource.
    ///
    /// Resources outside the object-records API have fixed schemas, which
    /// are reported without a network call.
    pub async fn list_attributes(&self, resource_type: ResourceType) -> Result<Vec<AttributeSchema>> {
        if !resource_type.supports_object_records_api() {
            return Ok(builtin_schema(resource_type));
        }

        let path = format!("objects/{}/attributes", resource_type.plural_name());
        let response = self.get(&path).await?;
        let items = data_array(&response)?;

        let mut schema = Vec::with_capacity(items.len());
        for item in items {
            let api_slug = item
                .get("api_slug")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            schema.push(AttributeSchema {
                title: item
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&api_slug)
                    .to_string(),
                attribute_type: item
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                is_required: item
                    .get("is_required")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                api_slug,
            });
        }
        Ok(schema)
    }
}

#[async_trait]
impl AttributeOptions for CrmClient {
    async fn get_options(&self, resource_type: ResourceType, field: &str) -> Result<FieldOptions> {
        if !resource_type.supports_object_records_api() {
            return Err(ServiceError::attribute_not_found(format!(
                "{} attributes have no selectable options",
                resource_type
            )));
        }

        let base = format!("objects/{}/attributes/{}", resource_type.plural_name(), field);

        // Select attributes expose /options, status attributes /statuses.
        let (response, attribute_type) = match self.get(&format!("{}/options", base)).await {
            Ok(response) => (response, "select"),
            Err(first_err) => match self.get(&format!("{}/statuses", base)).await {
                Ok(response) => (response, "status"),
                Err(_) => return Err(first_err),
            },
        };

        let items = data_array(&response)?;
        let options = items
            .iter()
            .filter_map(|item| {
                let title = item.get("title").and_then(|v| v.as_str())?;
                let id = match item.get("id") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Object(id)) => id
                        .values()
                        .find_map(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    _ => String::new(),
                };
                Some(OptionItem {
                    id,
                    title: title.to_string(),
                })
            })
            .collect::<Vec<_>>();

        if options.is_empty() {
            warn!("Attribute {}/{} returned no options", resource_type, field);
        }

        Ok(FieldOptions {
            options,
            attribute_type: attribute_type.to_string(),
        })
    }
}

fn data_array(response: &Value) -> Result<&Vec<Value>> {
    response
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ServiceError::parsing("Response is missing the data array"))
}

/// Parse a `data` array of records from a query response
pub fn parse_record_list(response: &Value) -> Result<Vec<Record>> {
    data_array(response)?.iter().map(Record::from_api_value).collect()
}

/// Parse a single record from a `data` object response
pub fn parse_single_record(response: &Value) -> Result<Record> {
    let data = response
        .get("data")
        .ok_or_else(|| ServiceError::parsing("Response is missing the data object"))?;
    Record::from_api_value(data)
}

fn builtin_schema(resource_type: ResourceType) -> Vec<AttributeSchema> {
    let fields: &[(&str, &str)] = match resource_type {
        ResourceType::Tasks => &[
            ("content", "text"),
            ("status", "status"),
            ("due_date", "date"),
            ("assignee", "actor-reference"),
        ],
        ResourceType::Lists => &[
            ("name", "text"),
            ("parent_record_id", "record-reference"),
        ],
        _ => &[],
    };

    fields
        .iter()
        .map(|(slug, attr_type)| AttributeSchema {
            api_slug: slug.to_string(),
            title: slug.to_string(),
            attribute_type: attr_type.to_string(),
            is_required: false,
        })
        .collect()
}

/// Builder for the CRM client
#[derive(Default)]
pub struct CrmClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
    batch_window_size: Option<usize>,
    batch_window_delay_ms: Option<u64>,
    retry_config: Option<RetryConfig>,
}

impl CrmClientBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the timeout in seconds
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Set the batch window size
    pub fn batch_window_size(mut self, size: usize) -> Self {
        self.batch_window_size = Some(size);
        self
    }

    /// Set the delay between batch windows
    pub fn batch_window_delay_ms(mut self, delay_ms: u64) -> Self {
        self.batch_window_delay_ms = Some(delay_ms);
        self
    }

    /// Set retry configuration
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<CrmClient> {
        let mut config = CrmConfig::from_provider(&**DEFAULT_PROVIDER).unwrap_or_default();

        if let Some(api_key) = self.api_key {
            config.api_key = api_key;
        }
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(timeout) = self.timeout_seconds {
            config.timeout_seconds = timeout;
        }
        if let Some(size) = self.batch_window_size {
            config.batch_window_size = size;
        }
        if let Some(delay) = self.batch_window_delay_ms {
            config.batch_window_delay_ms = delay;
        }

        let mut client = CrmClient::new(config)?;
        if let Some(retry_config) = self.retry_config {
            client.retry = RetryExecutor::new(retry_config);
        }
        Ok(client)
    }
}
