//! Error handling for the CRM SDK
//!
//! This module provides a comprehensive error system that:
//! - Categorizes errors by type (validation, not-found, filter, etc.)
//! - Adds operation context to errors for diagnostics and enhancement
//! - Maps upstream CRM error envelopes to normalized variants
//! - Provides a convenient Result type alias

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::registry::{OperationKind, ResourceType};

pub mod mapping;

/// Result type for CRM SDK operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Main error type for the CRM SDK
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Request validation errors (bad payloads, missing required fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness conflicts on create/update
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Record reference constraint errors (bad target object/record)
    #[error("Reference constraint error: {0}")]
    ReferenceConstraint(String),

    /// Structured filter errors raised by search
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Attribute schema lookups that came back empty
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    /// Create operations that failed after enhancement
    #[error("Failed to create record: {0}")]
    CreateFailed(String),

    /// Update operations that failed after enhancement
    #[error("Failed to update record: {0}")]
    UpdateFailed(String),

    /// Delete operations that failed after enhancement
    #[error("Failed to delete record: {0}")]
    DeleteFailed(String),

    /// Search operations that failed after enhancement
    #[error("Search failed: {0}")]
    SearchFailed(String),

    /// Network or connection errors
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Response parsing errors
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unexpected or internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Errors with additional operation context
    #[error("{inner}")]
    WithContext {
        inner: Box<ServiceError>,
        context: ErrorContext,
    },
}

impl ServiceError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    /// Create a duplicate record error
    pub fn duplicate(message: impl Into<String>) -> Self {
        ServiceError::Duplicate(message.into())
    }

    /// Create a reference constraint error
    pub fn reference_constraint(message: impl Into<String>) -> Self {
        ServiceError::ReferenceConstraint(message.into())
    }

    /// Create an invalid filter error
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        ServiceError::InvalidFilter(message.into())
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        ServiceError::Timeout(message.into())
    }

    /// Create an attribute not found error
    pub fn attribute_not_found(message: impl Into<String>) -> Self {
        ServiceError::AttributeNotFound(message.into())
    }

    /// Create a create-failed error
    pub fn create_failed(message: impl Into<String>) -> Self {
        ServiceError::CreateFailed(message.into())
    }

    /// Create an update-failed error
    pub fn update_failed(message: impl Into<String>) -> Self {
        ServiceError::UpdateFailed(message.into())
    }

    /// Create a delete-failed error
    pub fn delete_failed(message: impl Into<String>) -> Self {
        ServiceError::DeleteFailed(message.into())
    }

    /// Create a search-failed error
    pub fn search_failed(message: impl Into<String>) -> Self {
        ServiceError::SearchFailed(message.into())
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        ServiceError::Network(message.into())
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        ServiceError::Authentication(message.into())
    }

    /// Create a rate limit error
    pub fn rate_limit(message: impl Into<String>) -> Self {
        ServiceError::RateLimit(message.into())
    }

    /// Create a parsing error
    pub fn parsing(message: impl Into<String>) -> Self {
        ServiceError::Parsing(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }

    /// Add context to an existing error
    pub fn with_context(self, context: ErrorContext) -> Self {
        ServiceError::WithContext {
            inner: Box::new(self),
            context,
        }
    }

    /// Get the attached context, if any
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            ServiceError::WithContext { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ServiceError::WithContext { context, .. } => context.status_code,
            _ => None,
        }
    }

    /// Unwrap any context layers and return the underlying error
    pub fn root(&self) -> &ServiceError {
        match self {
            ServiceError::WithContext { inner, .. } => inner.root(),
            other => other,
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Network(_) => true,
            ServiceError::Timeout(_) => true,
            ServiceError::RateLimit(_) => true,
            ServiceError::WithContext { inner, .. } => inner.is_retryable(),
            _ => false,
        }
    }

    /// Check if this is a permanent error (not retryable)
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }
}

/// A single structured validation failure from the upstream error envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationDetail {
    /// Attribute the failure refers to, when the API names one
    #[serde(default)]
    pub field: Option<String>,

    /// Upstream message for this failure
    #[serde(default)]
    pub message: Option<String>,
}

/// Operation context threaded through error handling and enhancement.
///
/// The context is built at the call site that owns the operation and passed
/// unmodified through the enhancer chain.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Verb that was being performed
    pub operation: Option<OperationKind>,

    /// Resource the operation targeted
    pub resource_type: Option<ResourceType>,

    /// Record payload that was submitted, if any
    pub record_data: Option<Value>,

    /// Record identifier, when the operation addressed one record
    pub record_id: Option<String>,

    /// HTTP status code if applicable
    pub status_code: Option<u16>,

    /// Structured validation failures from the upstream envelope
    pub validation_errors: Vec<ValidationDetail>,
}

impl ErrorContext {
    /// Create an empty error context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context for a specific operation against a resource
    pub fn for_operation(operation: OperationKind, resource_type: ResourceType) -> Self {
        Self {
            operation: Some(operation),
            resource_type: Some(resource_type),
            ..Self::default()
        }
    }

    /// Attach the submitted record payload
    pub fn record_data(mut self, data: Value) -> Self {
        self.record_data = Some(data);
        self
    }

    /// Attach the record identifier
    pub fn record_id(mut self, id: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    /// Attach an HTTP status code
    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Attach structured validation failures
    pub fn validation_errors(mut self, errors: Vec<ValidationDetail>) -> Self {
        self.validation_errors = errors;
        self
    }
}

/// Convert reqwest errors to ServiceError
impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        let service_error = if err.is_timeout() {
            ServiceError::timeout(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ServiceError::network(format!("Connection error: {}", err))
        } else if err.is_request() {
            ServiceError::validation(format!("Invalid request: {}", err))
        } else if err.is_redirect() {
            ServiceError::network(format!("Too many redirects: {}", err))
        } else if err.is_decode() {
            ServiceError::parsing(format!("Response decode error: {}", err))
        } else {
            ServiceError::internal(format!("HTTP client error: {}", err))
        };

        if let Some(status) = err.status() {
            service_error.with_context(ErrorContext::new().status_code(status.as_u16()))
        } else {
            service_error
        }
    }
}

/// Convert serde_json errors to ServiceError
impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::parsing(format!("JSON error: {}", err))
    }
}
