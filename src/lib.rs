//! # CRM SDK
//!
//! An adapter layer between tool-call interfaces and a CRM REST API.
//!
//! This crate provides:
//!
//! - A resource registry and canonical record model over the CRM's
//!   resource kinds (companies, people, lists, records, deals, tasks)
//! - A search strategy system: one algorithm per resource kind behind a
//!   common capability interface, selected by a dispatcher
//! - A batch orchestrator with windowed concurrency and per-item failure
//!   isolation
//! - An error classification and enhancement pipeline that turns opaque
//!   upstream failures into actionable diagnostics
//! - Resilience patterns (retry with exponential backoff) and
//!   configuration management utilities
//!
//! ## Architecture
//!
//! The SDK is designed around the following key abstractions:
//!
//! - `CrmClient`: the HTTP transport over the CRM REST API
//! - `CrmService`: the verb surface (create/update/delete/get/search/batch)
//! - `SearchStrategy` / `SearchDispatcher`: resource-specific search
//! - `BatchOrchestrator`: windowed, failure-isolated bulk execution
//! - `ErrorEnhancer` / `EnhancerPipeline`: failure diagnostics
//! - `ServiceError`: the error taxonomy shared by every layer

// Registry and canonical data model
pub mod records;
pub mod registry;
pub use records::{ApiTask, Record, RecordId, RecordValue, TaskIdentifier};
pub use registry::{OperationKind, ResourceType};

// Transport and verb surface
pub mod client;
pub mod service;
pub use client::{AttributeOptions, AttributeSchema, CrmClient, CrmClientBuilder, FieldOptions, OptionItem};
pub use service::{CrmService, InfoType};

// Search strategy system
pub mod search;
pub use search::{Filter, SearchDispatcher, SearchParams, SearchStrategy, SearchType};

// Batch orchestration
pub mod batch;
pub use batch::{BatchItemResult, BatchOrchestrator, BatchOutcome, BatchRequest, MAX_BATCH_SIZE};

// Error handling and enhancement
pub mod enhance;
pub mod error;
pub use enhance::{EnhancerPipeline, ErrorEnhancer, ErrorSignal};
pub use error::{ErrorContext, Result, ServiceError};

// Resilience patterns
pub mod resilience;
pub use resilience::{RetryConfig, RetryExecutor};

// Configuration management
pub mod config;
pub use config::{ConfigProvider, CrmConfig};

// Utility module for common functionality
mod util;

#[cfg(test)]
mod tests;

/// Create a new client builder
pub fn client() -> CrmClientBuilder {
    CrmClientBuilder::new()
}

/// Create a service from the default environment provider
pub fn service_from_env() -> Result<CrmService> {
    CrmService::from_env()
}
