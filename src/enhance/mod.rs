//! Error classification and enhancement pipeline
//!
//! An ordered list of enhancer strategies turns opaque upstream failures
//! into field-aware, actionable diagnostics. The pipeline runs enhancers in
//! fixed priority order and returns the first non-null result; when none
//! applies, a generic per-verb fallback is derived from the raw error text.

mod enhancers;
pub mod sanitize;

pub use enhancers::{
    ComplexTypeEnhancer, RecordReferenceEnhancer, RequiredFieldsEnhancer, SelectOptionEnhancer,
};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::AttributeOptions;
use crate::error::{mapping, ErrorContext, Result, ServiceError, ValidationDetail};
use crate::registry::OperationKind;

/// Normalized view over the failure shapes the pipeline must handle:
/// error values, plain strings, and HTTP-error-shaped objects with a
/// possible nested `validation_errors` array.
#[derive(Debug, Clone, Default)]
pub struct ErrorSignal {
    pub message: String,
    pub validation_errors: Vec<ValidationDetail>,
    pub status_code: Option<u16>,
}

impl ErrorSignal {
    /// Build from a ServiceError, pulling structured validation failures
    /// out of any attached context
    pub fn from_error(error: &ServiceError) -> Self {
        let mut signal = Self {
            message: error.root().to_string(),
            validation_errors: Vec::new(),
            status_code: error.status_code(),
        };
        if let Some(context) = error.context() {
            signal.validation_errors = context.validation_errors.clone();
        }
        signal
    }

    /// Build from a plain string
    pub fn from_text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Build from an HTTP-error-shaped JSON object
    pub fn from_value(value: &Value) -> Self {
        let message = value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| value.to_string());

        Self {
            message,
            validation_errors: mapping::extract_validation_details(value),
            status_code: value
                .get("status_code")
                .and_then(|s| s.as_u64())
                .map(|s| s as u16),
        }
    }

    /// Case-insensitive containment check over the message and any
    /// structured validation messages
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        if self.message.to_lowercase().contains(&needle) {
            return true;
        }
        self.validation_errors.iter().any(|detail| {
            detail
                .message
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains(&needle))
        })
    }

    /// True when any of the needles is mentioned
    pub fn mentions_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| self.mentions(needle))
    }
}

/// One pattern-match + message-generation unit in the pipeline.
///
/// `enhance` returning `Ok(None)` means "not applicable, defer to the next
/// enhancer"; `Ok(Some(..))` is final and user-facing.
#[async_trait]
pub trait ErrorEnhancer: Send + Sync {
    /// Name for logs
    fn name(&self) -> &'static str;

    /// Cheap predicate run before `enhance`
    fn matches(&self, signal: &ErrorSignal, context: &ErrorContext) -> bool;

    /// Produce a diagnostic, possibly consulting the attribute options
    /// collaborator
    async fn enhance(&self, signal: &ErrorSignal, context: &ErrorContext)
        -> Result<Option<String>>;
}

/// Ordered enhancer chain. Ordering is an explicit, tested contract.
pub struct EnhancerPipeline {
    enhancers: Vec<Box<dyn ErrorEnhancer>>,
}

impl EnhancerPipeline {
    /// The standard catalogue, in priority order
    pub fn standard(options: Arc<dyn AttributeOptions>) -> Self {
        Self {
            enhancers: vec![
                Box::new(RequiredFieldsEnhancer::new(Arc::clone(&options))),
                Box::new(SelectOptionEnhancer::new(options)),
                Box::new(RecordReferenceEnhancer),
                Box::new(ComplexTypeEnhancer),
            ],
        }
    }

    /// Build a pipeline from an explicit chain (used in tests)
    pub fn with_enhancers(enhancers: Vec<Box<dyn ErrorEnhancer>>) -> Self {
        Self { enhancers }
    }

    /// Names of the registered enhancers, in execution order
    pub fn enhancer_names(&self) -> Vec<&'static str> {
        self.enhancers.iter().map(|e| e.name()).collect()
    }

    /// Run the chain and return the final user-facing diagnostic.
    ///
    /// Record payloads are sanitized before they hit the log output.
    pub async fn enhance(&self, signal: &ErrorSignal, context: &ErrorContext) -> String {
        if let Some(data) = &context.record_data {
            log::debug!(
                "Enhancing {} failure (record data: {})",
                describe_operation(context),
                sanitize::sanitize_value(data)
            );
        }

        for enhancer in &self.enhancers {
            if !enhancer.matches(signal, context) {
                continue;
            }
            match enhancer.enhance(signal, context).await {
                Ok(Some(message)) => {
                    log::debug!("Enhancer {} produced a diagnostic", enhancer.name());
                    return message;
                }
                Ok(None) => continue,
                Err(err) => {
                    log::warn!(
                        "Enhancer {} failed, continuing down the chain: {}",
                        enhancer.name(),
                        err
                    );
                    continue;
                }
            }
        }

        generic_fallback(signal, context)
    }
}

fn describe_operation(context: &ErrorContext) -> String {
    let verb = context
        .operation
        .map(|op| op.verb())
        .unwrap_or("operation");
    match context.resource_type {
        Some(resource) => format!("{} {}", resource, verb),
        None => verb.to_string(),
    }
}

/// Per-verb generic fallback derived from the raw error text
pub fn generic_fallback(signal: &ErrorSignal, context: &ErrorContext) -> String {
    let resource = context
        .resource_type
        .map(|r| r.plural_name())
        .unwrap_or("record");
    let raw = crate::util::truncate_string(&signal.message, 300);

    let lead = match context.operation {
        Some(OperationKind::Create) => format!("Failed to create {} record: {}", resource, raw),
        Some(OperationKind::Update) => format!("Failed to update {} record: {}", resource, raw),
        Some(OperationKind::Delete) => format!("Failed to delete {} record: {}", resource, raw),
        Some(OperationKind::Get) => format!("Failed to fetch {} record: {}", resource, raw),
        Some(OperationKind::Search) => format!("Search across {} failed: {}", resource, raw),
        Some(OperationKind::Batch) => format!("Batch operation on {} failed: {}", resource, raw),
        None => format!("Operation on {} failed: {}", resource, raw),
    };

    format!(
        "{}. Run the discover-attributes tool to inspect the available fields and value shapes.",
        lead
    )
}
