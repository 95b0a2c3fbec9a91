//! The standard enhancer catalogue
//!
//! Each enhancer recognizes one family of upstream validation failures and
//! turns it into concrete guidance: valid option lists, expected value
//! shapes, or the reference forms the layer converts automatically.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::client::{AttributeOptions, OptionItem};
use crate::error::{ErrorContext, Result};
use crate::registry::{OperationKind, ResourceType};

use super::{ErrorEnhancer, ErrorSignal};

/// Reference-shaped field names the ambiguous "invalid value" pattern is
/// restricted to, to avoid false positives on ordinary scalar fields
const REFERENCE_FIELDS: &[&str] = &[
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

static QUOTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)""#).expect("valid regex"));

static INVALID_ATTRIBUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)invalid value was passed to attribute\s+"?([A-Za-z0-9_]+)"?"#)
        .expect("valid regex")
});

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Check whether a field is present in the submitted data, both top-level
/// and nested under a `values` sub-object, with case/whitespace-insensitive
/// key comparison.
fn field_present(data: &Value, field: &str) -> bool {
    let field = normalize_key(field);
    let scopes = [Some(data), data.get("values")];

    scopes.iter().flatten().any(|scope| {
        scope
            .as_object()
            .is_some_and(|map| map.keys().any(|key| normalize_key(key) == field))
    })
}

fn value_matches(value: &Value, target: &str) -> bool {
    match value {
        Value::String(s) => s == target,
        Value::Array(items) => items.iter().any(|item| value_matches(item, target)),
        Value::Object(map) => map.get("value").is_some_and(|v| value_matches(v, target)),
        _ => false,
    }
}

/// Find which submitted field carries the quoted offending value,
/// including array-valued fields
fn find_field_for_value(data: &Value, target: &str) -> Option<String> {
    let scopes = [Some(data), data.get("values")];

    for scope in scopes.iter().flatten() {
        if let Some(map) = scope.as_object() {
            for (key, value) in map {
                if value_matches(value, target) {
                    return Some(key.clone());
                }
            }
        }
    }
    None
}

fn extract_quoted(message: &str) -> Option<String> {
    QUOTED_RE
        .captures(message)
        .map(|caps| caps[1].to_string())
}

fn first_validation_field(signal: &ErrorSignal) -> Option<String> {
    signal
        .validation_errors
        .iter()
        .find_map(|detail| detail.field.clone())
}

/// Render an option list, truncated with a "+N more" suffix
fn format_options(options: &[OptionItem], max: usize) -> String {
    let shown = options
        .iter()
        .take(max)
        .map(|o| o.title.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    if options.len() > max {
        format!("{} (+{} more)", shown, options.len() - max)
    } else {
        shown
    }
}

fn resource_name(context: &ErrorContext) -> &'static str {
    context
        .resource_type
        .map(|r| r.plural_name())
        .unwrap_or("record")
}

/// Enhancer for "missing required field" failures.
///
/// For deals creates where the stage field is absent from the submitted
/// data, the valid stage options are fetched and listed; every other case
/// gets the generic message without a network call.
pub struct RequiredFieldsEnhancer {
    options: Arc<dyn AttributeOptions>,
}

impl RequiredFieldsEnhancer {
    pub fn new(options: Arc<dyn AttributeOptions>) -> Self {
        Self { options }
    }

    fn generic_message(context: &ErrorContext) -> String {
        format!(
            "The {} record is missing required fields. Run the discover-attributes tool to see which attributes are required.",
            resource_name(context)
        )
    }
}

#[async_trait]
impl ErrorEnhancer for RequiredFieldsEnhancer {
    fn name(&self) -> &'static str {
        "required_fields"
    }

    fn matches(&self, signal: &ErrorSignal, _context: &ErrorContext) -> bool {
        signal.mentions_any(&["required field", "missing required"])
    }

    async fn enhance(
        &self,
        _signal: &ErrorSignal,
        context: &ErrorContext,
    ) -> Result<Option<String>> {
        let Some(data) = &context.record_data else {
            return Ok(None);
        };

        let deals_create = context.resource_type == Some(ResourceType::Deals)
            && context.operation == Some(OperationKind::Create);

        if !deals_create || field_present(data, "stage") {
            return Ok(Some(Self::generic_message(context)));
        }

        match self.options.get_options(ResourceType::Deals, "stage").await {
            Ok(field_options) if !field_options.options.is_empty() => Ok(Some(format!(
                "Missing required field 'stage' for deals. Valid options: {}",
                format_options(&field_options.options, 5)
            ))),
            _ => Ok(Some(Self::generic_message(context))),
        }
    }
}

/// Enhancer for unknown select/status values.
///
/// Resolves the implicated field from structured validation details first,
/// then by scanning the submitted data for the quoted offending value, and
/// lists the valid options. Never performs a network call absent any
/// record-data context.
pub struct SelectOptionEnhancer {
    options: Arc<dyn AttributeOptions>,
}

impl SelectOptionEnhancer {
    pub fn new(options: Arc<dyn AttributeOptions>) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ErrorEnhancer for SelectOptionEnhancer {
    fn name(&self) -> &'static str {
        "select_option"
    }

    fn matches(&self, signal: &ErrorSignal, _context: &ErrorContext) -> bool {
        signal.mentions_any(&[
            "cannot find select option",
            "cannot find status",
            "select option",
        ])
    }

    async fn enhance(
        &self,
        signal: &ErrorSignal,
        context: &ErrorContext,
    ) -> Result<Option<String>> {
        let Some(data) = &context.record_data else {
            return Ok(None);
        };

        let field = first_validation_field(signal).or_else(|| {
            extract_quoted(&signal.message).and_then(|quoted| find_field_for_value(data, &quoted))
        });

        let Some(field) = field else {
            return Ok(Some(format!(
                "A select/status value on this {} payload is not a valid option. Run the discover-attributes tool to inspect the valid options.",
                resource_name(context)
            )));
        };

        let Some(resource_type) = context.resource_type else {
            return Ok(Some(field_qualified_fallback(&field, context)));
        };

        match self.options.get_options(resource_type, &field).await {
            Ok(field_options) if !field_options.options.is_empty() => Ok(Some(format!(
                "Invalid {} value for '{}' on {}. Valid options: {}",
                field_options.attribute_type,
                field,
                resource_name(context),
                format_options(&field_options.options, 8)
            ))),
            _ => Ok(Some(field_qualified_fallback(&field, context))),
        }
    }
}

fn field_qualified_fallback(field: &str, context: &ErrorContext) -> String {
    format!(
        "The value supplied for '{}' on {} is not one of its valid options. Run the get-attributes tool to list them.",
        field,
        resource_name(context)
    )
}

/// Enhancer for malformed record references.
///
/// Covers the explicit reference errors plus the ambiguous "Invalid value
/// was passed to attribute X" pattern, restricted to reference-shaped field
/// names.
pub struct RecordReferenceEnhancer;

impl RecordReferenceEnhancer {
    fn reference_field(signal: &ErrorSignal, context: &ErrorContext) -> Option<String> {
        if let Some(caps) = INVALID_ATTRIBUTE_RE.captures(&signal.message) {
            let field = caps[1].to_string();
            if REFERENCE_FIELDS.contains(&normalize_key(&field).as_str()) {
                return Some(field);
            }
        }

        if let Some(field) = first_validation_field(signal) {
            if REFERENCE_FIELDS.contains(&normalize_key(&field).as_str()) {
                return Some(field);
            }
        }

        let data = context.record_data.as_ref()?;
        let scopes = [Some(data), data.get("values")];
        for scope in scopes.iter().flatten() {
            if let Some(map) = scope.as_object() {
                for key in map.keys() {
                    if REFERENCE_FIELDS.contains(&normalize_key(key).as_str()) {
                        return Some(key.clone());
                    }
                }
            }
        }
        None
    }
}

#[async_trait]
impl ErrorEnhancer for RecordReferenceEnhancer {
    fn name(&self) -> &'static str {
        "record_reference"
    }

    fn matches(&self, signal: &ErrorSignal, _context: &ErrorContext) -> bool {
        if signal.mentions_any(&["missing target_object", "record reference", "target_record_id"])
        {
            return true;
        }

        // The "invalid value" pattern is ambiguous; only treat it as a
        // reference failure for known reference-shaped fields.
        INVALID_ATTRIBUTE_RE
            .captures(&signal.message)
            .is_some_and(|caps| REFERENCE_FIELDS.contains(&normalize_key(&caps[1]).as_str()))
    }

    async fn enhance(
        &self,
        signal: &ErrorSignal,
        context: &ErrorContext,
    ) -> Result<Option<String>> {
        let shapes = "Provide either the structured form {\"target_object\": \"<object-slug>\", \"target_record_id\": \"<record-id>\"}, or one of the simplified forms converted automatically: a bare record id string, or the legacy {\"record_id\": \"<id>\"} object";

        let message = match Self::reference_field(signal, context) {
            Some(field) => format!(
                "The '{}' attribute on {} is a record reference. {}.",
                field,
                resource_name(context),
                shapes
            ),
            None => format!(
                "A record-reference attribute on this {} payload is malformed. {}.",
                resource_name(context),
                shapes
            ),
        };
        Ok(Some(message))
    }
}

/// Enhancer for structured attribute types: locations, phone numbers and
/// personal names. Emits the expected nested shape.
pub struct ComplexTypeEnhancer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComplexKind {
    Location,
    Phone,
    PersonalName,
}

impl ComplexTypeEnhancer {
    fn detect(signal: &ErrorSignal) -> Option<ComplexKind> {
        if signal.mentions_any(&["location", "address", "line_1", "locality", "postcode"]) {
            Some(ComplexKind::Location)
        } else if signal.mentions("phone") {
            Some(ComplexKind::Phone)
        } else if signal.mentions_any(&[
            "personal-name",
            "personal name",
            "first_name",
            "last_name",
            "full_name",
        ]) {
            Some(ComplexKind::PersonalName)
        } else {
            None
        }
    }

    fn shape_hint(kind: ComplexKind) -> &'static str {
        match kind {
            ComplexKind::Location => {
                "expects a structured address object: {\"line_1\", \"line_2\", \"locality\", \"region\", \"postcode\", \"country_code\"}"
            }
            ComplexKind::Phone => {
                "expects phone numbers in E.164 format (for example \"+14155550123\"); national numbers are normalized when a country code can be inferred"
            }
            ComplexKind::PersonalName => {
                "expects {\"first_name\", \"last_name\"}, or a single {\"full_name\"} which is split automatically"
            }
        }
    }
}

#[async_trait]
impl ErrorEnhancer for ComplexTypeEnhancer {
    fn name(&self) -> &'static str {
        "complex_type"
    }

    fn matches(&self, signal: &ErrorSignal, _context: &ErrorContext) -> bool {
        Self::detect(signal).is_some()
    }

    async fn enhance(
        &self,
        signal: &ErrorSignal,
        context: &ErrorContext,
    ) -> Result<Option<String>> {
        let Some(kind) = Self::detect(signal) else {
            return Ok(None);
        };

        let field = first_validation_field(signal).or_else(|| extract_quoted(&signal.message));
        let hint = Self::shape_hint(kind);

        let message = match field {
            Some(field) => format!(
                "The '{}' attribute on {} {}.",
                field,
                resource_name(context),
                hint
            ),
            None => format!(
                "A structured attribute on this {} payload {}.",
                resource_name(context),
                hint
            ),
        };
        Ok(Some(message))
    }
}
