//! Error mapping for the upstream CRM API
//!
//! This module converts the CRM's HTTP error envelope into our normalized
//! ServiceError variants. The envelope carries `status_code`, `type`,
//! `code`, `message` and an optional `validation_errors` array.

use reqwest::StatusCode;
use serde_json::Value;

use super::{ErrorContext, ServiceError, ValidationDetail};

/// Map a CRM API error body to a ServiceError.
///
/// Extracts the upstream message and any structured validation failures into
/// the context so that the enhancer pipeline can inspect them later.
pub fn map_crm_error(status: StatusCode, json: &Value, context: &mut ErrorContext) -> ServiceError {
    context.status_code = Some(status.as_u16());
    context.validation_errors = extract_validation_details(json);

    let message = json
        .get("message")
        .or_else(|| json.get("error"))
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown CRM error")
        .to_string();

    let lowered = message.to_lowercase();

    match status {
        StatusCode::UNAUTHORIZED => ServiceError::authentication(message),
        StatusCode::FORBIDDEN => ServiceError::authentication(message),
        StatusCode::NOT_FOUND => ServiceError::not_found(message),
        StatusCode::CONFLICT => ServiceError::duplicate(message),
        StatusCode::TOO_MANY_REQUESTS => ServiceError::rate_limit(message),
        StatusCode::REQUEST_TIMEOUT => ServiceError::timeout(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            if lowered.contains("uniqueness") || lowered.contains("already exists") {
                ServiceError::duplicate(message)
            } else if lowered.contains("target_object") || lowered.contains("target_record_id") {
                ServiceError::reference_constraint(message)
            } else if lowered.contains("filter") {
                ServiceError::invalid_filter(message)
            } else {
                ServiceError::validation(message)
            }
        }
        s if s.is_server_error() => ServiceError::network(message),
        _ => ServiceError::internal(message),
    }
}

/// Map a generic HTTP error (body may not be JSON) to a ServiceError
pub fn map_http_error(status: StatusCode, body: &str, context: &mut ErrorContext) -> ServiceError {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        return map_crm_error(status, &json, context);
    }

    context.status_code = Some(status.as_u16());

    let message = if body.is_empty() {
        status.to_string()
    } else if body.len() > 200 {
        format!("{}: {:.200}...", status, body)
    } else {
        format!("{}: {}", status, body)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::authentication(message),
        StatusCode::NOT_FOUND => ServiceError::not_found(message),
        StatusCode::TOO_MANY_REQUESTS => ServiceError::rate_limit(message),
        StatusCode::REQUEST_TIMEOUT => ServiceError::timeout(message),
        StatusCode::BAD_REQUEST => ServiceError::validation(message),
        s if s.is_server_error() => ServiceError::network(message),
        _ => ServiceError::internal(message),
    }
}

/// Pull structured validation failures out of an error envelope.
///
/// Handles both the documented `validation_errors` array and the nested
/// `errors` array some endpoints return instead.
pub fn extract_validation_details(json: &Value) -> Vec<ValidationDetail> {
    let entries = json
        .get("validation_errors")
        .or_else(|| json.get("errors"))
        .and_then(|v| v.as_array());

    let Some(entries) = entries else {
        return Vec::new();
    };

    entries
        .iter()
        .map(|entry| ValidationDetail {
            field: entry
                .get("field")
                .or_else(|| entry.get("attribute"))
                .or_else(|| entry.get("path"))
                .and_then(|f| f.as_str())
                .map(String::from),
            message: entry
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from),
        })
        .collect()
}

/// Determine if an HTTP status code indicates a retryable error
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_not_found() {
        let mut ctx = ErrorContext::new();
        let err = map_crm_error(
            StatusCode::NOT_FOUND,
            &json!({"message": "Record not found"}),
            &mut ctx,
        );
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(ctx.status_code, Some(404));
    }

    #[test]
    fn maps_uniqueness_conflict_to_duplicate() {
        let mut ctx = ErrorContext::new();
        let err = map_crm_error(
            StatusCode::BAD_REQUEST,
            &json!({"message": "Uniqueness constraint violated on domains"}),
            &mut ctx,
        );
        assert!(matches!(err, ServiceError::Duplicate(_)));
    }

    #[test]
    fn extracts_validation_details() {
        let details = extract_validation_details(&json!({
            "message": "Validation failed",
            "validation_errors": [
                {"field": "stage", "message": "Cannot find select option"},
                {"attribute": "name"}
            ]
        }));
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].field.as_deref(), Some("stage"));
        assert_eq!(details[1].field.as_deref(), Some("name"));
    }

    #[test]
    fn non_json_body_falls_back_to_status_mapping() {
        let mut ctx = ErrorContext::new();
        let err = map_http_error(StatusCode::TOO_MANY_REQUESTS, "slow down", &mut ctx);
        assert!(matches!(err, ServiceError::RateLimit(_)));
        assert!(err.is_retryable());
    }
}
