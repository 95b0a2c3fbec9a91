//! Tests for the error enhancement pipeline
//!
//! These tests exercise the enhancer chain against a fake attribute-options
//! collaborator, verifying option rendering, lookup discipline and the
//! fallback contract.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::client::{AttributeOptions, FieldOptions, OptionItem};
    use crate::enhance::{EnhancerPipeline, ErrorSignal};
    use crate::error::{ErrorContext, Result, ServiceError, ValidationDetail};
    use crate::registry::{OperationKind, ResourceType};

    /// Fake options collaborator with call counting
    struct FakeOptions {
        titles: Vec<&'static str>,
        attribute_type: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeOptions {
        fn with_titles(titles: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                titles,
                attribute_type: "select",
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                titles: Vec::new(),
                attribute_type: "select",
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AttributeOptions for FakeOptions {
        async fn get_options(
            &self,
            _resource_type: ResourceType,
            _field: &str,
        ) -> Result<FieldOptions> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ServiceError::network("options endpoint unreachable"));
            }
            Ok(FieldOptions {
                options: self
                    .titles
                    .iter()
                    .enumerate()
                    .map(|(i, title)| OptionItem {
                        id: format!("opt_{}", i),
                        title: (*title).to_string(),
                    })
                    .collect(),
                attribute_type: self.attribute_type.to_string(),
            })
        }
    }

    fn select_signal(value: &str) -> ErrorSignal {
        let mut signal =
            ErrorSignal::from_text(format!("Cannot find select option \"{}\"", value));
        signal.validation_errors = vec![ValidationDetail {
            field: Some("stage".to_string()),
            message: Some(format!("Cannot find select option \"{}\"", value)),
        }];
        signal
    }

    fn deals_create_context(data: serde_json::Value) -> ErrorContext {
        ErrorContext::for_operation(OperationKind::Create, ResourceType::Deals).record_data(data)
    }

    #[test]
    fn standard_pipeline_order_is_fixed() {
        let pipeline = EnhancerPipeline::standard(FakeOptions::with_titles(vec![]));
        assert_eq!(
            pipeline.enhancer_names(),
            vec![
                "required_fields",
                "select_option",
                "record_reference",
                "complex_type"
            ]
        );
    }

    #[tokio::test]
    async fn select_enhancer_lists_all_options_when_few() {
        let options = FakeOptions::with_titles(vec!["Lead", "Qualified", "Won"]);
        let pipeline = EnhancerPipeline::standard(Arc::clone(&options) as Arc<dyn AttributeOptions>);

        let message = pipeline
            .enhance(
                &select_signal("Premium"),
                &deals_create_context(json!({"stage": "Premium"})),
            )
            .await;

        assert!(message.contains("Valid options: Lead, Qualified, Won"), "{}", message);
        assert!(!message.contains("more"), "{}", message);
        assert_eq!(options.call_count(), 1);
    }

    #[tokio::test]
    async fn select_enhancer_truncates_long_option_lists() {
        let options = FakeOptions::with_titles(vec![
            "A", "B", "C", "D", "E", "F", "G", "H", "I", "J",
        ]);
        let pipeline = EnhancerPipeline::standard(Arc::clone(&options) as Arc<dyn AttributeOptions>);

        let message = pipeline
            .enhance(
                &select_signal("Z"),
                &deals_create_context(json!({"stage": "Z"})),
            )
            .await;

        assert!(message.contains("A, B, C, D, E, F, G, H"), "{}", message);
        assert!(message.contains("(+2 more)"), "{}", message);
        assert!(!message.contains(", I"), "{}", message);
    }

    #[tokio::test]
    async fn select_enhancer_resolves_field_by_scanning_submitted_values() {
        let options = FakeOptions::with_titles(vec!["Open", "Closed"]);
        let pipeline = EnhancerPipeline::standard(Arc::clone(&options) as Arc<dyn AttributeOptions>);

        // No structured validation details; the field must be found by
        // locating the quoted value in the payload, including arrays.
        let signal = ErrorSignal::from_text("Cannot find select option \"Archived\"");
        let context = ErrorContext::for_operation(OperationKind::Update, ResourceType::Companies)
            .record_data(json!({"values": {"tags": ["Active", "Archived"], "name": "Acme"}}));

        let message = pipeline.enhance(&signal, &context).await;
        assert!(message.contains("'tags'"), "{}", message);
        assert!(message.contains("Valid options: Open, Closed"), "{}", message);
    }

    #[tokio::test]
    async fn select_enhancer_skips_lookup_without_record_data() {
        let options = FakeOptions::with_titles(vec!["Lead"]);
        let pipeline = EnhancerPipeline::standard(Arc::clone(&options) as Arc<dyn AttributeOptions>);

        let context = ErrorContext::for_operation(OperationKind::Create, ResourceType::Deals);
        let message = pipeline.enhance(&select_signal("Premium"), &context).await;

        // The enhancer defers; the generic fallback takes over.
        assert_eq!(options.call_count(), 0);
        assert!(message.contains("discover-attributes"), "{}", message);
        assert!(message.contains("create"), "{}", message);
    }

    #[tokio::test]
    async fn select_enhancer_degrades_when_lookup_fails() {
        let options = FakeOptions::failing();
        let pipeline = EnhancerPipeline::standard(Arc::clone(&options) as Arc<dyn AttributeOptions>);

        let message = pipeline
            .enhance(
                &select_signal("Premium"),
                &deals_create_context(json!({"stage": "Premium"})),
            )
            .await;

        assert_eq!(options.call_count(), 1);
        assert!(message.contains("'stage'"), "{}", message);
        assert!(message.contains("get-attributes"), "{}", message);
    }

    #[tokio::test]
    async fn required_fields_on_deals_create_lists_stage_options() {
        let options = FakeOptions::with_titles(vec![
            "Lead", "Qualified", "Proposal", "Won", "Lost", "Churned",
        ]);
        let pipeline = EnhancerPipeline::standard(Arc::clone(&options) as Arc<dyn AttributeOptions>);

        let signal = ErrorSignal::from_text("Missing required field");
        let message = pipeline
            .enhance(&signal, &deals_create_context(json!({"name": "Big deal"})))
            .await;

        assert!(message.contains("'stage'"), "{}", message);
        assert!(
            message.contains("Lead, Qualified, Proposal, Won, Lost (+1 more)"),
            "{}",
            message
        );
        assert_eq!(options.call_count(), 1);
    }

    #[tokio::test]
    async fn required_fields_skips_lookup_when_stage_is_present() {
        let options = FakeOptions::with_titles(vec!["Lead"]);
        let pipeline = EnhancerPipeline::standard(Arc::clone(&options) as Arc<dyn AttributeOptions>);

        let signal = ErrorSignal::from_text("Missing required field");

        // Present top-level, with odd casing and whitespace.
        let message = pipeline
            .enhance(&signal, &deals_create_context(json!({" Stage ": "won"})))
            .await;
        assert!(message.contains("missing required fields"), "{}", message);
        assert_eq!(options.call_count(), 0);

        // Present under values.
        let message = pipeline
            .enhance(
                &signal,
                &deals_create_context(json!({"values": {"stage": "won"}})),
            )
            .await;
        assert!(message.contains("missing required fields"), "{}", message);
        assert_eq!(options.call_count(), 0);
    }

    #[tokio::test]
    async fn reference_enhancer_names_field_and_accepted_shapes() {
        let pipeline = EnhancerPipeline::standard(FakeOptions::with_titles(vec![]));

        let signal =
            ErrorSignal::from_text("Invalid value was passed to attribute \"company\"");
        let context = ErrorContext::for_operation(OperationKind::Create, ResourceType::People)
            .record_data(json!({"company": "not-a-reference"}));

        let message = pipeline.enhance(&signal, &context).await;
        assert!(message.contains("'company'"), "{}", message);
        assert!(message.contains("target_record_id"), "{}", message);
        assert!(message.contains("record_id"), "{}", message);
    }

    #[tokio::test]
    async fn reference_pattern_ignores_non_reference_fields() {
        let pipeline = EnhancerPipeline::standard(FakeOptions::with_titles(vec![]));

        let signal = ErrorSignal::from_text("Invalid value was passed to attribute \"name\"");
        let context = ErrorContext::for_operation(OperationKind::Create, ResourceType::Companies);

        // No enhancer applies; the fallback takes over.
        let message = pipeline.enhance(&signal, &context).await;
        assert!(message.contains("Failed to create"), "{}", message);
        assert!(!message.contains("target_record_id"), "{}", message);
    }

    #[tokio::test]
    async fn complex_type_enhancer_describes_expected_shapes() {
        let pipeline = EnhancerPipeline::standard(FakeOptions::with_titles(vec![]));
        let context = ErrorContext::for_operation(OperationKind::Update, ResourceType::People);

        let message = pipeline
            .enhance(
                &ErrorSignal::from_text("Invalid phone number format"),
                &context,
            )
            .await;
        assert!(message.contains("E.164"), "{}", message);

        let message = pipeline
            .enhance(
                &ErrorSignal::from_text("Invalid value for \"primary_location\": bad address"),
                &context,
            )
            .await;
        assert!(message.contains("line_1"), "{}", message);
        assert!(message.contains("country_code"), "{}", message);
    }

    #[tokio::test]
    async fn failing_enhancer_falls_through_the_chain() {
        // A select failure whose options lookup dies still produces a
        // usable message rather than propagating the lookup error.
        let options = FakeOptions::failing();
        let pipeline = EnhancerPipeline::standard(Arc::clone(&options) as Arc<dyn AttributeOptions>);

        let message = pipeline
            .enhance(
                &select_signal("Premium"),
                &deals_create_context(json!({"stage": "Premium"})),
            )
            .await;
        assert!(!message.is_empty());
        assert!(!message.contains("unreachable"), "{}", message);
    }
}
