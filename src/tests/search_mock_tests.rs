//! Mock tests for the search strategy system
//!
//! These tests use WireMock to simulate the CRM API and verify strategy
//! selection, filter construction, degrade behavior and client-side
//! filtering.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::client::CrmClient;
    use crate::error::ServiceError;
    use crate::registry::ResourceType;
    use crate::resilience::RetryConfig;
    use crate::search::Filter;
    use crate::service::CrmService;

    /// Creates a test client configured to use the mock server, with
    /// retries disabled so failure tests return immediately
    fn create_test_service(mock_server: &MockServer) -> CrmService {
        let client = CrmClient::builder()
            .api_key("mock_api_key")
            .base_url(mock_server.uri())
            .timeout(5)
            .retry(RetryConfig {
                max_retries: 0,
                initial_interval: Duration::from_millis(1),
                ..RetryConfig::default()
            })
            .build()
            .expect("Failed to build CRM client");
        CrmService::new(Arc::new(client))
    }

    #[tokio::test]
    async fn test_company_query_search_builds_or_filter() {
        let mock_server = MockServer::start().await;

        let mock_response = json!({
            "data": [
                {
                    "id": {"record_id": "rec_1", "object_id": "companies"},
                    "values": {
                        "name": [{"value": "Acme"}],
                        "domains": [{"value": "acme.com"}]
                    },
                    "created_at": "2024-03-01T00:00:00Z"
                }
            ]
        });

        // A free-text company query must fan out over name and domains.
        Mock::given(method("POST"))
            .and(path("/objects/companies/records/query"))
            .and(body_partial_json(json!({
                "limit": 20,
                "offset": 0,
                "filter": {
                    "$or": [
                        {"name": {"$contains": "acme"}},
                        {"domains": {"$contains": "acme"}}
                    ]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
            .mount(&mock_server)
            .await;

        let service = create_test_service(&mock_server);
        let records = service
            .search_records(ResourceType::Companies, Some("acme".to_string()))
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.record_id, "rec_1");
        assert_eq!(records[0].first_str("name"), Some("Acme"));
    }

    #[tokio::test]
    async fn test_filterless_listing_degrades_to_empty_on_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/objects/companies/records/query"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "message": "upstream exploded"
            })))
            .mount(&mock_server)
            .await;

        let service = create_test_service(&mock_server);
        let records = service
            .search_records(ResourceType::Companies, None)
            .await
            .unwrap();

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_filtered_search_failure_is_a_typed_filter_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/objects/companies/records/query"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "Unknown filter attribute nonexistent"
            })))
            .mount(&mock_server)
            .await;

        let service = create_test_service(&mock_server);
        let err = service
            .advanced_search(
                ResourceType::Companies,
                Filter::contains("nonexistent", "x"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err.root(), ServiceError::InvalidFilter(_)), "{}", err);
    }

    #[tokio::test]
    async fn test_advanced_search_on_tasks_is_a_contract_violation() {
        let mock_server = MockServer::start().await;
        let service = create_test_service(&mock_server);

        // No mock is mounted: the dispatcher must reject before any call.
        let err = service
            .advanced_search(ResourceType::Tasks, Filter::contains("content", "x"))
            .await
            .unwrap_err();

        assert!(matches!(err.root(), ServiceError::InvalidFilter(_)), "{}", err);
        assert!(err.to_string().contains("tasks"), "{}", err);
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_task_search_filters_and_paginates_client_side() {
        let mock_server = MockServer::start().await;

        let mock_response = json!({
            "data": [
                {"id": {"task_id": "t1"}, "content_plaintext": "Send invoice to Acme", "status": "open"},
                {"id": {"task_id": "t2"}, "content_plaintext": "Call Bob", "status": "open"},
                {"id": {"task_id": "t3"}, "content_plaintext": "Chase invoice payment", "status": "done"}
            ]
        });

        // The full set is fetched once and cached; the second search must
        // be served from the cache.
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
            .expect(1)
            .mount(&mock_server)
            .await;

        let service = create_test_service(&mock_server);

        let records = service
            .search_records(ResourceType::Tasks, Some("invoice".to_string()))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.record_id, "t1");
        assert_eq!(records[1].id.record_id, "t3");

        // Pagination applies after filtering.
        let mut params = crate::search::SearchParams::basic(ResourceType::Tasks, "invoice");
        params.offset = 1;
        params.limit = 1;
        let page = service.search(&params).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id.record_id, "t3");
    }

    #[tokio::test]
    async fn test_list_search_canonicalizes_scoping_and_matches_client_side() {
        let mock_server = MockServer::start().await;

        let mock_response = json!({
            "data": [
                {
                    "id": {"entry_id": "e1"},
                    "parent_record_id": "",
                    "entry_values": {
                        "name": [{"value": "Hot Leads"}],
                        "parent_record_id": [{"value": "nested_1"}]
                    }
                },
                {
                    "id": {"entry_id": "e2"},
                    "parent_record_id": null,
                    "entry_values": {
                        "name": [{"value": "Cold Outreach"}],
                        "parent_record_id": [{"value": "nested_2"}]
                    }
                }
            ]
        });

        Mock::given(method("GET"))
            .and(path("/lists"))
            .and(query_param("limit", "500"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
            .mount(&mock_server)
            .await;

        let service = create_test_service(&mock_server);
        let records = service
            .search_records(ResourceType::Lists, Some("leads".to_string()))
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.record_id, "e1");
        // Top-level scoping wins even when it is the empty string.
        assert_eq!(records[0].first_value("parent_record_id"), Some(&json!("")));
    }

    #[tokio::test]
    async fn test_list_listing_degrades_and_list_search_fails_typed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/lists"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&mock_server)
            .await;

        let service = create_test_service(&mock_server);

        // Plain listing degrades to empty.
        let records = service
            .search_records(ResourceType::Lists, None)
            .await
            .unwrap();
        assert!(records.is_empty());

        // A query search has no degrade path.
        let err = service
            .search_records(ResourceType::Lists, Some("leads".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err.root(), ServiceError::SearchFailed(_)), "{}", err);
    }
}
