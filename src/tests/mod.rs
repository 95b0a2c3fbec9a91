//! Unit and mock tests for the CRM SDK
//!
//! Mock tests use WireMock to simulate the upstream CRM API; enhancer
//! tests use an in-process fake for the attribute-options collaborator.

pub mod enhancer_tests;
pub mod search_mock_tests;
