//! Integration tests for token acquisition and 401 handling

use drivemirror_core::domain::{MirrorError, RequestFailureKind};
use drivemirror_graph::listing::list_children;
use reqwest::Method;
use wiremock::{
    matchers::{body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::common;

#[tokio::test]
async fn test_token_fetched_once_and_sent_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(common::TOKEN_PATH))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "app-token",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drives/d1/items/root-id/children"))
        .and(header("authorization", "Bearer app-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
        .expect(3)
        .mount(&server)
        .await;

    let client = common::client_for(&server, common::fast_retry());
    for _ in 0..3 {
        let children = list_children(&client, &common::drive("d1"), &common::item("root-id"))
            .await
            .expect("listing");
        assert!(children.is_empty());
    }
}

#[tokio::test]
async fn test_401_forces_single_refresh_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(common::TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "app-token",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/alice/drive"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/alice/drive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "b!alice"})))
        .mount(&server)
        .await;

    let client = common::client_for(&server, common::fast_retry());
    let response = client
        .execute_with_retry(Method::GET, "/users/alice/drive", None)
        .await
        .expect("request succeeds after refresh");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_repeated_401_is_reported_as_unauthorized() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("POST"))
        .and(path("/drives/src/items/f1/copy"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let request = drivemirror_core::domain::CopyRequest {
        source_drive: common::drive("src"),
        source_item: common::item("f1"),
        target_drive: common::drive("dst"),
        target_folder: common::item("t1"),
        desired_name: "a.txt".into(),
    };
    let err = drivemirror_graph::copy::submit_copy(&client, &request)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MirrorError::RequestFailure {
            kind: RequestFailureKind::Unauthorized,
            ..
        }
    ));
}

#[tokio::test]
async fn test_token_endpoint_rejection_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(common::TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(&server)
        .await;

    let client = common::client_for(&server, common::fast_retry());
    let err = list_children(&client, &common::drive("d1"), &common::item("root-id"))
        .await
        .unwrap_err();
    assert!(err.is_fatal(), "expected AuthFailure, got {err:?}");
}

#[tokio::test]
async fn test_token_endpoint_outage_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(common::TOKEN_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    common::mount_token(&server, "app-token").await;

    Mock::given(method("GET"))
        .and(path("/drives/d1/items/root-id/children"))
        .and(header("authorization", "Bearer app-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client_for(&server, common::fast_retry());
    let children = list_children(&client, &common::drive("d1"), &common::item("root-id"))
        .await
        .expect("listing after token endpoint recovers");
    assert!(children.is_empty());
}

#[tokio::test]
async fn test_persistent_token_outage_is_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(common::TOKEN_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .expect(4)
        .mount(&server)
        .await;

    let client = common::client_for(&server, common::fast_retry());
    let err = list_children(&client, &common::drive("d1"), &common::item("root-id"))
        .await
        .unwrap_err();
    assert!(!err.is_fatal(), "outage must not abort the run: {err:?}");
}

#[tokio::test]
async fn test_warm_up_rides_out_token_outage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(common::TOKEN_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    common::mount_token(&server, "app-token").await;

    let client = common::client_for(&server, common::fast_retry());
    client.warm_up().await.expect("token after two outages");
}
