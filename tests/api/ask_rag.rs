use serde_json::{json, Value};

use crate::helpers::spawn_app;

#[tokio::test]
async fn an_empty_query_is_rejected_with_a_400() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/api/rag", &app.address))
        .json(&json!({ "query": "" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.expect("Failed to parse error body");
    assert_eq!(body["error"], "Query cannot be empty");
}

#[tokio::test]
async fn a_whitespace_only_query_is_rejected_with_a_400() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/api/rag", &app.address))
        .json(&json!({ "query": "   \n\t " }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.expect("Failed to parse error body");
    assert_eq!(body["error"], "Query cannot be empty");
}

#[tokio::test]
async fn an_oversized_query_is_rejected_with_a_400_before_any_upstream_call() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // One character over the server-side bound
    let query = "a".repeat(1001);

    let response = client
        .post(&format!("{}/api/rag", &app.address))
        .json(&json!({ "query": query }))
        .send()
        .await
        .expect("Failed to execute request");

    // The test app has no reachable upstream services: getting the specific
    // validation message back proves the request short-circuited before the
    // embedding call
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.expect("Failed to parse error body");
    assert_eq!(
        body["error"],
        "Query exceeds maximum length of 1000 characters"
    );
}

#[tokio::test]
async fn a_missing_query_field_is_rejected_with_a_400() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/api/rag", &app.address))
        .json(&json!({}))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn an_embedding_upstream_failure_is_a_generic_500() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // A valid query proceeds past validation and hits the unreachable
    // embeddings endpoint configured by the test harness
    let response = client
        .post(&format!("{}/api/rag", &app.address))
        .json(&json!({ "query": "Where can I buy a Drake Cutlass?" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().await.expect("Failed to parse error body");
    // No upstream detail leaks into the response body
    assert_eq!(body["error"], "Failed to process request");
}
