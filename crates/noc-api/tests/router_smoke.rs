use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use noc_api::{create_router, test_state};
use noc_common::Entity;

fn sample_entities() -> Vec<Entity> {
    vec![
        Entity {
            code: "21232".into(),
            title: "Software developers and programmers".into(),
            description: "Write, modify, integrate and test software code.".into(),
            duties: vec![
                "Write, modify, integrate and test software code".into(),
                "Maintain existing computer programs by making modifications".into(),
            ],
            reference_url: "https://example.org/21232".into(),
            ..Entity::default()
        },
        Entity {
            code: "31301".into(),
            title: "Registered nurses".into(),
            description: "Provide direct nursing care to patients.".into(),
            duties: vec!["Administer medications and treatments to patients".into()],
            ..Entity::default()
        },
    ]
}

fn match_request(description: &str, top_k: Option<usize>, api_key: Option<&str>) -> Request<Body> {
    let mut body = json!({ "description": description });
    if let Some(top_k) = top_k {
        body["top_k"] = json!(top_k);
    }

    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/match")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }

    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoints_respond() {
    let app = create_router(test_state(sample_entities(), None));

    for uri in ["/health", "/livez", "/readyz"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }
}

#[tokio::test]
async fn match_requires_api_key_when_configured() {
    let app = create_router(test_state(sample_entities(), Some("secret")));

    let response = app
        .clone()
        .oneshot(match_request("Develop software for clients", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(match_request(
            "Develop software for clients",
            None,
            Some("secret"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn match_returns_ranked_results() {
    let app = create_router(test_state(sample_entities(), None));

    let response = app
        .oneshot(match_request(
            "Write, modify, integrate and test software code. \
             Maintain existing computer programs by making modifications.",
            Some(2),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let results = body_json(response).await;
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["rank"], 1);
    assert_eq!(results[0]["noc_code"], "21232");
    assert!(!results[0]["matched_duties"].as_array().unwrap().is_empty());

    let first = results[0]["combined_score"].as_f64().unwrap();
    let second = results[1]["combined_score"].as_f64().unwrap();
    assert!(first >= second);
}

#[tokio::test]
async fn invalid_top_k_is_a_bad_request() {
    let app = create_router(test_state(sample_entities(), None));

    let response = app
        .oneshot(match_request("Develop software for clients", Some(0), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn blank_description_is_a_bad_request() {
    let app = create_router(test_state(sample_entities(), None));

    let response = app
        .oneshot(match_request("   ", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn entity_lookup_finds_known_codes() {
    let app = create_router(test_state(sample_entities(), None));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/entities/21232")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let entity = body_json(response).await;
    assert_eq!(entity["title"], "Software developers and programmers");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/entities/99999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn index_status_reports_manifest_counts() {
    let app = create_router(test_state(sample_entities(), None));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/index/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let status = body_json(response).await;
    assert_eq!(status["entity_count"], 2);
    assert_eq!(status["duty_count"], 3);
    assert_eq!(status["embedder"], "hash");
}
