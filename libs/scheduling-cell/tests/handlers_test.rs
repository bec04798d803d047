use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::models::CreateSlotRequest;
use scheduling_cell::router::{scheduling_routes, scheduling_routes_with_engine};
use scheduling_cell::services::engine::SchedulingEngine;
use scheduling_cell::services::records::{DocumentStore, InMemoryDocumentStore};
use scheduling_cell::services::store::{InMemorySlotStore, SlotStore};
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockStoreResponses, TestConfig, TestUser};

const SLOTS_PATH: &str = "/rest/v1/appointment_slots";

async fn create_test_app(config: AppConfig) -> Router {
    scheduling_routes(Arc::new(config))
}

fn test_config(mock_server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.database_api_url = mock_server.uri();
    config
}

fn authorized_request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json");

    match body {
        Some(value) => builder.body(Body::from(value.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server)).await;

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone()).await;

    let user = TestUser::doctor("doctor@example.com");
    let token = JwtTestUtils::create_expired_token(&user, &config.jwt_secret);

    let response = app
        .oneshot(authorized_request("GET", "/", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn doctor_creates_a_free_slot() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone()).await;

    let user = TestUser::doctor("doctor@example.com");
    let doctor_id = Uuid::parse_str(&user.id).unwrap();
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(24));

    let start = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 6, 2, 10, 30, 0).unwrap();

    // Conflict-check range query finds nothing.
    Mock::given(method("GET"))
        .and(path(SLOTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // Insert returns the stored representation.
    Mock::given(method("POST"))
        .and(path(SLOTS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockStoreResponses::slot_row(Uuid::new_v4(), doctor_id, None, start, end, "free")
        ])))
        .mount(&mock_server)
        .await;

    let request_body = CreateSlotRequest {
        doctor_id,
        start_time: start,
        duration_minutes: 30,
        patient_id: None,
        title: None,
        symptoms: None,
    };

    let response = app
        .oneshot(authorized_request(
            "POST",
            "/",
            &token,
            Some(serde_json::to_value(&request_body).unwrap()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["slot"]["status"], json!("free"));
}

#[tokio::test]
async fn overlapping_create_maps_to_conflict() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone()).await;

    let user = TestUser::doctor("doctor@example.com");
    let doctor_id = Uuid::parse_str(&user.id).unwrap();
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(24));

    let start = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 6, 2, 9, 30, 0).unwrap();

    // The range query reports an existing booking in the window.
    Mock::given(method("GET"))
        .and(path(SLOTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::slot_row(
                Uuid::new_v4(),
                doctor_id,
                Some(Uuid::new_v4()),
                start,
                end,
                "booked"
            )
        ])))
        .mount(&mock_server)
        .await;

    let request_body = CreateSlotRequest {
        doctor_id,
        start_time: Utc.with_ymd_and_hms(2025, 6, 2, 9, 15, 0).unwrap(),
        duration_minutes: 30,
        patient_id: None,
        title: None,
        symptoms: None,
    };

    let response = app
        .oneshot(authorized_request(
            "POST",
            "/",
            &token,
            Some(serde_json::to_value(&request_body).unwrap()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_duration_maps_to_bad_request() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone()).await;

    let user = TestUser::doctor("doctor@example.com");
    let doctor_id = Uuid::parse_str(&user.id).unwrap();
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(24));

    let request_body = CreateSlotRequest {
        doctor_id,
        start_time: Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
        duration_minutes: 20,
        patient_id: None,
        title: None,
        symptoms: None,
    };

    let response = app
        .oneshot(authorized_request(
            "POST",
            "/",
            &token,
            Some(serde_json::to_value(&request_body).unwrap()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patient_booking_for_someone_else_is_forbidden() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone()).await;

    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(24));

    let request_body = CreateSlotRequest {
        doctor_id: Uuid::new_v4(),
        start_time: Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
        duration_minutes: 30,
        patient_id: Some(Uuid::new_v4()),
        title: None,
        symptoms: None,
    };

    let response = app
        .oneshot(authorized_request(
            "POST",
            "/",
            &token,
            Some(serde_json::to_value(&request_body).unwrap()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn patient_listing_returns_their_slots() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone()).await;

    let user = TestUser::patient("patient@example.com");
    let patient_id = Uuid::parse_str(&user.id).unwrap();
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(24));

    let start = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 6, 2, 10, 30, 0).unwrap();

    Mock::given(method("GET"))
        .and(path(SLOTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::slot_row(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Some(patient_id),
                start,
                end,
                "booked"
            )
        ])))
        .mount(&mock_server)
        .await;

    let response = app
        .oneshot(authorized_request("GET", "/", &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], json!(1));
    assert_eq!(body["slots"][0]["patient_id"], json!(patient_id));
}

/// Full lifecycle over HTTP against an in-memory-backed engine: create,
/// book, confirm, then the patient's cancel is refused.
#[tokio::test]
async fn booking_lifecycle_over_http() {
    let config = TestConfig::default().to_app_config();
    let engine = Arc::new(SchedulingEngine::new(
        Arc::new(InMemorySlotStore::new()) as Arc<dyn SlotStore>,
        Arc::new(InMemoryDocumentStore::new()) as Arc<dyn DocumentStore>,
    ));
    let app = scheduling_routes_with_engine(Arc::new(config.clone()), engine);

    let doctor = TestUser::doctor("doctor@example.com");
    let doctor_id = Uuid::parse_str(&doctor.id).unwrap();
    let doctor_token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, Some(24));

    let patient = TestUser::patient("patient@example.com");
    let patient_token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, Some(24));

    // Doctor publishes a free window.
    let create_body = json!({
        "doctor_id": doctor_id,
        "start_time": "2025-06-02T10:00:00Z",
        "duration_minutes": 30
    });
    let response = app
        .clone()
        .oneshot(authorized_request("POST", "/", &doctor_token, Some(create_body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let slot_id = body["slot"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["slot"]["status"], json!("free"));

    // Patient books it.
    let response = app
        .clone()
        .oneshot(authorized_request(
            "PUT",
            &format!("/{}", slot_id),
            &patient_token,
            Some(json!({ "status": "booked" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["slot"]["status"], json!("booked"));
    assert_eq!(body["slot"]["patient_id"].as_str(), Some(patient.id.as_str()));

    // Doctor confirms arrival.
    let response = app
        .clone()
        .oneshot(authorized_request(
            "POST",
            &format!("/{}/confirm", slot_id),
            &doctor_token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["slot"]["status"], json!("occupied"));

    // The patient can no longer cancel the completed appointment.
    let response = app
        .clone()
        .oneshot(authorized_request(
            "POST",
            &format!("/{}/cancel", slot_id),
            &patient_token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_slot_maps_to_not_found() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);
    let app = create_test_app(config.clone()).await;

    let user = TestUser::doctor("doctor@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path(SLOTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let response = app
        .oneshot(authorized_request(
            "GET",
            &format!("/{}", Uuid::new_v4()),
            &token,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
