mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use appointment_cell::router::appointment_routes;
use common::{monday_at, Harness};
use shared_utils::test_utils::{JwtTestUtils, TestUser};

fn app(harness: &Harness) -> Router {
    appointment_routes(harness.state.clone())
}

fn token_for(harness: &Harness, user: &TestUser) -> String {
    JwtTestUtils::create_test_token(user, &harness.test_config.jwt_secret, Some(1))
}

fn request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json");

    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn booking_body(harness: &Harness, start: &str, minutes: i32) -> Value {
    json!({
        "therapistId": harness.therapist.id,
        "clientId": harness.client.id,
        "startTime": start,
        "durationMinutes": minutes,
        "notes": "first session"
    })
}

#[tokio::test]
async fn test_booking_returns_201_with_id() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.client);

    let response = app(&harness)
        .oneshot(request(
            "POST",
            "/appointments",
            &token,
            Some(booking_body(&harness, "2030-03-04T10:00:00Z", 50)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["id"], body["appointment"]["id"]);
    assert_eq!(body["appointment"]["status"], "agendado");
    assert_eq!(body["appointment"]["duration_minutes"], 50);
}

#[tokio::test]
async fn test_booking_errors_map_to_status_codes() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.client);
    harness.book(monday_at(10, 0), 50).await.unwrap();

    let conflict = app(&harness)
        .oneshot(request(
            "POST",
            "/appointments",
            &token,
            Some(booking_body(&harness, "2030-03-04T09:30:00Z", 50)),
        ))
        .await
        .unwrap();
    assert_eq!(conflict.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(conflict).await["code"], "SlotConflictError");

    let outside = app(&harness)
        .oneshot(request(
            "POST",
            "/appointments",
            &token,
            Some(booking_body(&harness, "2030-03-04T08:00:00Z", 50)),
        ))
        .await
        .unwrap();
    assert_eq!(outside.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(outside).await["code"], "OutsideAvailabilityError");

    let invalid = app(&harness)
        .oneshot(request(
            "POST",
            "/appointments",
            &token,
            Some(booking_body(&harness, "2030-03-04T11:00:00Z", 0)),
        ))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    let body = json_body(invalid).await;
    assert_eq!(body["code"], "ValidationError");
    assert_eq!(body["field"], "duration_minutes");
}

#[tokio::test]
async fn test_malformed_booking_is_bad_request() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.client);

    let missing_offset = app(&harness)
        .oneshot(request(
            "POST",
            "/appointments",
            &token,
            Some(booking_body(&harness, "2030-03-04T10:00:00", 50)),
        ))
        .await
        .unwrap();
    assert_eq!(missing_offset.status(), StatusCode::BAD_REQUEST);

    let not_json = app(&harness)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/appointments")
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(not_json.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_booking_for_someone_else_is_forbidden() {
    let harness = Harness::new().await;
    let stranger = TestUser::client("caio@clinic.test");
    let token = token_for(&harness, &stranger);

    let response = app(&harness)
        .oneshot(request(
            "POST",
            "/appointments",
            &token,
            Some(booking_body(&harness, "2030-03-04T10:00:00Z", 50)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_get_appointment_found_and_missing() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.client);
    let booked = harness.book(monday_at(10, 0), 50).await.unwrap();

    let found = app(&harness)
        .oneshot(request("GET", &format!("/appointments/{}", booked.id), &token, None))
        .await
        .unwrap();
    assert_eq!(found.status(), StatusCode::OK);
    assert_eq!(json_body(found).await["id"], booked.id.to_string());

    let missing = app(&harness)
        .oneshot(request(
            "GET",
            &format!("/appointments/{}", uuid::Uuid::new_v4()),
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_update_returns_next_states() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.therapist);
    let booked = harness.book(monday_at(10, 0), 50).await.unwrap();

    let response = app(&harness)
        .oneshot(request(
            "PUT",
            &format!("/appointments/{}/status", booked.id),
            &token,
            Some(json!({"status": "confirmado"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["appointment"]["status"], "confirmado");
    assert_eq!(body["valid_transitions"], json!(["em_andamento", "cancelado"]));
}

#[tokio::test]
async fn test_illegal_status_update_is_409() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.therapist);
    let booked = harness.book(monday_at(10, 0), 50).await.unwrap();

    let response = app(&harness)
        .oneshot(request(
            "PUT",
            &format!("/appointments/{}/status", booked.id),
            &token,
            Some(json!({"status": "realizado"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "InvalidTransitionError");
}

#[tokio::test]
async fn test_clients_may_cancel_but_not_confirm() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.client);
    let booked = harness.book(monday_at(10, 0), 50).await.unwrap();
    let uri = format!("/appointments/{}/status", booked.id);

    let confirm = app(&harness)
        .oneshot(request("PUT", &uri, &token, Some(json!({"status": "confirmado"}))))
        .await
        .unwrap();
    assert_eq!(confirm.status(), StatusCode::FORBIDDEN);

    let cancel = app(&harness)
        .oneshot(request("PUT", &uri, &token, Some(json!({"status": "cancelado"}))))
        .await
        .unwrap();
    assert_eq!(cancel.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_therapist_appointments_filter_by_status() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.therapist);
    let kept = harness.book(monday_at(9, 0), 50).await.unwrap();
    let dropped = harness.book(monday_at(10, 0), 50).await.unwrap();
    harness
        .state
        .lifecycle
        .transition(
            dropped.id,
            appointment_cell::models::AppointmentStatus::Cancelled,
            None,
            &harness.therapist.context(),
        )
        .await
        .unwrap();

    let uri = format!(
        "/therapists/{}/appointments?start=2030-03-04T00:00:00Z&end=2030-03-05T00:00:00Z&status=agendado,confirmado",
        harness.therapist.id
    );
    let response = app(&harness).oneshot(request("GET", &uri, &token, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], kept.id.to_string());
}

#[tokio::test]
async fn test_unknown_status_filter_is_bad_request() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.therapist);

    let uri = format!(
        "/therapists/{}/appointments?start=2030-03-04T00:00:00Z&end=2030-03-05T00:00:00Z&status=lost",
        harness.therapist.id
    );
    let response = app(&harness).oneshot(request("GET", &uri, &token, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["field"], "status");
}

#[tokio::test]
async fn test_client_sees_own_appointments_only() {
    let harness = Harness::new().await;
    harness.book(monday_at(10, 0), 50).await.unwrap();
    let uri = format!(
        "/clients/{}/appointments?start=2030-03-04T00:00:00Z&end=2030-03-05T00:00:00Z",
        harness.client.id
    );

    let own = app(&harness)
        .oneshot(request("GET", &uri, &token_for(&harness, &harness.client), None))
        .await
        .unwrap();
    assert_eq!(own.status(), StatusCode::OK);
    assert_eq!(json_body(own).await.as_array().unwrap().len(), 1);

    let stranger = TestUser::client("caio@clinic.test");
    let other = app(&harness)
        .oneshot(request("GET", &uri, &token_for(&harness, &stranger), None))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_slots_endpoint_lists_free_times() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.client);
    harness.book(monday_at(10, 0), 50).await.unwrap();

    let uri = format!(
        "/therapists/{}/slots?start=2030-03-04T00:00:00Z&end=2030-03-05T00:00:00Z",
        harness.therapist.id
    );
    let response = app(&harness).oneshot(request("GET", &uri, &token, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["therapist_id"], harness.therapist.id);
    let starts: Vec<&str> = body["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["start_time"].as_str().unwrap())
        .collect();
    assert_eq!(starts, vec!["2030-03-04T09:00:00Z", "2030-03-04T11:00:00Z"]);
}

#[tokio::test]
async fn test_malformed_query_strings_get_json_errors() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.client);

    let uris = [
        format!("/therapists/{}/slots?end=2030-03-05T00:00:00Z", harness.therapist.id),
        format!(
            "/therapists/{}/conflicts?start=2030-03-04T10:30:00&duration_minutes=50",
            harness.therapist.id
        ),
        format!("/clients/{}/appointments?start=yesterday&end=today", harness.client.id),
    ];
    for uri in uris {
        let response = app(&harness).oneshot(request("GET", &uri, &token, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body = json_body(response).await;
        assert_eq!(body["code"], "BadRequest");
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn test_oversized_slot_granularity_is_a_validation_error() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.client);

    let uri = format!(
        "/therapists/{}/slots?start=2030-03-04T00:00:00Z&end=2030-03-05T00:00:00Z&granularity_minutes=1000000000000",
        harness.therapist.id
    );
    let response = app(&harness).oneshot(request("GET", &uri, &token, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "ValidationError");
    assert_eq!(body["field"], "granularity_minutes");
}

#[tokio::test]
async fn test_conflict_preflight_reports_overlaps() {
    let harness = Harness::new().await;
    let token = token_for(&harness, &harness.client);
    let booked = harness.book(monday_at(10, 0), 50).await.unwrap();

    let uri = format!(
        "/therapists/{}/conflicts?start=2030-03-04T10:30:00Z&duration_minutes=50",
        harness.therapist.id
    );
    let response = app(&harness).oneshot(request("GET", &uri, &token, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["has_conflict"], true);
    assert_eq!(body["within_availability"], true);
    assert_eq!(body["conflicting_appointments"], json!([booked.id]));
}

#[tokio::test]
async fn test_requests_without_valid_token_are_rejected() {
    let harness = Harness::new().await;

    let expired = JwtTestUtils::create_expired_token(&harness.client, &harness.test_config.jwt_secret);
    let response = app(&harness)
        .oneshot(request("GET", &format!("/appointments/{}", uuid::Uuid::new_v4()), &expired, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = JwtTestUtils::create_invalid_signature_token(&harness.client);
    let response = app(&harness)
        .oneshot(request("GET", &format!("/appointments/{}", uuid::Uuid::new_v4()), &forged, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
