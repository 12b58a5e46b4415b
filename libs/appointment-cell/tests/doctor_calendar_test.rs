use axum::{
    body::{to_bytes, Body},
    http::{header::AUTHORIZATION, Request, StatusCode},
};
use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::doctor_calendar_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

struct DoctorDesk {
    server: MockServer,
    config: TestConfig,
    doctor_id: Uuid,
    user: TestUser,
}

impl DoctorDesk {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let desk = Self {
            config: TestConfig::with_supabase_url(server.uri()),
            doctor_id: Uuid::new_v4(),
            user: TestUser::doctor("karim@example.com"),
            server,
        };

        Mock::given(method("GET"))
            .and(path("/rest/v1/doctors"))
            .and(query_param("user_id", format!("eq.{}", desk.user.id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSupabaseResponses::doctor_response(&desk.doctor_id.to_string(), &desk.user.id, None)
            ])))
            .mount(&desk.server)
            .await;

        desk
    }

    fn consultation(&self, start: chrono::DateTime<Utc>) -> Value {
        MockSupabaseResponses::consultation_response(
            &Uuid::new_v4().to_string(),
            &self.doctor_id.to_string(),
            &Uuid::new_v4().to_string(),
            start,
            30,
        )
    }

    async fn get(&self, uri: &str, user: &TestUser) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .header(AUTHORIZATION, JwtTestUtils::bearer(user, &self.config))
            .body(Body::empty())
            .unwrap();

        let response = doctor_calendar_routes(self.config.to_arc()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

#[tokio::test]
async fn test_defaults_to_current_month() {
    let desk = DoctorDesk::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("doctor_id", format!("eq.{}", desk.doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&desk.server)
        .await;

    let (status, body) = desk.get("/consultations", &desk.user).await;

    let today = Utc::now().date_naive();
    let first = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period"]["start"], json!(first));
    assert_eq!(body["total_consultations"], json!(0));
    assert_eq!(body["all_consultations"], json!([]));
}

#[tokio::test]
async fn test_explicit_range_groups_by_day() {
    let desk = DoctorDesk::start().await;
    let rows = vec![
        desk.consultation(Utc.with_ymd_and_hms(2030, 6, 3, 9, 0, 0).unwrap()),
        desk.consultation(Utc.with_ymd_and_hms(2030, 6, 3, 14, 0, 0).unwrap()),
        desk.consultation(Utc.with_ymd_and_hms(2030, 6, 4, 10, 0, 0).unwrap()),
    ];
    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("doctor_id", format!("eq.{}", desk.doctor_id)))
        .and(query_param("start_time", "gte.2030-06-03T00:00:00+00:00"))
        .and(query_param("start_time", "lt.2030-06-05T00:00:00+00:00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(rows)))
        .expect(1)
        .mount(&desk.server)
        .await;

    let (status, body) = desk
        .get("/consultations?start_date=2030-06-03&end_date=2030-06-04", &desk.user)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period"], json!({ "start": "2030-06-03", "end": "2030-06-04" }));
    assert_eq!(body["total_consultations"], json!(3));
    assert_eq!(body["consultations_by_date"]["2030-06-03"].as_array().unwrap().len(), 2);
    assert_eq!(body["consultations_by_date"]["2030-06-04"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_month_filter_covers_whole_month() {
    let desk = DoctorDesk::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("start_time", "gte.2030-02-01T00:00:00+00:00"))
        .and(query_param("start_time", "lt.2030-03-01T00:00:00+00:00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&desk.server)
        .await;

    let (status, body) = desk.get("/consultations?year=2030&month=2", &desk.user).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period"]["end"], json!("2030-02-28"));
}

#[tokio::test]
async fn test_invalid_month_is_bad_request() {
    let desk = DoctorDesk::start().await;

    let (status, body) = desk.get("/consultations?year=2030&month=13", &desk.user).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("month"));
}

#[tokio::test]
async fn test_only_doctors_have_a_calendar() {
    let desk = DoctorDesk::start().await;

    let (status, _) = desk.get("/consultations", &TestUser::patient("salma@example.com")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_doctor_without_profile_is_not_found() {
    let desk = DoctorDesk::start().await;
    let stranger = TestUser::doctor("new@example.com");
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("user_id", format!("eq.{}", stranger.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&desk.server)
        .await;

    let (status, _) = desk.get("/consultations", &stranger).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
