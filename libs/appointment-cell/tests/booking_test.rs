use axum::{
    body::{to_bytes, Body},
    http::{header::{AUTHORIZATION, CONTENT_TYPE}, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::{admin_calendar_routes, consultation_routes, patient_routes};
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

const WEEKDAYS: &str = "Lun-Ven 9:00-17:00";

/// 3 June 2030 is a Monday.
fn monday(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 3, h, m, 0).unwrap()
}

struct Clinic {
    server: MockServer,
    config: TestConfig,
    doctor_id: Uuid,
    patient_id: Uuid,
    patient_user: TestUser,
}

impl Clinic {
    async fn start(schedule: Option<&str>) -> Self {
        Self::start_in_zone(schedule, Tz::UTC).await
    }

    async fn start_in_zone(schedule: Option<&str>, timezone: Tz) -> Self {
        let server = MockServer::start().await;
        let mut config = TestConfig::with_supabase_url(server.uri());
        config.scheduling.timezone = timezone;
        let clinic = Self {
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            patient_user: TestUser::patient("salma@example.com"),
            server,
            config,
        };

        Mock::given(method("GET"))
            .and(path("/rest/v1/doctors"))
            .and(query_param("id", format!("eq.{}", clinic.doctor_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSupabaseResponses::doctor_response(&clinic.doctor_id.to_string(), &Uuid::new_v4().to_string(), schedule)
            ])))
            .mount(&clinic.server)
            .await;

        let patient = MockSupabaseResponses::patient_response(&clinic.patient_id.to_string(), &clinic.patient_user.id);
        Mock::given(method("GET"))
            .and(path("/rest/v1/patients"))
            .and(query_param("user_id", format!("eq.{}", clinic.patient_user.id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([patient.clone()])))
            .mount(&clinic.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/patients"))
            .and(query_param("id", format!("eq.{}", clinic.patient_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([patient])))
            .mount(&clinic.server)
            .await;

        clinic
    }

    fn consultation(&self, id: Uuid, start: DateTime<Utc>) -> Value {
        MockSupabaseResponses::consultation_response(
            &id.to_string(),
            &self.doctor_id.to_string(),
            &self.patient_id.to_string(),
            start,
            30,
        )
    }

    async fn existing_consultations(&self, rows: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/consultations"))
            .and(query_param("doctor_id", format!("eq.{}", self.doctor_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(rows)))
            .mount(&self.server)
            .await;
    }

    async fn stored_consultation(&self, id: Uuid, start: DateTime<Utc>) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/consultations"))
            .and(query_param("id", format!("eq.{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([self.consultation(id, start)])))
            .mount(&self.server)
            .await;
    }

    async fn insert_returns(&self, status: u16, body: Value, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/rest/v1/consultations"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    fn patient_bearer(&self) -> String {
        JwtTestUtils::bearer(&self.patient_user, &self.config)
    }

    fn admin_bearer(&self) -> String {
        JwtTestUtils::bearer(&TestUser::admin("admin@example.com"), &self.config)
    }
}

async fn send(app: Router, method: Method, uri: &str, bearer: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, bearer)
        .header(CONTENT_TYPE, "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

// ==============================================================================
// PATIENT SELF-BOOKING
// ==============================================================================

#[tokio::test]
async fn test_patient_books_free_slot() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;
    clinic.existing_consultations(vec![]).await;
    let created = clinic.consultation(Uuid::new_v4(), monday(10, 0));
    clinic.insert_returns(201, json!([created]), 1).await;

    let (status, body) = send(
        patient_routes(clinic.config.to_arc()),
        Method::POST,
        "/appointments",
        &clinic.patient_bearer(),
        Some(json!({
            "doctor_id": clinic.doctor_id,
            "start_time": monday(10, 0),
            "motif": "Routine check-up"
        })),
    ).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["doctor_id"], json!(clinic.doctor_id));
    assert_eq!(body["patient_id"], json!(clinic.patient_id));
}

#[tokio::test]
async fn test_patient_books_with_local_time() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;
    clinic.existing_consultations(vec![]).await;
    let created = clinic.consultation(Uuid::new_v4(), monday(10, 0));
    Mock::given(method("POST"))
        .and(path("/rest/v1/consultations"))
        .and(body_partial_json(json!({ "start_time": "2030-06-03T10:00:00+00:00" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([created])))
        .expect(1)
        .mount(&clinic.server)
        .await;

    let (status, _) = send(
        patient_routes(clinic.config.to_arc()),
        Method::POST,
        "/appointments",
        &clinic.patient_bearer(),
        Some(json!({ "doctor_id": clinic.doctor_id, "start_time": "2030-06-03 10:00:00" })),
    ).await;

    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_staff_booking_reads_local_time_in_clinic_zone() {
    let clinic = Clinic::start_in_zone(Some(WEEKDAYS), chrono_tz::Europe::Paris).await;
    clinic.existing_consultations(vec![]).await;
    let created = clinic.consultation(Uuid::new_v4(), monday(8, 0));
    Mock::given(method("POST"))
        .and(path("/rest/v1/consultations"))
        .and(body_partial_json(json!({
            "start_time": "2030-06-03T08:00:00+00:00",
            "end_time": "2030-06-03T08:30:00+00:00"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([created])))
        .expect(1)
        .mount(&clinic.server)
        .await;

    let (status, body) = send(
        consultation_routes(clinic.config.to_arc()),
        Method::POST,
        "/",
        &clinic.admin_bearer(),
        Some(json!({
            "doctor_id": clinic.doctor_id,
            "patient_id": clinic.patient_id,
            "start_time": "2030-06-03T10:00:00"
        })),
    ).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["start_time"], json!(monday(8, 0)));
}

#[tokio::test]
async fn test_local_time_in_dst_gap_is_bad_request() {
    let clinic = Clinic::start_in_zone(None, chrono_tz::Europe::Paris).await;
    clinic.existing_consultations(vec![]).await;
    clinic.insert_returns(201, json!([]), 0).await;

    // Paris clocks jump from 02:00 to 03:00 on 31 March 2030.
    let (status, body) = send(
        patient_routes(clinic.config.to_arc()),
        Method::POST,
        "/appointments",
        &clinic.patient_bearer(),
        Some(json!({ "doctor_id": clinic.doctor_id, "start_time": "2030-03-31 02:30:00" })),
    ).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("2030-03-31"));
}

#[tokio::test]
async fn test_overlapping_booking_is_conflict() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;
    clinic.existing_consultations(vec![clinic.consultation(Uuid::new_v4(), monday(10, 0))]).await;
    clinic.insert_returns(201, json!([]), 0).await;

    let (status, body) = send(
        patient_routes(clinic.config.to_arc()),
        Method::POST,
        "/appointments",
        &clinic.patient_bearer(),
        Some(json!({ "doctor_id": clinic.doctor_id, "start_time": monday(10, 15) })),
    ).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("overlaps"));
}

#[tokio::test]
async fn test_booking_outside_hours_is_bad_request() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;
    clinic.existing_consultations(vec![]).await;
    clinic.insert_returns(201, json!([]), 0).await;

    let saturday = monday(10, 0) + Duration::days(5);
    let (status, _) = send(
        patient_routes(clinic.config.to_arc()),
        Method::POST,
        "/appointments",
        &clinic.patient_bearer(),
        Some(json!({ "doctor_id": clinic.doctor_id, "start_time": saturday })),
    ).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unreadable_schedule_is_unprocessable() {
    let clinic = Clinic::start(Some("sur rendez-vous uniquement")).await;
    clinic.existing_consultations(vec![]).await;
    clinic.insert_returns(201, json!([]), 0).await;

    let (status, _) = send(
        patient_routes(clinic.config.to_arc()),
        Method::POST,
        "/appointments",
        &clinic.patient_bearer(),
        Some(json!({ "doctor_id": clinic.doctor_id, "start_time": monday(10, 0) })),
    ).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_concurrent_insert_rejected_by_storage_is_conflict() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;
    clinic.existing_consultations(vec![]).await;
    clinic.insert_returns(
        409,
        MockSupabaseResponses::error_response("conflicting key value violates exclusion constraint", "23P01"),
        1,
    ).await;

    let (status, _) = send(
        patient_routes(clinic.config.to_arc()),
        Method::POST,
        "/appointments",
        &clinic.patient_bearer(),
        Some(json!({ "doctor_id": clinic.doctor_id, "start_time": monday(11, 0) })),
    ).await;

    assert_eq!(status, StatusCode::CONFLICT);
}

// ==============================================================================
// CANCELLATION
// ==============================================================================

async fn mount_delete(clinic: &Clinic, id: Uuid, start: DateTime<Utc>, expected_calls: u64) {
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([clinic.consultation(id, start)])))
        .expect(expected_calls)
        .mount(&clinic.server)
        .await;
}

#[tokio::test]
async fn test_patient_cancels_with_notice() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;
    let id = Uuid::new_v4();
    let start = Utc::now() + Duration::hours(25);
    clinic.stored_consultation(id, start).await;
    mount_delete(&clinic, id, start, 1).await;

    let (status, body) = send(
        patient_routes(clinic.config.to_arc()),
        Method::DELETE,
        &format!("/appointments/{}", id),
        &clinic.patient_bearer(),
        None,
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_late_cancellation_is_refused() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;
    let id = Uuid::new_v4();
    let start = Utc::now() + Duration::hours(23);
    clinic.stored_consultation(id, start).await;
    mount_delete(&clinic, id, start, 0).await;

    let (status, body) = send(
        patient_routes(clinic.config.to_arc()),
        Method::DELETE,
        &format!("/appointments/{}", id),
        &clinic.patient_bearer(),
        None,
    ).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("24 hours"));
}

#[tokio::test]
async fn test_cancelling_another_patients_consultation_is_forbidden() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;
    let id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(3);
    let mut row = clinic.consultation(id, start);
    row["patient_id"] = json!(Uuid::new_v4());
    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&clinic.server)
        .await;
    mount_delete(&clinic, id, start, 0).await;

    let (status, _) = send(
        patient_routes(clinic.config.to_arc()),
        Method::DELETE,
        &format!("/appointments/{}", id),
        &clinic.patient_bearer(),
        None,
    ).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ==============================================================================
// STAFF AND ADMIN FLOWS
// ==============================================================================

#[tokio::test]
async fn test_update_ignores_its_own_slot() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;
    let id = Uuid::new_v4();
    clinic.stored_consultation(id, monday(14, 0)).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("doctor_id", format!("eq.{}", clinic.doctor_id)))
        .and(query_param("id", format!("neq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&clinic.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([clinic.consultation(id, monday(14, 15))])))
        .expect(1)
        .mount(&clinic.server)
        .await;

    let (status, body) = send(
        admin_calendar_routes(clinic.config.to_arc()),
        Method::PUT,
        &format!("/consultations/{}", id),
        &clinic.admin_bearer(),
        Some(json!({ "start_time": monday(14, 15) })),
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(id));
}

#[tokio::test]
async fn test_slot_check_reports_decision() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;
    clinic.existing_consultations(vec![clinic.consultation(Uuid::new_v4(), monday(9, 0))]).await;
    let doctor = JwtTestUtils::bearer(&TestUser::doctor("karim@example.com"), &clinic.config);

    let uri = |start: DateTime<Utc>| format!(
        "/check?doctor_id={}&start_time={}",
        clinic.doctor_id,
        urlencoding::encode(&start.to_rfc3339())
    );

    let (status, body) = send(consultation_routes(clinic.config.to_arc()), Method::GET, &uri(monday(9, 0)), &doctor, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], json!(false));
    assert_eq!(body["decision"]["reason"], json!("ScheduleConflict"));

    let (_, body) = send(consultation_routes(clinic.config.to_arc()), Method::GET, &uri(monday(12, 0)), &doctor, None).await;
    assert_eq!(body["available"], json!(true));
}

#[tokio::test]
async fn test_patients_cannot_use_staff_routes() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;

    let (status, _) = send(
        consultation_routes(clinic.config.to_arc()),
        Method::GET,
        "/",
        &clinic.patient_bearer(),
        None,
    ).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        admin_calendar_routes(clinic.config.to_arc()),
        Method::GET,
        "/",
        &JwtTestUtils::bearer(&TestUser::doctor("karim@example.com"), &clinic.config),
        None,
    ).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_calendar_rejects_inverted_range() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;

    let (status, _) = send(
        admin_calendar_routes(clinic.config.to_arc()),
        Method::GET,
        "/?start=2030-06-10&end=2030-06-03",
        &clinic.admin_bearer(),
        None,
    ).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_calendar_lists_patients() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;
    clinic.existing_consultations(vec![clinic.consultation(Uuid::new_v4(), monday(9, 0))]).await;
    let other_patient = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("order", "last_name.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&clinic.patient_id.to_string(), &clinic.patient_user.id),
            MockSupabaseResponses::patient_response(&other_patient.to_string(), &Uuid::new_v4().to_string()),
        ])))
        .mount(&clinic.server)
        .await;

    let (status, body) = send(
        admin_calendar_routes(clinic.config.to_arc()),
        Method::GET,
        &format!("/?start=2030-06-03&end=2030-06-07&doctor_id={}", clinic.doctor_id),
        &clinic.admin_bearer(),
        None,
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consultations"].as_array().unwrap().len(), 1);
    assert_eq!(body["doctors"][0]["id"], json!(clinic.doctor_id));
    let patients = body["patients"].as_array().unwrap();
    assert_eq!(patients.len(), 2);
    assert_eq!(patients[1]["id"], json!(other_patient));
}

#[tokio::test]
async fn test_delete_unknown_consultation_is_not_found() {
    let clinic = Clinic::start(Some(WEEKDAYS)).await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/consultations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&clinic.server)
        .await;

    let (status, _) = send(
        consultation_routes(clinic.config.to_arc()),
        Method::DELETE,
        &format!("/{}", Uuid::new_v4()),
        &clinic.admin_bearer(),
        None,
    ).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
