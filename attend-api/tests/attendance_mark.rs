use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{Duration, Utc};
use rocket::http::{Cookie, Status};
use rocket::local::asynchronous::Client;
use serde_json::json;

use attend_api::orm::testing::{
    AMIRA_SESSION_COOKIE, CS350_COURSE_ID, INSTRUCTOR_SESSION_COOKIE, OMAR_SESSION_COOKIE,
    test_rocket,
};

fn amira_cookie() -> Cookie<'static> {
    Cookie::new("session", AMIRA_SESSION_COOKIE)
}

fn data_uri(payload: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(payload))
}

/// Helper to open a session for CS350 and return `(session_id, token)`.
async fn open_session(
    client: &Client,
    start_offset_minutes: i64,
    duration_minutes: i64,
) -> (i64, String) {
    let start_time = (Utc::now().naive_utc() + Duration::minutes(start_offset_minutes))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();
    let response = client
        .post("/api/1/sessions")
        .cookie(Cookie::new("session", INSTRUCTOR_SESSION_COOKIE))
        .json(&json!({
            "course_id": CS350_COURSE_ID,
            "name": "Lecture 4",
            "start_time": start_time,
            "duration_minutes": duration_minutes,
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    let session: serde_json::Value = response.into_json().await.expect("valid session JSON");
    (
        session["id"].as_i64().expect("session id"),
        session["token"].as_str().expect("token").to_string(),
    )
}

async fn attendance_rows(client: &Client, session_id: i64) -> serde_json::Value {
    let response = client
        .get(format!("/api/1/sessions/{}/attendance", session_id))
        .cookie(Cookie::new("session", INSTRUCTOR_SESSION_COOKIE))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    response.into_json().await.expect("valid JSON")
}

#[rocket::async_test]
async fn test_mark_requires_a_student_login() {
    let client = Client::tracked(test_rocket())
        .await
        .expect("valid rocket instance");
    let (id, _) = open_session(&client, -5, 60).await;

    let response = client
        .post("/api/1/attendance/mark")
        .json(&json!({
            "session_id": id,
            "captured_image": data_uri(b"face:amira"),
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn test_mark_unknown_session_is_not_found() {
    let client = Client::tracked(test_rocket())
        .await
        .expect("valid rocket instance");

    let response = client
        .post("/api/1/attendance/mark")
        .cookie(amira_cookie())
        .json(&json!({
            "session_id": 9999,
            "captured_image": data_uri(b"face:amira"),
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NotFound);
    let body: serde_json::Value = response.into_json().await.expect("valid JSON");
    assert_eq!(body["error"], "unknown_session");
}

#[rocket::async_test]
async fn test_matching_capture_records_attendance_once() {
    let client = Client::tracked(test_rocket())
        .await
        .expect("valid rocket instance");
    let (id, _) = open_session(&client, -5, 60).await;

    let mark = json!({
        "session_id": id,
        "captured_image": data_uri(b"face:amira"),
    });

    let response = client
        .post("/api/1/attendance/mark")
        .cookie(amira_cookie())
        .json(&mark)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    let body: serde_json::Value = response.into_json().await.expect("valid JSON");
    assert_eq!(body["title"], "Attendance Marked!");
    assert!(
        body["message"]
            .as_str()
            .expect("message")
            .contains("Operating Systems")
    );

    // Resubmitting confirms instead of duplicating, with the original
    // timestamp.
    let recorded_at = body["recorded_at"].clone();
    let response = client
        .post("/api/1/attendance/mark")
        .cookie(amira_cookie())
        .json(&mark)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: serde_json::Value = response.into_json().await.expect("valid JSON");
    assert_eq!(body["title"], "Already Marked");
    assert_eq!(body["recorded_at"], recorded_at);

    let rows = attendance_rows(&client, id).await;
    let rows = rows.as_array().expect("array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["student_name"], "Amira Khaled");
    assert_eq!(rows[0]["status"], "Present");
    assert_eq!(rows[0]["face_recognized"], true);
}

#[rocket::async_test]
async fn test_mismatching_capture_writes_nothing() {
    let client = Client::tracked(test_rocket())
        .await
        .expect("valid rocket instance");
    let (id, token) = open_session(&client, -5, 60).await;

    // Same length as the reference, every byte different.
    let response = client
        .post("/api/1/attendance/mark")
        .cookie(amira_cookie())
        .json(&json!({
            "session_id": id,
            "captured_image": data_uri(b"zzzzzzzzzz"),
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let body: serde_json::Value = response.into_json().await.expect("valid JSON");
    assert_eq!(body["error"], "face_mismatch");
    assert_eq!(body["rejoin_token"], token);

    assert!(attendance_rows(&client, id).await.as_array().expect("array").is_empty());
}

#[rocket::async_test]
async fn test_capture_without_a_face_is_rejected() {
    let client = Client::tracked(test_rocket())
        .await
        .expect("valid rocket instance");
    let (id, _) = open_session(&client, -5, 60).await;

    let response = client
        .post("/api/1/attendance/mark")
        .cookie(amira_cookie())
        .json(&json!({
            "session_id": id,
            "captured_image": data_uri(b"noface"),
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let body: serde_json::Value = response.into_json().await.expect("valid JSON");
    assert_eq!(body["error"], "no_face_detected");
}

#[rocket::async_test]
async fn test_student_without_reference_photo_is_rejected() {
    let client = Client::tracked(test_rocket())
        .await
        .expect("valid rocket instance");
    let (id, _) = open_session(&client, -5, 60).await;

    // Omar is enrolled but has no reference photo on file.
    let response = client
        .post("/api/1/attendance/mark")
        .cookie(Cookie::new("session", OMAR_SESSION_COOKIE))
        .json(&json!({
            "session_id": id,
            "captured_image": data_uri(b"face:omar"),
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let body: serde_json::Value = response.into_json().await.expect("valid JSON");
    assert_eq!(body["error"], "no_reference_on_file");
}

#[rocket::async_test]
async fn test_malformed_captures_are_rejected() {
    let client = Client::tracked(test_rocket())
        .await
        .expect("valid rocket instance");
    let (id, _) = open_session(&client, -5, 60).await;

    let response = client
        .post("/api/1/attendance/mark")
        .cookie(amira_cookie())
        .json(&json!({
            "session_id": id,
            "captured_image": "",
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let body: serde_json::Value = response.into_json().await.expect("valid JSON");
    assert_eq!(body["error"], "missing_captured_image");

    let response = client
        .post("/api/1/attendance/mark")
        .cookie(amira_cookie())
        .json(&json!({
            "session_id": id,
            "captured_image": "data:image/jpeg;base64,@@not-base64@@",
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let body: serde_json::Value = response.into_json().await.expect("valid JSON");
    assert_eq!(body["error"], "image_decode_error");

    assert!(attendance_rows(&client, id).await.as_array().expect("array").is_empty());
}

#[rocket::async_test]
async fn test_marking_a_closed_session_conflicts() {
    let client = Client::tracked(test_rocket())
        .await
        .expect("valid rocket instance");

    // Window already over.
    let (expired_id, _) = open_session(&client, -120, 60).await;
    let response = client
        .post("/api/1/attendance/mark")
        .cookie(amira_cookie())
        .json(&json!({
            "session_id": expired_id,
            "captured_image": data_uri(b"face:amira"),
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);
    let body: serde_json::Value = response.into_json().await.expect("valid JSON");
    assert_eq!(body["error"], "session_closed");

    // Deactivated mid-window.
    let (id, _) = open_session(&client, -5, 60).await;
    let response = client
        .put(format!("/api/1/sessions/{}", id))
        .cookie(Cookie::new("session", INSTRUCTOR_SESSION_COOKIE))
        .json(&json!({ "is_active": false }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let response = client
        .post("/api/1/attendance/mark")
        .cookie(amira_cookie())
        .json(&json!({
            "session_id": id,
            "captured_image": data_uri(b"face:amira"),
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);
}

#[rocket::async_test]
async fn test_concurrent_marks_resolve_to_one_row() {
    let client = Client::untracked(test_rocket())
        .await
        .expect("valid rocket instance");
    let (id, _) = open_session(&client, -5, 60).await;

    let mark = json!({
        "session_id": id,
        "captured_image": data_uri(b"face:amira"),
    });

    let first = client
        .post("/api/1/attendance/mark")
        .cookie(amira_cookie())
        .json(&mark)
        .dispatch();
    let second = client
        .post("/api/1/attendance/mark")
        .cookie(amira_cookie())
        .json(&mark)
        .dispatch();

    let (first, second) = rocket::tokio::join!(first, second);
    let mut statuses = [first.status(), second.status()];
    statuses.sort_by_key(|s| s.code);
    assert_eq!(statuses, [Status::Ok, Status::Created]);

    let rows = attendance_rows(&client, id).await;
    assert_eq!(rows.as_array().expect("array").len(), 1);
}
