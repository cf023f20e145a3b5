//! API endpoints for joining a session and marking attendance.
//!
//! These two endpoints are the student-facing half of the engine: `join`
//! runs the validation pipeline for a session link, `mark` runs the face
//! gate and performs the idempotent attendance write.
//!
//! Outcomes that are not errors to the user (an attendance row that already
//! exists) come back as 200 confirmations; everything else carries a
//! machine-readable `error` kind plus a human message.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use rocket::Route;
use rocket::State;
use rocket::http::Status;
use rocket::response::{Redirect, status};
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::face::{
    CompareError, EXTRACTION_TIMEOUT, FaceMatcher, MATCH_TOLERANCE, compare_faces,
    decode_captured_image,
};
use crate::orm::DbConn;
use crate::orm::attendance::{RecordOutcome, find_attendance_for_session, insert_attendance};
use crate::orm::class_session::get_session_by_id;
use crate::orm::course::get_course_by_id;
use crate::orm::join::{JoinIdentity, JoinOutcome, JoinRejection, ensure_session_open, process_join};
use crate::session_guards::AuthenticatedStudent;

/// Error body for join failures. `error` is a stable machine-readable kind;
/// `title` and `message` are ready for display.
#[derive(Serialize, TS)]
#[ts(export)]
pub struct SessionErrorResponse {
    pub error: String,
    pub title: String,
    pub message: String,
    /// Present only for `session_not_started`, so the page can show a
    /// countdown.
    #[ts(type = "string | null")]
    pub starts_at: Option<NaiveDateTime>,
}

/// Confirmation body for a pair that already has an attendance row.
#[derive(Serialize, TS)]
#[ts(export)]
pub struct AlreadyRecordedResponse {
    pub title: String,
    pub message: String,
    #[ts(type = "string")]
    pub recorded_at: NaiveDateTime,
}

/// Payload rendered by the join page when every pipeline stage passed.
#[derive(Serialize, TS)]
#[ts(export)]
pub struct JoinView {
    pub session_id: i32,
    pub session_name: String,
    pub course_name: String,
    pub course_code: String,
    pub student_name: String,
    #[ts(type = "string")]
    pub start_time: NaiveDateTime,
    #[ts(type = "string")]
    pub expiry_time: NaiveDateTime,
}

#[derive(Responder)]
pub enum JoinResponse {
    #[response(status = 200)]
    Ready(Json<JoinView>),
    #[response(status = 200)]
    AlreadyRecorded(Json<AlreadyRecordedResponse>),
    Redirect(Redirect),
    Error(status::Custom<Json<SessionErrorResponse>>),
}

fn session_error(rejection: JoinRejection) -> status::Custom<Json<SessionErrorResponse>> {
    let (status_code, error, title, message, starts_at) = match rejection {
        JoinRejection::InvalidToken => (
            Status::NotFound,
            "invalid_token",
            "Invalid Link",
            "This session link is invalid or has been deleted.".to_string(),
            None,
        ),
        JoinRejection::SessionInactive => (
            Status::Forbidden,
            "session_inactive",
            "Session Inactive",
            "This session has been deactivated by the instructor.".to_string(),
            None,
        ),
        JoinRejection::SessionNotStarted { starts_at } => (
            Status::Conflict,
            "session_not_started",
            "Session Not Started",
            format!("This session will start at {}.", starts_at),
            Some(starts_at),
        ),
        JoinRejection::SessionExpired { expired_at } => (
            Status::Gone,
            "session_expired",
            "Session Expired",
            format!("This session expired at {}.", expired_at),
            None,
        ),
        JoinRejection::NotEnrolled { course_name } => (
            Status::Forbidden,
            "not_enrolled",
            "Not Enrolled",
            format!("You are not enrolled in {}.", course_name),
            None,
        ),
        JoinRejection::StudentNotFound => (
            Status::NotFound,
            "student_not_found",
            "Student Not Found",
            "Your student record could not be found. Please contact the administrator."
                .to_string(),
            None,
        ),
    };
    status::Custom(
        status_code,
        Json(SessionErrorResponse {
            error: error.to_string(),
            title: title.to_string(),
            message,
            starts_at,
        }),
    )
}

/// Join Session endpoint.
///
/// - **URL:** `/api/1/attendance/join/<token>`
/// - **Method:** `GET`
/// - **Purpose:** Validates a session link for the calling student
/// - **Authentication:** Optional; anonymous callers of a joinable session
///   are redirected to login with a return path to this URL
///
/// # Response
///
/// **Success (HTTP 200):** the join-form payload, or an "already marked"
/// confirmation when an attendance row already exists for this pair.
///
/// **Failure:** a `SessionErrorResponse` with `404` (unknown token, or a
/// login whose student record is gone), `403` (inactive session, not
/// enrolled), `409` (not started yet) or `410` (expired).
#[get("/1/attendance/join/<token>")]
pub async fn join_session(
    db: DbConn,
    token: &str,
    identity: JoinIdentity,
) -> Result<JoinResponse, Status> {
    let now = Utc::now().naive_utc();

    let outcome = process_join(&db, token.to_string(), identity, now).await?;

    Ok(match outcome {
        JoinOutcome::Ready {
            session,
            course,
            student,
            ..
        } => JoinResponse::Ready(Json(JoinView {
            session_id: session.id,
            session_name: session.name,
            course_name: course.name,
            course_code: course.code,
            student_name: student.full_name,
            start_time: session.start_time,
            expiry_time: session.expiry_time,
        })),
        JoinOutcome::AlreadyRecorded { recorded_at } => {
            JoinResponse::AlreadyRecorded(Json(AlreadyRecordedResponse {
                title: "Already Marked".to_string(),
                message: "You have already marked your attendance for this session.".to_string(),
                recorded_at,
            }))
        }
        JoinOutcome::NotAuthenticated => JoinResponse::Redirect(Redirect::to(format!(
            "/login?return_url=/api/1/attendance/join/{}",
            token
        ))),
        JoinOutcome::Rejected(rejection) => JoinResponse::Error(session_error(rejection)),
    })
}

/// Request payload for marking attendance.
#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct MarkAttendanceRequest {
    pub session_id: i32,
    /// The capture as a `data:image/...;base64,` URI from the camera canvas.
    pub captured_image: String,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct MarkSuccessResponse {
    pub title: String,
    pub message: String,
    #[ts(type = "string")]
    pub recorded_at: NaiveDateTime,
    pub course_name: String,
    pub session_name: String,
}

/// Error body for mark failures. `rejoin_token` carries the session token so
/// the client can send the student back to the join page for another try;
/// nothing about the failure is persisted.
#[derive(Serialize, TS)]
#[ts(export)]
pub struct MarkErrorResponse {
    pub error: String,
    pub message: String,
    pub rejoin_token: Option<String>,
}

#[derive(Responder)]
pub enum MarkResponse {
    #[response(status = 201)]
    Created(Json<MarkSuccessResponse>),
    #[response(status = 200)]
    AlreadyRecorded(Json<AlreadyRecordedResponse>),
    Error(status::Custom<Json<MarkErrorResponse>>),
}

fn mark_error(
    status_code: Status,
    error: &str,
    message: &str,
    rejoin_token: Option<String>,
) -> MarkResponse {
    MarkResponse::Error(status::Custom(
        status_code,
        Json(MarkErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
            rejoin_token,
        }),
    ))
}

fn already_recorded(recorded_at: NaiveDateTime) -> MarkResponse {
    MarkResponse::AlreadyRecorded(Json(AlreadyRecordedResponse {
        title: "Already Marked".to_string(),
        message: "You have already marked your attendance for this session.".to_string(),
        recorded_at,
    }))
}

/// Mark Attendance endpoint.
///
/// - **URL:** `/api/1/attendance/mark`
/// - **Method:** `POST`
/// - **Purpose:** Verifies the captured photo against the student's
///   reference photo and writes the attendance row
/// - **Authentication:** Required (student)
///
/// The session's activity and time window are re-validated here: a join
/// ticket only proves the pipeline held when the page was opened, and the
/// window may have closed while the student fumbled with the camera.
///
/// Every failure leaves the database untouched. The only durable effect of
/// this endpoint is the single attendance insert, and the unique index on
/// `(session_id, student_id)` resolves concurrent submissions to one row.
#[post("/1/attendance/mark", data = "<request>")]
pub async fn mark_attendance(
    db: DbConn,
    matcher: &State<Arc<dyn FaceMatcher>>,
    auth_student: AuthenticatedStudent,
    request: Json<MarkAttendanceRequest>,
) -> Result<MarkResponse, Status> {
    let now = Utc::now().naive_utc();
    let request = request.into_inner();
    let student = auth_student.student;

    let requested_session_id = request.session_id;
    let for_student_id = student.id;
    let context = db
        .run(move |conn| -> Result<_, diesel::result::Error> {
            let Some(session) = get_session_by_id(conn, requested_session_id)? else {
                return Ok(None);
            };
            let course = get_course_by_id(conn, session.course_id)?;
            let existing = find_attendance_for_session(conn, session.id, for_student_id)?;
            Ok(Some((session, course, existing)))
        })
        .await
        .map_err(|_| Status::InternalServerError)?;

    let Some((session, course, existing)) = context else {
        return Ok(mark_error(
            Status::NotFound,
            "unknown_session",
            "Session not found.",
            None,
        ));
    };

    // Stage 2-3 re-validation; time has moved since the join page loaded.
    if ensure_session_open(&session, now).is_err() {
        return Ok(mark_error(
            Status::Conflict,
            "session_closed",
            "Session is no longer valid.",
            None,
        ));
    }

    if let Some(existing) = existing {
        return Ok(already_recorded(existing.created_at));
    }

    if request.captured_image.trim().is_empty() {
        return Ok(mark_error(
            Status::UnprocessableEntity,
            "missing_captured_image",
            "Please allow camera access and capture your photo.",
            Some(session.token.clone()),
        ));
    }

    let Some(reference) = student.face_image.filter(|bytes| !bytes.is_empty()) else {
        return Ok(mark_error(
            Status::UnprocessableEntity,
            "no_reference_on_file",
            "You do not have a reference photo registered. Please contact the administrator.",
            Some(session.token.clone()),
        ));
    };

    let probe = match decode_captured_image(&request.captured_image) {
        Ok(bytes) => bytes,
        Err(_) => {
            return Ok(mark_error(
                Status::UnprocessableEntity,
                "image_decode_error",
                "Invalid image data.",
                Some(session.token.clone()),
            ));
        }
    };

    let verdict = match compare_faces(
        matcher.inner().clone(),
        reference,
        probe,
        MATCH_TOLERANCE,
        EXTRACTION_TIMEOUT,
    )
    .await
    {
        Ok(verdict) => verdict,
        Err(CompareError::ReferenceUnreadable(_)) => {
            return Ok(mark_error(
                Status::UnprocessableEntity,
                "no_reference_on_file",
                "Your registered reference photo could not be used for matching. \
                 Please contact the administrator.",
                Some(session.token.clone()),
            ));
        }
        Err(CompareError::ProbeUnreadable(_)) => {
            return Ok(mark_error(
                Status::UnprocessableEntity,
                "no_face_detected",
                "No face could be detected in your photo. Please try again with better \
                 lighting and a clear view of your face.",
                Some(session.token.clone()),
            ));
        }
        Err(CompareError::Timeout) => {
            return Ok(mark_error(
                Status::UnprocessableEntity,
                "extraction_timeout",
                "Face verification took too long. Please try again.",
                Some(session.token.clone()),
            ));
        }
        Err(CompareError::Backend(reason)) => {
            error!("Face matching backend failed: {}", reason);
            return Err(Status::InternalServerError);
        }
    };

    if !verdict.is_match {
        return Ok(mark_error(
            Status::UnprocessableEntity,
            "face_mismatch",
            "Face verification failed. Please try again with better lighting and a \
             clear view of your face.",
            Some(session.token.clone()),
        ));
    }

    let session_name = session.name.clone();
    let course_name = course.map(|c| c.name).unwrap_or_default();
    let outcome = db
        .run(move |conn| insert_attendance(conn, &session, for_student_id, now))
        .await
        .map_err(|_| Status::InternalServerError)?;

    Ok(match outcome {
        RecordOutcome::Recorded(row) => MarkResponse::Created(Json(MarkSuccessResponse {
            title: "Attendance Marked!".to_string(),
            message: format!(
                "Your attendance has been successfully recorded for {}.",
                course_name
            ),
            recorded_at: row.created_at,
            course_name,
            session_name,
        })),
        RecordOutcome::AlreadyRecorded { recorded_at } => already_recorded(recorded_at),
    })
}

pub fn routes() -> Vec<Route> {
    routes![join_session, mark_attendance]
}
