//! API endpoints for instructors managing class sessions.
//!
//! All routes here require an instructor login, and every session-scoped
//! route checks that the session's course belongs to the caller before doing
//! anything else. Another instructor's session is reported as `404`, not
//! `403`, so the endpoints do not leak which ids exist.

use chrono::{NaiveDateTime, Utc};
use rocket::Route;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::models::{ClassSession, Course, SessionStatus};
use crate::orm::DbConn;
use crate::orm::attendance::list_attendance_for_session;
use crate::orm::class_session::{
    SessionChanges, SessionStoreError, count_attendance_for_session, delete_session,
    get_session_by_id, insert_session, list_sessions_for_instructor, update_session,
};
use crate::orm::course::get_course_by_id;
use crate::session_guards::AuthenticatedInstructor;

/// Request payload for creating a session.
#[derive(Deserialize, Serialize, TS)]
#[ts(export)]
pub struct CreateSessionRequest {
    pub course_id: i32,
    pub name: String,
    /// Defaults to the current time when omitted.
    #[ts(type = "string | null")]
    pub start_time: Option<NaiveDateTime>,
    pub duration_minutes: i64,
}

/// Request payload for editing a session. Only the provided fields change.
#[derive(Deserialize, Serialize, Default, TS)]
#[ts(export)]
pub struct UpdateSessionRequest {
    pub name: Option<String>,
    #[ts(type = "string | null")]
    pub start_time: Option<NaiveDateTime>,
    #[ts(type = "string | null")]
    pub expiry_time: Option<NaiveDateTime>,
    pub is_active: Option<bool>,
}

/// A session as presented to its instructor, with the derived status and the
/// current attendance count alongside the stored fields.
#[derive(Serialize, TS)]
#[ts(export)]
pub struct SessionView {
    pub id: i32,
    pub course_id: i32,
    pub course_name: String,
    pub course_code: String,
    pub name: String,
    pub token: String,
    /// Path of the join link to hand to students.
    pub join_path: String,
    #[ts(type = "string")]
    pub start_time: NaiveDateTime,
    #[ts(type = "string")]
    pub expiry_time: NaiveDateTime,
    pub is_active: bool,
    pub status: SessionStatus,
    pub attendance_count: i64,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
}

fn session_view(
    session: ClassSession,
    course: &Course,
    attendance_count: i64,
    now: NaiveDateTime,
) -> SessionView {
    let status = session.status_at(now);
    SessionView {
        id: session.id,
        course_id: session.course_id,
        course_name: course.name.clone(),
        course_code: course.code.clone(),
        join_path: format!("/api/1/attendance/join/{}", session.token),
        name: session.name,
        token: session.token,
        start_time: session.start_time,
        expiry_time: session.expiry_time,
        is_active: session.is_active,
        status,
        attendance_count,
        created_at: session.created_at,
    }
}

/// Loads a session together with its course, only if the course belongs to
/// the calling instructor. Missing and foreign sessions both come back as
/// `None`.
fn get_owned_session(
    conn: &mut diesel::SqliteConnection,
    session_id: i32,
    instructor_id: i32,
) -> Result<Option<(ClassSession, Course)>, diesel::result::Error> {
    let Some(session) = get_session_by_id(conn, session_id)? else {
        return Ok(None);
    };
    let Some(course) = get_course_by_id(conn, session.course_id)? else {
        return Ok(None);
    };
    if course.instructor_id != Some(instructor_id) {
        return Ok(None);
    }
    Ok(Some((session, course)))
}

/// Create Session endpoint.
///
/// - **URL:** `/api/1/sessions`
/// - **Method:** `POST`
/// - **Purpose:** Opens a new attendance session for one of the caller's
///   courses and returns it with its freshly generated join link
/// - **Authentication:** Required (instructor)
///
/// # Response
///
/// **Success (HTTP 201):** the created [`SessionView`].
///
/// **Failure:** `404` if the course does not exist or belongs to another
/// instructor, `422` if `duration_minutes` is not positive.
#[post("/1/sessions", data = "<request>")]
pub async fn create_session(
    db: DbConn,
    auth_instructor: AuthenticatedInstructor,
    request: Json<CreateSessionRequest>,
) -> Result<status::Created<Json<SessionView>>, Status> {
    let now = Utc::now().naive_utc();
    let request = request.into_inner();
    let instructor_id = auth_instructor.instructor.id;
    let start_time = request.start_time.unwrap_or(now);

    let created = db
        .run(
            move |conn| -> Result<Option<(ClassSession, Course)>, SessionStoreError> {
                let Some(course) = get_course_by_id(conn, request.course_id)? else {
                    return Ok(None);
                };
                if course.instructor_id != Some(instructor_id) {
                    return Ok(None);
                }
                let session = insert_session(
                    conn,
                    course.id,
                    request.name,
                    start_time,
                    request.duration_minutes,
                    Some(instructor_id),
                )?;
                Ok(Some((session, course)))
            },
        )
        .await;

    match created {
        Ok(Some((session, course))) => {
            info!(
                "Instructor {} opened session {} for course {}",
                instructor_id, session.id, course.code
            );
            let view = session_view(session, &course, 0, now);
            let location = format!("/api/1/sessions/{}", view.id);
            Ok(status::Created::new(location).body(Json(view)))
        }
        Ok(None) => Err(Status::NotFound),
        Err(SessionStoreError::InvalidDuration) => Err(Status::UnprocessableEntity),
        Err(_) => Err(Status::InternalServerError),
    }
}

/// List Sessions endpoint.
///
/// - **URL:** `/api/1/sessions`
/// - **Method:** `GET`
/// - **Purpose:** Lists every session across the caller's courses, newest
///   first, each with its derived status and attendance count
/// - **Authentication:** Required (instructor)
#[get("/1/sessions")]
pub async fn list_sessions(
    db: DbConn,
    auth_instructor: AuthenticatedInstructor,
) -> Result<Json<Vec<SessionView>>, Status> {
    let now = Utc::now().naive_utc();
    let instructor_id = auth_instructor.instructor.id;

    let rows = db
        .run(
            move |conn| -> Result<Vec<(ClassSession, Course, i64)>, diesel::result::Error> {
                let sessions = list_sessions_for_instructor(conn, instructor_id)?;
                let mut out = Vec::with_capacity(sessions.len());
                for (session, course) in sessions {
                    let count = count_attendance_for_session(conn, session.id)?;
                    out.push((session, course, count));
                }
                Ok(out)
            },
        )
        .await
        .map_err(|_| Status::InternalServerError)?;

    Ok(Json(
        rows.into_iter()
            .map(|(session, course, count)| session_view(session, &course, count, now))
            .collect(),
    ))
}

/// Get Session endpoint.
///
/// - **URL:** `/api/1/sessions/<session_id>`
/// - **Method:** `GET`
/// - **Purpose:** Returns one of the caller's sessions
/// - **Authentication:** Required (instructor, owner)
#[get("/1/sessions/<session_id>")]
pub async fn get_session(
    db: DbConn,
    auth_instructor: AuthenticatedInstructor,
    session_id: i32,
) -> Result<Json<SessionView>, Status> {
    let now = Utc::now().naive_utc();
    let instructor_id = auth_instructor.instructor.id;

    let found = db
        .run(
            move |conn| -> Result<Option<(ClassSession, Course, i64)>, diesel::result::Error> {
                let Some((session, course)) = get_owned_session(conn, session_id, instructor_id)?
                else {
                    return Ok(None);
                };
                let count = count_attendance_for_session(conn, session.id)?;
                Ok(Some((session, course, count)))
            },
        )
        .await
        .map_err(|_| Status::InternalServerError)?;

    match found {
        Some((session, course, count)) => Ok(Json(session_view(session, &course, count, now))),
        None => Err(Status::NotFound),
    }
}

/// Update Session endpoint.
///
/// - **URL:** `/api/1/sessions/<session_id>`
/// - **Method:** `PUT`
/// - **Purpose:** Renames, reschedules or (de)activates one of the caller's
///   sessions; the token is immutable
/// - **Authentication:** Required (instructor, owner)
///
/// # Response
///
/// **Success (HTTP 200):** the updated [`SessionView`].
///
/// **Failure:** `404` for a missing or foreign session, `422` if the merged
/// time window would have `expiry_time <= start_time`.
#[put("/1/sessions/<session_id>", data = "<request>")]
pub async fn edit_session(
    db: DbConn,
    auth_instructor: AuthenticatedInstructor,
    session_id: i32,
    request: Json<UpdateSessionRequest>,
) -> Result<Json<SessionView>, Status> {
    let now = Utc::now().naive_utc();
    let request = request.into_inner();
    let instructor_id = auth_instructor.instructor.id;

    let updated = db
        .run(
            move |conn| -> Result<Option<(ClassSession, Course, i64)>, SessionStoreError> {
                let Some((_, course)) = get_owned_session(conn, session_id, instructor_id)? else {
                    return Ok(None);
                };
                let session = update_session(
                    conn,
                    session_id,
                    SessionChanges {
                        name: request.name,
                        start_time: request.start_time,
                        expiry_time: request.expiry_time,
                        is_active: request.is_active,
                    },
                )?;
                let count = count_attendance_for_session(conn, session.id)?;
                Ok(Some((session, course, count)))
            },
        )
        .await;

    match updated {
        Ok(Some((session, course, count))) => Ok(Json(session_view(session, &course, count, now))),
        Ok(None) | Err(SessionStoreError::NotFound) => Err(Status::NotFound),
        Err(SessionStoreError::InvalidRange) => Err(Status::UnprocessableEntity),
        Err(_) => Err(Status::InternalServerError),
    }
}

/// Delete Session endpoint.
///
/// - **URL:** `/api/1/sessions/<session_id>`
/// - **Method:** `DELETE`
/// - **Purpose:** Permanently removes one of the caller's sessions; its
///   attendance rows go with it via the schema's cascade
/// - **Authentication:** Required (instructor, owner)
#[delete("/1/sessions/<session_id>")]
pub async fn remove_session(
    db: DbConn,
    auth_instructor: AuthenticatedInstructor,
    session_id: i32,
) -> Result<Status, Status> {
    let instructor_id = auth_instructor.instructor.id;

    let deleted = db
        .run(move |conn| -> Result<bool, SessionStoreError> {
            if get_owned_session(conn, session_id, instructor_id)?.is_none() {
                return Ok(false);
            }
            delete_session(conn, session_id)?;
            Ok(true)
        })
        .await;

    match deleted {
        Ok(true) => {
            info!("Instructor {} deleted session {}", instructor_id, session_id);
            Ok(Status::NoContent)
        }
        Ok(false) | Err(SessionStoreError::NotFound) => Err(Status::NotFound),
        Err(_) => Err(Status::InternalServerError),
    }
}

/// One row of a session's attendance listing.
#[derive(Serialize, TS)]
#[ts(export)]
pub struct AttendanceEntry {
    pub student_id: i32,
    pub student_name: String,
    pub university_id: String,
    pub status: String,
    pub face_recognized: bool,
    #[ts(type = "string")]
    pub recorded_at: NaiveDateTime,
}

/// Session Attendance endpoint.
///
/// - **URL:** `/api/1/sessions/<session_id>/attendance`
/// - **Method:** `GET`
/// - **Purpose:** Lists who has marked attendance for one of the caller's
///   sessions, in recording order
/// - **Authentication:** Required (instructor, owner)
#[get("/1/sessions/<session_id>/attendance")]
pub async fn session_attendance(
    db: DbConn,
    auth_instructor: AuthenticatedInstructor,
    session_id: i32,
) -> Result<Json<Vec<AttendanceEntry>>, Status> {
    let instructor_id = auth_instructor.instructor.id;

    let rows = db
        .run(
            move |conn| -> Result<Option<Vec<AttendanceEntry>>, diesel::result::Error> {
                if get_owned_session(conn, session_id, instructor_id)?.is_none() {
                    return Ok(None);
                }
                let rows = list_attendance_for_session(conn, session_id)?
                    .into_iter()
                    .map(|(row, student)| AttendanceEntry {
                        student_id: student.id,
                        student_name: student.full_name,
                        university_id: student.university_id,
                        status: row.status,
                        face_recognized: row.face_recognized,
                        recorded_at: row.created_at,
                    })
                    .collect();
                Ok(Some(rows))
            },
        )
        .await
        .map_err(|_| Status::InternalServerError)?;

    rows.map(Json).ok_or(Status::NotFound)
}

pub fn routes() -> Vec<Route> {
    routes![
        create_session,
        list_sessions,
        get_session,
        edit_session,
        remove_session,
        session_attendance,
    ]
}
