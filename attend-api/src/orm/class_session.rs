//! Database operations for the session registry.
//!
//! This module owns session token issuance and every mutation a class session
//! can undergo: creation, renaming, rescheduling, deactivation and deletion.
//! Status is never stored; see [`crate::models::SessionStatus`] for the pure
//! derivation.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use uuid::Uuid;

use crate::models::{ClassSession, Course, NewClassSession};

/// Random bytes drawn for each session token before encoding. 16 bytes keep
/// the full 128 bits of a v4 UUID, so the 22-character encoded form is not
/// guessable in practice.
pub const TOKEN_ENTROPY_BYTES: usize = 16;

/// Length of the URL-safe base64 encoding of [`TOKEN_ENTROPY_BYTES`] bytes
/// without padding.
pub const SESSION_TOKEN_LEN: usize = 22;

/// Errors produced by registry mutations.
///
/// Validation failures get their own variants so the API layer can surface
/// them verbatim; everything else is a passed-through Diesel error.
#[derive(Debug)]
pub enum SessionStoreError {
    /// A session was requested with a non-positive duration.
    InvalidDuration,
    /// A reschedule would leave `expiry_time <= start_time`.
    InvalidRange,
    /// The named session does not exist.
    NotFound,
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for SessionStoreError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => SessionStoreError::NotFound,
            other => SessionStoreError::Db(other),
        }
    }
}

#[derive(QueryableByName)]
struct LastInsertRowId {
    #[diesel(sql_type = BigInt)]
    last_insert_rowid: i64,
}

/// Generates a new opaque session token.
///
/// Draws a v4 UUID (122 random bits padded to [`TOKEN_ENTROPY_BYTES`] bytes)
/// and encodes it as URL-safe base64 without padding, yielding a
/// [`SESSION_TOKEN_LEN`]-character string safe to embed in a join link.
pub fn generate_session_token() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}

/// Fields an instructor may change after creation. Everything else on a
/// session, in particular its token, is immutable.
#[derive(Debug, Default)]
pub struct SessionChanges {
    pub name: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub expiry_time: Option<NaiveDateTime>,
    pub is_active: Option<bool>,
}

/// Creates a session for a course and returns the stored row.
///
/// The expiry time is computed as `session_start + duration_minutes`; the
/// token is generated here and the session starts out active.
///
/// # Returns
/// * `Err(SessionStoreError::InvalidDuration)` - `duration_minutes` was zero
///   or negative, or so large the expiry would overflow the timestamp range
/// * `Err(SessionStoreError::Db(_))` - insert failed (including a token collision,
///   which the unique index on `token` turns into a database error)
pub fn insert_session(
    conn: &mut SqliteConnection,
    for_course_id: i32,
    session_name: String,
    session_start: NaiveDateTime,
    duration_minutes: i64,
    creator_id: Option<i32>,
) -> Result<ClassSession, SessionStoreError> {
    use crate::schema::class_sessions::dsl::*;

    if duration_minutes <= 0 {
        return Err(SessionStoreError::InvalidDuration);
    }
    let session_length =
        Duration::try_minutes(duration_minutes).ok_or(SessionStoreError::InvalidDuration)?;
    let session_expiry = session_start
        .checked_add_signed(session_length)
        .ok_or(SessionStoreError::InvalidDuration)?;

    let new_session = NewClassSession {
        course_id: for_course_id,
        name: session_name,
        token: generate_session_token(),
        start_time: session_start,
        expiry_time: session_expiry,
        is_active: true,
        created_by: creator_id,
        created_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(class_sessions)
        .values(&new_session)
        .execute(conn)?;

    let last_id = diesel::sql_query("SELECT last_insert_rowid() as last_insert_rowid")
        .get_result::<LastInsertRowId>(conn)
        .map_err(SessionStoreError::Db)?
        .last_insert_rowid;

    let session = class_sessions
        .filter(id.eq(last_id as i32))
        .first::<ClassSession>(conn)?;

    Ok(session)
}

/// Resolves a join-link token to its session.
/// Returns Ok(Some(ClassSession)) if found, Ok(None) if not, Err on DB error.
pub fn get_session_by_token(
    conn: &mut SqliteConnection,
    session_token: &str,
) -> Result<Option<ClassSession>, diesel::result::Error> {
    use crate::schema::class_sessions::dsl::*;
    class_sessions
        .filter(token.eq(session_token))
        .first::<ClassSession>(conn)
        .optional()
}

/// Try to find a session by id.
pub fn get_session_by_id(
    conn: &mut SqliteConnection,
    session_id: i32,
) -> Result<Option<ClassSession>, diesel::result::Error> {
    use crate::schema::class_sessions::dsl::*;
    class_sessions
        .filter(id.eq(session_id))
        .first::<ClassSession>(conn)
        .optional()
}

/// Applies instructor edits to a session.
///
/// Only the fields present in `changes` are touched. The resulting time
/// window (merged from the stored row and the changes) must keep
/// `expiry_time > start_time`.
///
/// # Returns
/// * `Err(SessionStoreError::NotFound)` - no session with that id
/// * `Err(SessionStoreError::InvalidRange)` - the merged window is empty or inverted
pub fn update_session(
    conn: &mut SqliteConnection,
    session_id: i32,
    changes: SessionChanges,
) -> Result<ClassSession, SessionStoreError> {
    use crate::schema::class_sessions::dsl::*;

    let current = get_session_by_id(conn, session_id)?.ok_or(SessionStoreError::NotFound)?;

    let new_start = changes.start_time.unwrap_or(current.start_time);
    let new_expiry = changes.expiry_time.unwrap_or(current.expiry_time);
    if new_expiry <= new_start {
        return Err(SessionStoreError::InvalidRange);
    }

    diesel::update(class_sessions.filter(id.eq(session_id)))
        .set((
            name.eq(changes.name.unwrap_or(current.name)),
            start_time.eq(new_start),
            expiry_time.eq(new_expiry),
            is_active.eq(changes.is_active.unwrap_or(current.is_active)),
        ))
        .execute(conn)?;

    let updated = class_sessions
        .filter(id.eq(session_id))
        .first::<ClassSession>(conn)?;
    Ok(updated)
}

/// Clears the active flag, leaving the stored time window untouched.
pub fn deactivate_session(
    conn: &mut SqliteConnection,
    session_id: i32,
) -> Result<ClassSession, SessionStoreError> {
    update_session(
        conn,
        session_id,
        SessionChanges {
            is_active: Some(false),
            ..SessionChanges::default()
        },
    )
}

/// Deletes a session. The schema cascades the delete to its attendance rows.
pub fn delete_session(
    conn: &mut SqliteConnection,
    session_id: i32,
) -> Result<(), SessionStoreError> {
    use crate::schema::class_sessions::dsl::*;
    let deleted = diesel::delete(class_sessions.filter(id.eq(session_id))).execute(conn)?;
    if deleted == 0 {
        return Err(SessionStoreError::NotFound);
    }
    Ok(())
}

/// Returns all sessions belonging to an instructor's courses, newest first,
/// paired with the course they were opened for.
pub fn list_sessions_for_instructor(
    conn: &mut SqliteConnection,
    instr_id: i32,
) -> Result<Vec<(ClassSession, Course)>, diesel::result::Error> {
    use crate::schema::class_sessions;
    use crate::schema::courses;

    class_sessions::table
        .inner_join(courses::table.on(courses::id.eq(class_sessions::course_id)))
        .filter(courses::instructor_id.eq(instr_id))
        .order(class_sessions::created_at.desc())
        .select((ClassSession::as_select(), Course::as_select()))
        .load::<(ClassSession, Course)>(conn)
}

/// Counts attendance rows recorded against one session.
pub fn count_attendance_for_session(
    conn: &mut SqliteConnection,
    for_session_id: i32,
) -> Result<i64, diesel::result::Error> {
    use crate::schema::attendance::dsl::*;
    attendance
        .filter(session_id.eq(for_session_id))
        .count()
        .get_result(conn)
}
