use chrono::NaiveDateTime;
use diesel::{Associations, Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::class_sessions;

/// A time-boxed attendance window for one course occurrence.
///
/// The `token` is the opaque identifier embedded in the join link handed to
/// students. It is generated server-side at creation time and never changes
/// afterwards; the database enforces its uniqueness.
#[derive(
    Queryable, Selectable, Identifiable, Associations, Debug, Clone, Serialize, Deserialize, TS,
)]
#[diesel(belongs_to(crate::models::course::Course))]
#[diesel(table_name = class_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct ClassSession {
    pub id: i32,
    pub course_id: i32,
    pub name: String,
    pub token: String,
    #[ts(type = "string")]
    pub start_time: NaiveDateTime,
    #[ts(type = "string")]
    pub expiry_time: NaiveDateTime,
    pub is_active: bool,
    pub created_by: Option<i32>, // Foreign key to Instructor
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = class_sessions)]
pub struct NewClassSession {
    pub course_id: i32,
    pub name: String,
    pub token: String,
    pub start_time: NaiveDateTime,
    pub expiry_time: NaiveDateTime,
    pub is_active: bool,
    pub created_by: Option<i32>,
    pub created_at: NaiveDateTime,
}

/// Derived session state. Never stored; always recomputed from the stored
/// fields and the instant of observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum SessionStatus {
    Scheduled,
    Active,
    Expired,
    Inactive,
}

impl SessionStatus {
    /// Pure status derivation.
    ///
    /// Boundary policy: `now == start_time` is already Active and
    /// `now == expiry_time` is still Active. Only a strictly later instant
    /// expires the session.
    pub fn derive(
        is_active: bool,
        start_time: NaiveDateTime,
        expiry_time: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Self {
        if !is_active {
            SessionStatus::Inactive
        } else if now < start_time {
            SessionStatus::Scheduled
        } else if now > expiry_time {
            SessionStatus::Expired
        } else {
            SessionStatus::Active
        }
    }
}

impl ClassSession {
    /// Returns the session's status as observed at `now`.
    pub fn status_at(&self, now: NaiveDateTime) -> SessionStatus {
        SessionStatus::derive(self.is_active, self.start_time, self.expiry_time, now)
    }
}
