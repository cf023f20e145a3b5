use chrono::{NaiveDate, NaiveDateTime};
use diesel::{Associations, Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::attendance;

/// Recorded status values. Stored as text, the way the reporting side of the
/// system expects them.
pub const STATUS_PRESENT: &str = "Present";
pub const STATUS_ABSENT: &str = "Absent";

/// One attendance record.
///
/// Created exactly once per (session, student) pair by the recorder; never
/// mutated and never deleted by this crate. `session_id` is nullable so
/// historical records can outlive their session linkage.
#[derive(
    Queryable, Selectable, Identifiable, Associations, Debug, Clone, Serialize, Deserialize, TS,
)]
#[diesel(belongs_to(crate::models::student::Student))]
#[diesel(belongs_to(crate::models::course::Course))]
#[diesel(table_name = attendance)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct Attendance {
    pub id: i32,
    pub student_id: i32,
    pub course_id: i32,
    pub session_id: Option<i32>,
    #[ts(type = "string")]
    pub attendance_date: NaiveDate,
    pub status: String,
    pub face_recognized: bool,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = attendance)]
pub struct NewAttendance {
    pub student_id: i32,
    pub course_id: i32,
    pub session_id: Option<i32>,
    pub attendance_date: NaiveDate,
    pub status: String,
    pub face_recognized: bool,
    pub created_at: NaiveDateTime,
}
