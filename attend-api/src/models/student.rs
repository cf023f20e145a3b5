use chrono::NaiveDateTime;
use diesel::{Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::students;

/// An enrolled student.
///
/// `face_image` holds the raw bytes of the registered reference photo used by
/// the face-match gate. It never leaves the server, so it is excluded from
/// serialized responses.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, Serialize, Deserialize, TS)]
#[diesel(table_name = students)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct Student {
    pub id: i32,
    pub full_name: String,
    pub university_id: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    pub face_image: Option<Vec<u8>>,
    pub department: Option<String>,
    pub year_level: Option<i32>,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = students)]
pub struct NewStudent {
    pub full_name: String,
    pub university_id: String,
    pub email: String,
    pub face_image: Option<Vec<u8>>,
    pub department: Option<String>,
    pub year_level: Option<i32>,
    pub created_at: NaiveDateTime,
}
