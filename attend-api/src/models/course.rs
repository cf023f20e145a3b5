use chrono::NaiveDateTime;
use diesel::{Associations, Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::courses;

#[derive(
    Queryable, Selectable, Identifiable, Associations, Debug, Clone, Serialize, Deserialize, TS,
)]
#[diesel(belongs_to(crate::models::instructor::Instructor))]
#[diesel(table_name = courses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct Course {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub instructor_id: Option<i32>, // Foreign key to Instructor
    pub year_level: Option<i32>,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = courses)]
pub struct NewCourse {
    pub name: String,
    pub code: String,
    pub instructor_id: Option<i32>,
    pub year_level: Option<i32>,
    pub created_at: NaiveDateTime,
}
