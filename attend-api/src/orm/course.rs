use chrono::Utc;
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::BigInt;

use crate::models::{Course, NewCourse};

#[derive(QueryableByName)]
struct LastInsertRowId {
    #[diesel(sql_type = BigInt)]
    last_insert_rowid: i64,
}

pub fn insert_course(
    conn: &mut SqliteConnection,
    course_name: String,
    course_code: String,
    instr_id: Option<i32>,
    year: Option<i32>,
) -> Result<Course, diesel::result::Error> {
    use crate::schema::courses::dsl::*;

    let new_course = NewCourse {
        name: course_name,
        code: course_code,
        instructor_id: instr_id,
        year_level: year,
        created_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(courses)
        .values(&new_course)
        .execute(conn)?;

    let last_id = diesel::sql_query("SELECT last_insert_rowid() as last_insert_rowid")
        .get_result::<LastInsertRowId>(conn)?
        .last_insert_rowid;

    courses.filter(id.eq(last_id as i32)).first::<Course>(conn)
}

/// Try to find a course by id.
/// Returns Ok(Some(Course)) if found, Ok(None) if not, Err on DB error.
pub fn get_course_by_id(
    conn: &mut SqliteConnection,
    course_id: i32,
) -> Result<Option<Course>, diesel::result::Error> {
    use crate::schema::courses::dsl::*;
    courses
        .filter(id.eq(course_id))
        .first::<Course>(conn)
        .optional()
}
