use chrono::Utc;
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::BigInt;

use crate::models::{Instructor, NewInstructor};

#[derive(QueryableByName)]
struct LastInsertRowId {
    #[diesel(sql_type = BigInt)]
    last_insert_rowid: i64,
}

pub fn insert_instructor(
    conn: &mut SqliteConnection,
    instructor_name: String,
    instructor_email: String,
    dept: Option<String>,
) -> Result<Instructor, diesel::result::Error> {
    use crate::schema::instructors::dsl::*;

    let new_instructor = NewInstructor {
        full_name: instructor_name,
        email: instructor_email,
        department: dept,
        created_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(instructors)
        .values(&new_instructor)
        .execute(conn)?;

    let last_id = diesel::sql_query("SELECT last_insert_rowid() as last_insert_rowid")
        .get_result::<LastInsertRowId>(conn)?
        .last_insert_rowid;

    instructors
        .filter(id.eq(last_id as i32))
        .first::<Instructor>(conn)
}

/// Try to find an instructor by id.
pub fn get_instructor_by_id(
    conn: &mut SqliteConnection,
    instructor_id: i32,
) -> Result<Option<Instructor>, diesel::result::Error> {
    use crate::schema::instructors::dsl::*;
    instructors
        .filter(id.eq(instructor_id))
        .first::<Instructor>(conn)
        .optional()
}
