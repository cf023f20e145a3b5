use chrono::Utc;
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::BigInt;

use crate::models::{NewStudent, Student};

#[derive(QueryableByName)]
struct LastInsertRowId {
    #[diesel(sql_type = BigInt)]
    last_insert_rowid: i64,
}

/// Inserts a student. The reference face image is optional; students without
/// one can browse but cannot pass the face-match gate.
pub fn insert_student(
    conn: &mut SqliteConnection,
    student_name: String,
    univ_id: String,
    student_email: String,
    reference_image: Option<Vec<u8>>,
) -> Result<Student, diesel::result::Error> {
    use crate::schema::students::dsl::*;

    let new_student = NewStudent {
        full_name: student_name,
        university_id: univ_id,
        email: student_email,
        face_image: reference_image,
        department: None,
        year_level: None,
        created_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(students)
        .values(&new_student)
        .execute(conn)?;

    let last_id = diesel::sql_query("SELECT last_insert_rowid() as last_insert_rowid")
        .get_result::<LastInsertRowId>(conn)?
        .last_insert_rowid;

    students.filter(id.eq(last_id as i32)).first::<Student>(conn)
}

/// Try to find a student by id.
/// Returns Ok(Some(Student)) if found, Ok(None) if not, Err on DB error.
pub fn get_student_by_id(
    conn: &mut SqliteConnection,
    student_id: i32,
) -> Result<Option<Student>, diesel::result::Error> {
    use crate::schema::students::dsl::*;
    students
        .filter(id.eq(student_id))
        .first::<Student>(conn)
        .optional()
}

/// Try to find a student by email.
pub fn get_student_by_email(
    conn: &mut SqliteConnection,
    student_email: &str,
) -> Result<Option<Student>, diesel::result::Error> {
    use crate::schema::students::dsl::*;
    students
        .filter(email.eq(student_email))
        .first::<Student>(conn)
        .optional()
}
