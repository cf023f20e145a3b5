use diesel::prelude::*;

use crate::models::NewEnrollment;

/// Answers the set-membership question "is this student enrolled in this
/// course". The attendance engine only ever reads this relation.
pub fn is_enrolled(
    conn: &mut SqliteConnection,
    for_student_id: i32,
    for_course_id: i32,
) -> Result<bool, diesel::result::Error> {
    use crate::schema::enrollments::dsl::*;
    let count: i64 = enrollments
        .filter(student_id.eq(for_student_id))
        .filter(course_id.eq(for_course_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Enrolls a student in a course. Used by test seeding; production rows come
/// from the administrative side of the system.
pub fn insert_enrollment(
    conn: &mut SqliteConnection,
    student_id: i32,
    course_id: i32,
) -> Result<(), diesel::result::Error> {
    use crate::schema::enrollments;

    diesel::insert_into(enrollments::table)
        .values(&NewEnrollment {
            student_id,
            course_id,
        })
        .execute(conn)?;
    Ok(())
}
