use diesel::{Insertable, Queryable};

use crate::schema::enrollments;

/// Student-to-course membership. Read-only as far as the attendance engine is
/// concerned; rows are maintained by the administrative side of the system.
#[derive(Queryable, Debug, Clone)]
pub struct Enrollment {
    pub student_id: i32,
    pub course_id: i32,
}

#[derive(Insertable)]
#[diesel(table_name = enrollments)]
pub struct NewEnrollment {
    pub student_id: i32,
    pub course_id: i32,
}
