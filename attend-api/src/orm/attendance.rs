//! Database operations for the attendance recorder.
//!
//! The recorder performs the single durable side effect of the engine: the
//! at-most-once insert of an attendance row per (session, student) pair. The
//! pre-insert duplicate lookup in the join pipeline is only a fast path; the
//! unique index on `attendance (session_id, student_id)` is what actually
//! guarantees the invariant under concurrent submissions.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use crate::models::{Attendance, ClassSession, NewAttendance, STATUS_PRESENT, Student};

/// Result of an attempted attendance write.
#[derive(Debug)]
pub enum RecordOutcome {
    /// A new row was persisted.
    Recorded(Attendance),
    /// A row for this (session, student) pair already existed; carries the
    /// original timestamp so the caller can confirm rather than complain.
    AlreadyRecorded { recorded_at: NaiveDateTime },
}

/// Looks up an existing attendance row for a (session, student) pair.
pub fn find_attendance_for_session(
    conn: &mut SqliteConnection,
    for_session_id: i32,
    for_student_id: i32,
) -> Result<Option<Attendance>, diesel::result::Error> {
    use crate::schema::attendance::dsl::*;
    attendance
        .filter(session_id.eq(for_session_id))
        .filter(student_id.eq(for_student_id))
        .first::<Attendance>(conn)
        .optional()
}

/// Inserts the attendance row for a verified join.
///
/// Writes `status = "Present"` with `face_recognized = true`; the attendance
/// date is the calendar date of `now`. Two submissions may race past the
/// pipeline's duplicate pre-check, so a unique-constraint violation here is
/// expected and translated into the same `AlreadyRecorded` outcome the
/// pre-check would have produced, carrying the surviving row's timestamp.
pub fn insert_attendance(
    conn: &mut SqliteConnection,
    session: &ClassSession,
    for_student_id: i32,
    now: NaiveDateTime,
) -> Result<RecordOutcome, diesel::result::Error> {
    use crate::schema::attendance;

    let new_row = NewAttendance {
        student_id: for_student_id,
        course_id: session.course_id,
        session_id: Some(session.id),
        attendance_date: now.date(),
        status: STATUS_PRESENT.to_string(),
        face_recognized: true,
        created_at: now,
    };

    let inserted = diesel::insert_into(attendance::table)
        .values(&new_row)
        .execute(conn);

    match inserted {
        Ok(_) => {
            let row = attendance::table
                .filter(attendance::session_id.eq(session.id))
                .filter(attendance::student_id.eq(for_student_id))
                .first::<Attendance>(conn)?;
            Ok(RecordOutcome::Recorded(row))
        }
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            // Lost the race; the winner's row is authoritative.
            let existing = attendance::table
                .filter(attendance::session_id.eq(session.id))
                .filter(attendance::student_id.eq(for_student_id))
                .first::<Attendance>(conn)?;
            Ok(RecordOutcome::AlreadyRecorded {
                recorded_at: existing.created_at,
            })
        }
        Err(e) => Err(e),
    }
}

/// Returns every attendance row for a session together with the student it
/// belongs to, for the instructor's per-session listing.
pub fn list_attendance_for_session(
    conn: &mut SqliteConnection,
    for_session_id: i32,
) -> Result<Vec<(Attendance, Student)>, diesel::result::Error> {
    use crate::schema::attendance;
    use crate::schema::students;

    attendance::table
        .inner_join(students::table.on(students::id.eq(attendance::student_id)))
        .filter(attendance::session_id.eq(for_session_id))
        .order(attendance::created_at.asc())
        .select((Attendance::as_select(), Student::as_select()))
        .load::<(Attendance, Student)>(conn)
}

#[cfg(test)]
#[cfg(feature = "test-staging")]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    use crate::orm::class_session::insert_session;
    use crate::orm::course::insert_course;
    use crate::orm::instructor::insert_instructor;
    use crate::orm::student::insert_student;
    use crate::orm::testing::setup_test_db;

    fn ten_am() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn seed(conn: &mut SqliteConnection) -> (ClassSession, Student) {
        let instructor = insert_instructor(
            conn,
            "Dr. Salma Hassan".to_string(),
            "salma@university.edu".to_string(),
            None,
        )
        .expect("insert instructor");
        let course = insert_course(
            conn,
            "Operating Systems".to_string(),
            "CS350".to_string(),
            Some(instructor.id),
            None,
        )
        .expect("insert course");
        let session = insert_session(
            conn,
            course.id,
            "Lecture 1".to_string(),
            ten_am(),
            60,
            Some(instructor.id),
        )
        .expect("insert session");
        let student = insert_student(
            conn,
            "Amira Khaled".to_string(),
            "U2024001".to_string(),
            "amira@university.edu".to_string(),
            Some(b"reference".to_vec()),
        )
        .expect("insert student");
        (session, student)
    }

    #[test]
    fn test_insert_attendance_writes_present_row() {
        let mut conn = setup_test_db();
        let (session, student) = seed(&mut conn);
        let now = ten_am() + Duration::minutes(5);

        let outcome =
            insert_attendance(&mut conn, &session, student.id, now).expect("record attendance");

        match outcome {
            RecordOutcome::Recorded(row) => {
                assert_eq!(row.status, STATUS_PRESENT);
                assert!(row.face_recognized);
                assert_eq!(row.session_id, Some(session.id));
                assert_eq!(row.course_id, session.course_id);
                assert_eq!(row.attendance_date, now.date());
                assert_eq!(row.created_at, now);
            }
            other => panic!("expected Recorded, got {other:?}"),
        }
    }

    #[test]
    fn test_second_insert_resolves_to_already_recorded() {
        let mut conn = setup_test_db();
        let (session, student) = seed(&mut conn);
        let first_at = ten_am() + Duration::minutes(5);
        let second_at = ten_am() + Duration::minutes(20);

        let first =
            insert_attendance(&mut conn, &session, student.id, first_at).expect("first record");
        assert!(matches!(first, RecordOutcome::Recorded(_)));

        // The constraint, not the caller, resolves the duplicate; the
        // original timestamp survives.
        let second =
            insert_attendance(&mut conn, &session, student.id, second_at).expect("second record");
        match second {
            RecordOutcome::AlreadyRecorded { recorded_at } => assert_eq!(recorded_at, first_at),
            other => panic!("expected AlreadyRecorded, got {other:?}"),
        }

        let rows = list_attendance_for_session(&mut conn, session.id).expect("list");
        assert_eq!(rows.len(), 1, "exactly one row per (session, student)");
    }

    #[test]
    fn test_find_attendance_for_session() {
        let mut conn = setup_test_db();
        let (session, student) = seed(&mut conn);

        assert!(
            find_attendance_for_session(&mut conn, session.id, student.id)
                .expect("lookup")
                .is_none()
        );

        insert_attendance(&mut conn, &session, student.id, ten_am()).expect("record");

        let found = find_attendance_for_session(&mut conn, session.id, student.id)
            .expect("lookup")
            .expect("row exists");
        assert_eq!(found.student_id, student.id);
    }
}
