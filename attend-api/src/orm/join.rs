//! The join validation pipeline.
//!
//! A student following a session link goes through an ordered sequence of
//! checks; the first failure decides the outcome and nothing later in the
//! pipeline runs. Passing every stage yields a [`JoinTicket`], which is proof
//! the checks held at one instant, not a standing grant: the mark endpoint
//! re-validates the activity and time-window stages because time keeps moving
//! between join and capture.

use chrono::NaiveDateTime;
use rocket::http::Status;

use crate::models::{ClassSession, Course, Student};
use crate::orm::DbRunner;
use crate::orm::attendance::find_attendance_for_session;
use crate::orm::class_session::get_session_by_token;
use crate::orm::course::get_course_by_id;
use crate::orm::enrollment::is_enrolled;

/// Capability value proving the join pipeline was satisfied for this
/// (session, student) pair at the moment it was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTicket {
    pub session_id: i32,
    pub student_id: i32,
}

/// Terminal pipeline failures, surfaced verbatim to the student.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinRejection {
    /// The token resolves to no session at all.
    InvalidToken,
    /// The instructor has switched the session off.
    SessionInactive,
    /// Joined before the window opened; carries the start for display.
    SessionNotStarted { starts_at: NaiveDateTime },
    /// Joined after the window closed; carries the expiry for display.
    SessionExpired { expired_at: NaiveDateTime },
    /// The caller is not a member of the session's course.
    NotEnrolled { course_name: String },
    /// The caller's login points at a student row that no longer exists.
    StudentNotFound,
}

/// The caller's identity as the pipeline's identity stage sees it.
///
/// The three states are deliberately distinct: an anonymous caller can fix
/// their situation by logging in, while a login whose student row has been
/// deleted cannot - that one is a terminal rejection, not a redirect.
#[derive(Debug, Clone)]
pub enum JoinIdentity {
    /// Logged in and resolved to a student row.
    Student(Student),
    /// No usable student login.
    Anonymous,
    /// A live student login whose student row is gone.
    Missing,
}

/// Everything a join attempt can resolve to.
#[derive(Debug)]
pub enum JoinOutcome {
    /// All stages passed; the caller may proceed to capture.
    Ready {
        ticket: JoinTicket,
        session: ClassSession,
        course: Course,
        student: Student,
    },
    /// Attendance already exists for this pair. Not an error: idempotent
    /// positive feedback carrying the original timestamp.
    AlreadyRecorded { recorded_at: NaiveDateTime },
    /// No authenticated student identity. Deferred, not fatal - the caller
    /// is expected to come back with the same token after logging in.
    NotAuthenticated,
    Rejected(JoinRejection),
}

/// Checks the stages that can silently lapse between join and capture:
/// the active flag and the time window.
pub fn ensure_session_open(
    session: &ClassSession,
    now: NaiveDateTime,
) -> Result<(), JoinRejection> {
    if !session.is_active {
        return Err(JoinRejection::SessionInactive);
    }
    if now < session.start_time {
        return Err(JoinRejection::SessionNotStarted {
            starts_at: session.start_time,
        });
    }
    if now > session.expiry_time {
        return Err(JoinRejection::SessionExpired {
            expired_at: session.expiry_time,
        });
    }
    Ok(())
}

/// Runs the full ordered join pipeline for `(token, identity)` at `now`.
///
/// Stage order, each short-circuiting on failure:
/// 1. token resolution, 2. active flag, 3. time window, 4. authenticated
/// identity, 5. enrollment, 6. duplicate attendance.
///
/// `now` is passed in explicitly so the decision is a pure function of the
/// stored fields and the clock reading the HTTP layer took.
///
/// # Returns
/// * `Ok(JoinOutcome)` - the pipeline's verdict, including rejections
/// * `Err(Status::InternalServerError)` - a database query failed
pub async fn process_join<D: DbRunner>(
    db: &D,
    token: String,
    identity: JoinIdentity,
    now: NaiveDateTime,
) -> Result<JoinOutcome, Status> {
    db.run(move |conn| -> Result<JoinOutcome, diesel::result::Error> {
        let Some(session) = get_session_by_token(conn, &token)? else {
            return Ok(JoinOutcome::Rejected(JoinRejection::InvalidToken));
        };

        if let Err(rejection) = ensure_session_open(&session, now) {
            return Ok(JoinOutcome::Rejected(rejection));
        }

        let student = match identity {
            JoinIdentity::Student(student) => student,
            JoinIdentity::Anonymous => return Ok(JoinOutcome::NotAuthenticated),
            JoinIdentity::Missing => {
                return Ok(JoinOutcome::Rejected(JoinRejection::StudentNotFound));
            }
        };

        if !is_enrolled(conn, student.id, session.course_id)? {
            let course_name = get_course_by_id(conn, session.course_id)?
                .map(|c| c.name)
                .unwrap_or_default();
            return Ok(JoinOutcome::Rejected(JoinRejection::NotEnrolled {
                course_name,
            }));
        }

        if let Some(existing) = find_attendance_for_session(conn, session.id, student.id)? {
            return Ok(JoinOutcome::AlreadyRecorded {
                recorded_at: existing.created_at,
            });
        }

        let course = get_course_by_id(conn, session.course_id)?
            .ok_or(diesel::result::Error::NotFound)?;

        Ok(JoinOutcome::Ready {
            ticket: JoinTicket {
                session_id: session.id,
                student_id: student.id,
            },
            session,
            course,
            student,
        })
    })
    .await
    .map_err(|_| Status::InternalServerError)
}

#[cfg(test)]
#[cfg(feature = "test-staging")]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use diesel::SqliteConnection;

    use crate::models::STATUS_PRESENT;
    use crate::orm::attendance::insert_attendance;
    use crate::orm::class_session::{deactivate_session, insert_session};
    use crate::orm::course::insert_course;
    use crate::orm::enrollment::insert_enrollment;
    use crate::orm::instructor::insert_instructor;
    use crate::orm::student::insert_student;
    use crate::orm::testing::{setup_test_db, setup_test_dbconn};

    fn ten_am() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    struct Fixture {
        session: ClassSession,
        enrolled: Student,
        outsider: Student,
    }

    /// Session from 10:00 to 11:00, one enrolled student, one outsider.
    fn seed(conn: &mut SqliteConnection) -> Fixture {
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

        let enrolled = insert_student(
            conn,
            "Amira Khaled".to_string(),
            "U2024001".to_string(),
            "amira@university.edu".to_string(),
            Some(b"reference".to_vec()),
        )
        .expect("insert student");
        insert_enrollment(conn, enrolled.id, course.id).expect("enroll");

        let outsider = insert_student(
            conn,
            "Omar Farid".to_string(),
            "U2024002".to_string(),
            "omar@university.edu".to_string(),
            None,
        )
        .expect("insert student");

        Fixture {
            session,
            enrolled,
            outsider,
        }
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid_regardless_of_identity_and_time() {
        let mut conn = setup_test_db();
        let fixture = seed(&mut conn);
        let db = setup_test_dbconn(&mut conn);

        for identity in [
            JoinIdentity::Anonymous,
            JoinIdentity::Missing,
            JoinIdentity::Student(fixture.enrolled.clone()),
        ] {
            for instant in [
                ten_am() - Duration::days(1),
                ten_am() + Duration::minutes(30),
                ten_am() + Duration::days(1),
            ] {
                let outcome =
                    process_join(&db, "no-such-token".to_string(), identity.clone(), instant)
                        .await
                        .expect("pipeline runs");
                assert!(
                    matches!(
                        outcome,
                        JoinOutcome::Rejected(JoinRejection::InvalidToken)
                    ),
                    "got {outcome:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_time_window_scenarios() {
        let mut conn = setup_test_db();
        let fixture = seed(&mut conn);
        let token = fixture.session.token.clone();
        let db = setup_test_dbconn(&mut conn);

        // T-1m: not started, rejection carries the start time for display.
        let outcome = process_join(
            &db,
            token.clone(),
            JoinIdentity::Student(fixture.enrolled.clone()),
            ten_am() - Duration::minutes(1),
        )
        .await
        .expect("pipeline runs");
        match outcome {
            JoinOutcome::Rejected(JoinRejection::SessionNotStarted { starts_at }) => {
                assert_eq!(starts_at, ten_am());
            }
            other => panic!("expected SessionNotStarted, got {other:?}"),
        }

        // T+30m: proceeds.
        let outcome = process_join(
            &db,
            token.clone(),
            JoinIdentity::Student(fixture.enrolled.clone()),
            ten_am() + Duration::minutes(30),
        )
        .await
        .expect("pipeline runs");
        assert!(matches!(outcome, JoinOutcome::Ready { .. }), "got {outcome:?}");

        // T+61m: expired.
        let outcome = process_join(
            &db,
            token,
            JoinIdentity::Student(fixture.enrolled),
            ten_am() + Duration::minutes(61),
        )
        .await
        .expect("pipeline runs");
        assert!(
            matches!(
                outcome,
                JoinOutcome::Rejected(JoinRejection::SessionExpired { .. })
            ),
            "got {outcome:?}"
        );
    }

    #[tokio::test]
    async fn test_inactive_session_is_rejected_before_identity() {
        let mut conn = setup_test_db();
        let fixture = seed(&mut conn);
        deactivate_session(&mut conn, fixture.session.id).expect("deactivate");
        let token = fixture.session.token.clone();
        let db = setup_test_dbconn(&mut conn);

        // Even an anonymous caller learns the session is off, not that they
        // must log in: the active check runs first. The same holds for a
        // login whose student row is gone.
        for identity in [JoinIdentity::Anonymous, JoinIdentity::Missing] {
            let outcome = process_join(&db, token.clone(), identity, ten_am() + Duration::minutes(5))
                .await
                .expect("pipeline runs");
            assert!(matches!(
                outcome,
                JoinOutcome::Rejected(JoinRejection::SessionInactive)
            ));
        }
    }

    #[tokio::test]
    async fn test_missing_identity_defers_to_authentication() {
        let mut conn = setup_test_db();
        let fixture = seed(&mut conn);
        let token = fixture.session.token.clone();
        let db = setup_test_dbconn(&mut conn);

        let outcome = process_join(
            &db,
            token,
            JoinIdentity::Anonymous,
            ten_am() + Duration::minutes(5),
        )
        .await
        .expect("pipeline runs");
        assert!(matches!(outcome, JoinOutcome::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_login_without_a_student_row_is_rejected_after_session_checks() {
        let mut conn = setup_test_db();
        let fixture = seed(&mut conn);
        let token = fixture.session.token.clone();
        let db = setup_test_dbconn(&mut conn);

        // The session itself is fine, so the identity stage decides.
        let outcome = process_join(
            &db,
            token,
            JoinIdentity::Missing,
            ten_am() + Duration::minutes(5),
        )
        .await
        .expect("pipeline runs");
        assert!(matches!(
            outcome,
            JoinOutcome::Rejected(JoinRejection::StudentNotFound)
        ));
    }

    #[tokio::test]
    async fn test_unenrolled_student_is_rejected_with_course_name() {
        let mut conn = setup_test_db();
        let fixture = seed(&mut conn);
        let token = fixture.session.token.clone();
        let db = setup_test_dbconn(&mut conn);

        let outcome = process_join(
            &db,
            token,
            JoinIdentity::Student(fixture.outsider),
            ten_am() + Duration::minutes(5),
        )
        .await
        .expect("pipeline runs");
        match outcome {
            JoinOutcome::Rejected(JoinRejection::NotEnrolled { course_name }) => {
                assert_eq!(course_name, "Operating Systems");
            }
            other => panic!("expected NotEnrolled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_existing_attendance_turns_into_already_recorded() {
        let mut conn = setup_test_db();
        let fixture = seed(&mut conn);
        let marked_at = ten_am() + Duration::minutes(5);
        let outcome = insert_attendance(&mut conn, &fixture.session, fixture.enrolled.id, marked_at)
            .expect("record attendance");
        match outcome {
            crate::orm::attendance::RecordOutcome::Recorded(row) => {
                assert_eq!(row.status, STATUS_PRESENT)
            }
            other => panic!("seed insert should win, got {other:?}"),
        }
        let token = fixture.session.token.clone();
        let db = setup_test_dbconn(&mut conn);

        let outcome = process_join(
            &db,
            token,
            JoinIdentity::Student(fixture.enrolled),
            ten_am() + Duration::minutes(40),
        )
        .await
        .expect("pipeline runs");
        match outcome {
            JoinOutcome::AlreadyRecorded { recorded_at } => assert_eq!(recorded_at, marked_at),
            other => panic!("expected AlreadyRecorded, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_session_open_boundaries() {
        let mut conn = setup_test_db();
        let fixture = seed(&mut conn);

        assert!(ensure_session_open(&fixture.session, ten_am()).is_ok());
        assert!(ensure_session_open(&fixture.session, ten_am() + Duration::minutes(60)).is_ok());
        assert!(matches!(
            ensure_session_open(&fixture.session, ten_am() - Duration::seconds(1)),
            Err(JoinRejection::SessionNotStarted { .. })
        ));
        assert!(matches!(
            ensure_session_open(
                &fixture.session,
                ten_am() + Duration::minutes(60) + Duration::seconds(1)
            ),
            Err(JoinRejection::SessionExpired { .. })
        ));
    }
}
