//! Request guards resolving the `session` cookie to a principal.
//!
//! Authentication itself (login, logout, password handling) lives outside
//! this crate; whatever performs it writes `auth_sessions` rows. The guards
//! here only translate a cookie into a loaded [`Student`] or [`Instructor`].
//!
//! The authenticated guards fail with `401 Unauthorized`. The join route
//! instead takes a [`JoinIdentity`], whose guard always succeeds, so the
//! pipeline keeps its identity stage ordered after the session-state stages
//! and can tell an anonymous caller apart from a login whose student row no
//! longer exists.

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

use crate::models::{Instructor, PRINCIPAL_INSTRUCTOR, PRINCIPAL_STUDENT, Student};
use crate::orm::DbConn;
use crate::orm::auth_session::get_auth_session;
use crate::orm::instructor::get_instructor_by_id;
use crate::orm::join::JoinIdentity;
use crate::orm::student::get_student_by_id;

/// A request proven to come from a logged-in student.
pub struct AuthenticatedStudent {
    pub student: Student,
}

/// A request proven to come from a logged-in instructor.
pub struct AuthenticatedInstructor {
    pub instructor: Instructor,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedStudent {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(cookie) = req.cookies().get("session") else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        let token = cookie.value().to_string();

        let db = match req.guard::<DbConn>().await {
            Outcome::Success(db) => db,
            _ => return Outcome::Error((Status::InternalServerError, ())),
        };

        let result = db
            .run(move |conn| -> Result<Option<Student>, diesel::result::Error> {
                let Some(auth) = get_auth_session(conn, &token)? else {
                    return Ok(None);
                };
                if auth.principal_type != PRINCIPAL_STUDENT {
                    return Ok(None);
                }
                get_student_by_id(conn, auth.principal_id)
            })
            .await;

        match result {
            Ok(Some(student)) => Outcome::Success(AuthenticatedStudent { student }),
            Ok(None) => Outcome::Error((Status::Unauthorized, ())),
            Err(_) => Outcome::Error((Status::InternalServerError, ())),
        }
    }
}

/// Resolves the cookie to the three-state identity the join pipeline needs.
///
/// Unlike the authenticated guards this one never fails with 401: no cookie
/// and a dead cookie are both [`JoinIdentity::Anonymous`], while a live
/// student login whose student row has been deleted is
/// [`JoinIdentity::Missing`] so the pipeline can reject it outright instead
/// of bouncing the caller through login forever.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for JoinIdentity {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(cookie) = req.cookies().get("session") else {
            return Outcome::Success(JoinIdentity::Anonymous);
        };
        let token = cookie.value().to_string();

        let db = match req.guard::<DbConn>().await {
            Outcome::Success(db) => db,
            _ => return Outcome::Error((Status::InternalServerError, ())),
        };

        let result = db
            .run(move |conn| -> Result<JoinIdentity, diesel::result::Error> {
                let Some(auth) = get_auth_session(conn, &token)? else {
                    return Ok(JoinIdentity::Anonymous);
                };
                if auth.principal_type != PRINCIPAL_STUDENT {
                    return Ok(JoinIdentity::Anonymous);
                }
                Ok(match get_student_by_id(conn, auth.principal_id)? {
                    Some(student) => JoinIdentity::Student(student),
                    None => JoinIdentity::Missing,
                })
            })
            .await;

        match result {
            Ok(identity) => Outcome::Success(identity),
            Err(_) => Outcome::Error((Status::InternalServerError, ())),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedInstructor {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(cookie) = req.cookies().get("session") else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        let token = cookie.value().to_string();

        let db = match req.guard::<DbConn>().await {
            Outcome::Success(db) => db,
            _ => return Outcome::Error((Status::InternalServerError, ())),
        };

        let result = db
            .run(move |conn| -> Result<Option<Instructor>, diesel::result::Error> {
                let Some(auth) = get_auth_session(conn, &token)? else {
                    return Ok(None);
                };
                if auth.principal_type != PRINCIPAL_INSTRUCTOR {
                    return Ok(None);
                }
                get_instructor_by_id(conn, auth.principal_id)
            })
            .await;

        match result {
            Ok(Some(instructor)) => Outcome::Success(AuthenticatedInstructor { instructor }),
            Ok(None) => Outcome::Error((Status::Unauthorized, ())),
            Err(_) => Outcome::Error((Status::InternalServerError, ())),
        }
    }
}
