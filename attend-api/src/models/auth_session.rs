use chrono::NaiveDateTime;
use diesel::{Identifiable, Insertable, Queryable};

use crate::schema::auth_sessions;

/// Principal discriminators stored in `auth_sessions.principal_type`.
pub const PRINCIPAL_STUDENT: &str = "student";
pub const PRINCIPAL_INSTRUCTOR: &str = "instructor";

/// An authenticated browser session, written by the external login layer and
/// consumed here through the `session` cookie.
#[derive(Queryable, Identifiable, Debug)]
pub struct AuthSession {
    pub id: String, // Opaque session token (UUID or random)
    pub principal_type: String,
    pub principal_id: i32,
    pub created_at: NaiveDateTime,
    pub revoked: bool,
}

#[derive(Insertable)]
#[diesel(table_name = auth_sessions)]
pub struct NewAuthSession {
    pub id: String,
    pub principal_type: String,
    pub principal_id: i32,
    pub created_at: NaiveDateTime,
    pub revoked: bool,
}
