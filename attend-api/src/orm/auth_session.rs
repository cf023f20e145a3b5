//! Read-side of the authentication contract.
//!
//! Login and logout live in an external layer; this crate only resolves the
//! opaque `session` cookie to a principal. The insert exists for that
//! external layer (and the test seeder) to write rows through.

use chrono::Utc;
use diesel::prelude::*;

use crate::models::{AuthSession, NewAuthSession};

/// Resolves a cookie value to a live (non-revoked) auth session.
pub fn get_auth_session(
    conn: &mut SqliteConnection,
    token: &str,
) -> Result<Option<AuthSession>, diesel::result::Error> {
    use crate::schema::auth_sessions::dsl::*;
    auth_sessions
        .filter(id.eq(token))
        .filter(revoked.eq(false))
        .first::<AuthSession>(conn)
        .optional()
}

/// Stores an authenticated session for a principal.
pub fn insert_auth_session(
    conn: &mut SqliteConnection,
    token: String,
    kind: &str,
    for_principal_id: i32,
) -> Result<(), diesel::result::Error> {
    use crate::schema::auth_sessions;

    let new_session = NewAuthSession {
        id: token,
        principal_type: kind.to_string(),
        principal_id: for_principal_id,
        created_at: Utc::now().naive_utc(),
        revoked: false,
    };

    diesel::insert_into(auth_sessions::table)
        .values(&new_session)
        .execute(conn)?;
    Ok(())
}
