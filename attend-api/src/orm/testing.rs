#![cfg(feature = "test-staging")]

//! Test scaffolding: in-memory databases, an async-compatible connection
//! wrapper, and a fully seeded Rocket instance with a scripted face-matching
//! backend.

use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use rocket::figment::{
    util::map,
    value::{Map, Value},
};
use rocket::{Build, Rocket, fairing::AdHoc};
use rocket_sync_db_pools::diesel;

use super::db::{DbConn, DbRunner, run_pending_migrations, set_foreign_keys};
use crate::face::{FaceMatcher, StubMatcher};
use crate::models::{PRINCIPAL_INSTRUCTOR, PRINCIPAL_STUDENT};
use crate::orm::auth_session::insert_auth_session;
use crate::orm::course::insert_course;
use crate::orm::enrollment::insert_enrollment;
use crate::orm::instructor::insert_instructor;
use crate::orm::student::insert_student;

/// Auth-session cookie values pre-seeded by [`test_rocket`]. The login layer
/// is external to this crate, so tests authenticate by setting these
/// directly.
pub const AMIRA_SESSION_COOKIE: &str = "test-session-amira";
pub const OMAR_SESSION_COOKIE: &str = "test-session-omar";
pub const LINA_SESSION_COOKIE: &str = "test-session-lina";
pub const INSTRUCTOR_SESSION_COOKIE: &str = "test-session-salma";
pub const OTHER_INSTRUCTOR_SESSION_COOKIE: &str = "test-session-tarek";

/// A live student login whose student row does not exist, for exercising the
/// missing-record path. `auth_sessions.principal_id` carries no foreign key,
/// so the row can point anywhere.
pub const GHOST_SESSION_COOKIE: &str = "test-session-ghost";

/// Reference photos stored on the seeded students, in [`StubMatcher`]'s
/// scripted byte language.
pub const AMIRA_REFERENCE_IMAGE: &[u8] = b"face:amira";
pub const LINA_REFERENCE_IMAGE: &[u8] = b"face:lina";

/// Deterministic ids from the fixed seeding order in `create_test_data`.
pub const CS350_COURSE_ID: i32 = 1;
pub const CS310_COURSE_ID: i32 = 2;

/// Configures SQLite with performance-optimized settings for testing.
///
/// Sets the following PRAGMAs:
/// - `synchronous = OFF`: Disables synchronous writes for faster performance
/// - `journal_mode = OFF`: Disables rollback journal
///
/// These settings make SQLite faster but less durable - only use for testing.
fn set_sqlite_test_pragmas(conn: &mut diesel::SqliteConnection) {
    conn.batch_execute(
        r#"
        PRAGMA synchronous = OFF;
        PRAGMA journal_mode = OFF;
        "#,
    )
    .expect("Failed to set SQLite PRAGMAs");
}

/// Creates a Rocket fairing that sets SQLite testing pragmas.
fn set_sqlite_test_pragmas_fairing() -> AdHoc {
    AdHoc::on_ignite("Set SQLite Test Pragmas", |rocket| async {
        let conn = DbConn::get_one(&rocket)
            .await
            .expect("database connection for migration");
        conn.run(|c| {
            set_sqlite_test_pragmas(c);
        })
        .await;
        rocket
    })
}

/// Creates a Rocket fairing that initializes standard test data.
///
/// This fairing seeds the consistent set of instructors, students, courses,
/// enrollments and auth sessions that all tests rely on. It only exists
/// behind the `test-staging` feature so it can never run in production.
fn test_data_init_fairing() -> AdHoc {
    AdHoc::on_ignite("Test Data Initialization", |rocket| async {
        let conn = DbConn::get_one(&rocket)
            .await
            .expect("database connection for test data initialization");

        conn.run(|c| {
            if let Err(e) = create_test_data(c) {
                eprintln!("[test-data-init] ERROR: Failed to create test data: {:?}", e);
            } else {
                eprintln!("[test-data-init] Test data initialization completed");
            }
        })
        .await;

        rocket
    })
}

/// Creates standard test data for all tests to use.
///
/// Two instructors with one course each; three students: Amira (reference
/// photo, enrolled in CS350), Omar (no reference photo, enrolled in CS350),
/// Lina (reference photo, not enrolled anywhere).
fn create_test_data(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    let salma = insert_instructor(
        conn,
        "Dr. Salma Hassan".to_string(),
        "salma@university.edu".to_string(),
        Some("Computer Science".to_string()),
    )?;
    let tarek = insert_instructor(
        conn,
        "Dr. Tarek Aziz".to_string(),
        "tarek@university.edu".to_string(),
        None,
    )?;

    let cs350 = insert_course(
        conn,
        "Operating Systems".to_string(),
        "CS350".to_string(),
        Some(salma.id),
        Some(3),
    )?;
    let cs310 = insert_course(
        conn,
        "Databases".to_string(),
        "CS310".to_string(),
        Some(tarek.id),
        Some(3),
    )?;
    assert_eq!(cs350.id, CS350_COURSE_ID, "seeding order changed");
    assert_eq!(cs310.id, CS310_COURSE_ID, "seeding order changed");

    let amira = insert_student(
        conn,
        "Amira Khaled".to_string(),
        "U2024001".to_string(),
        "amira@university.edu".to_string(),
        Some(AMIRA_REFERENCE_IMAGE.to_vec()),
    )?;
    let omar = insert_student(
        conn,
        "Omar Farid".to_string(),
        "U2024002".to_string(),
        "omar@university.edu".to_string(),
        None,
    )?;
    let lina = insert_student(
        conn,
        "Lina Mostafa".to_string(),
        "U2024003".to_string(),
        "lina@university.edu".to_string(),
        Some(LINA_REFERENCE_IMAGE.to_vec()),
    )?;

    insert_enrollment(conn, amira.id, cs350.id)?;
    insert_enrollment(conn, omar.id, cs350.id)?;

    insert_auth_session(
        conn,
        AMIRA_SESSION_COOKIE.to_string(),
        PRINCIPAL_STUDENT,
        amira.id,
    )?;
    insert_auth_session(
        conn,
        OMAR_SESSION_COOKIE.to_string(),
        PRINCIPAL_STUDENT,
        omar.id,
    )?;
    insert_auth_session(
        conn,
        LINA_SESSION_COOKIE.to_string(),
        PRINCIPAL_STUDENT,
        lina.id,
    )?;
    insert_auth_session(
        conn,
        INSTRUCTOR_SESSION_COOKIE.to_string(),
        PRINCIPAL_INSTRUCTOR,
        salma.id,
    )?;
    insert_auth_session(
        conn,
        OTHER_INSTRUCTOR_SESSION_COOKIE.to_string(),
        PRINCIPAL_INSTRUCTOR,
        tarek.id,
    )?;
    insert_auth_session(conn, GHOST_SESSION_COOKIE.to_string(), PRINCIPAL_STUDENT, 9999)?;

    Ok(())
}

/// Creates and configures a Rocket instance for testing with an in-memory
/// SQLite database and the scripted [`StubMatcher`] backend.
///
/// The returned Rocket instance will have:
/// - An in-memory SQLite database configured
/// - Database connection pool attached
/// - Foreign keys enabled
/// - Testing pragmas set
/// - All migrations run
/// - Standard test data seeded
/// - API routes mounted
pub fn test_rocket() -> Rocket<Build> {
    use uuid::Uuid;

    // Generate a unique database name for this test instance
    let unique_db_name = format!("file:test_db_{}?mode=memory&cache=shared", Uuid::new_v4());

    // Configure the in-memory SQLite database
    let db_config: Map<_, Value> = map! {
        "url" => unique_db_name.into(),  // Unique shared in-memory DB per test
        "pool_size" => 5.into(),
        "timeout" => 5.into(),
    };

    let databases = map!["sqlite_db" => db_config];

    // Merge DB config into Rocket's figment
    let figment = rocket::Config::figment().merge(("databases", databases));

    let matcher: Arc<dyn FaceMatcher> = Arc::new(StubMatcher);

    let rocket = rocket::custom(figment)
        .attach(DbConn::fairing())
        .attach(super::db::set_foreign_keys_fairing())
        .attach(set_sqlite_test_pragmas_fairing())
        .attach(super::db::run_migrations_fairing())
        .attach(test_data_init_fairing())
        .manage(matcher);

    crate::mount_api_routes(rocket)
}

/// Creates a synchronous in-memory SQLite database connection for unit tests.
///
/// This function returns a `diesel::SqliteConnection` connected to an
/// in-memory SQLite database, runs all embedded Diesel migrations, and
/// enables foreign key support. This is ideal for direct Diesel queries in
/// synchronous test code.
///
/// Each call to this function returns a new, independent in-memory database.
pub fn setup_test_db() -> SqliteConnection {
    use diesel::Connection;

    let mut conn = SqliteConnection::establish(":memory:")
        .expect("Failed to create in-memory SQLite database");
    set_foreign_keys(&mut conn);
    run_pending_migrations(&mut conn);
    conn
}

/// A minimal async-compatible wrapper for a synchronous SQLite connection.
///
/// This allows using a unit-test database with code that expects a
/// Rocket-style async `.run()` interface (such as `process_join`).
pub struct FakeDbConn<'a>(pub &'a mut diesel::SqliteConnection);

impl<'a> FakeDbConn<'a> {
    /// Executes a closure with a mutable reference to the underlying SQLite
    /// connection.
    ///
    /// This method mimics the async `.run()` interface used by Rocket's
    /// database connections, but operates synchronously for testing.
    ///
    /// # Safety
    /// This uses unsafe code to convert an immutable reference to mutable,
    /// which is safe in this controlled test environment where we know we
    /// have exclusive access.
    pub async fn run<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut diesel::SqliteConnection) -> R + Send + 'static,
        R: Send + 'static,
    {
        // Safety: We need to get a mutable reference from an immutable reference
        // This is safe because we're in a test environment and we control the lifetime
        unsafe {
            let conn_ptr =
                self.0 as *const diesel::SqliteConnection as *mut diesel::SqliteConnection;
            f(&mut *conn_ptr)
        }
    }
}

impl<'a> DbRunner for FakeDbConn<'a> {
    fn run<F, R>(&self, f: F) -> impl std::future::Future<Output = R>
    where
        F: FnOnce(&mut diesel::SqliteConnection) -> R + Send + 'static,
        R: Send + 'static,
    {
        FakeDbConn::run(self, f)
    }
}

/// Creates a `FakeDbConn` for async-style testing with the given SQLite
/// connection.
pub fn setup_test_dbconn<'a>(conn: &'a mut diesel::SqliteConnection) -> FakeDbConn<'a> {
    FakeDbConn(conn)
}
