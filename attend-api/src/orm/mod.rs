pub mod attendance;
pub mod auth_session;
pub mod class_session;
pub mod course;
mod db;
pub mod enrollment;
pub mod instructor;
pub mod join;
pub mod student;
#[cfg(feature = "test-staging")]
pub mod testing;

pub use db::*;
