pub mod attendance;
pub mod auth_session;
pub mod class_session;
pub mod course;
pub mod enrollment;
pub mod instructor;
pub mod student;

// Re-export models for easier access
pub use attendance::*;
pub use auth_session::*;
pub use class_session::*;
pub use course::*;
pub use enrollment::*;
pub use instructor::*;
pub use student::*;
