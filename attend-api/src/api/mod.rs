pub mod attendance;
pub mod class_session;

use rocket::Route;

/// All API routes, mounted by the application under `/api`.
pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.append(&mut attendance::routes());
    routes.append(&mut class_session::routes());
    routes
}
