pub mod api;

pub use api::{app_routes, build_app, ApiDoc, AppState};
