pub mod app;
pub mod auth;
pub mod handlers;
pub mod reply;
pub mod state;

pub use app::build_app;
pub use state::AppState;
