use axum::{routing::get, Router};

pub mod bookmarks;
pub mod system;

/// Router for all user-scoped endpoints.
pub fn router() -> Router {
    Router::new().route("/users/:user_id/bookmarks", get(bookmarks::list_bookmarks))
}
