use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use parcelmark_core::UserId;

use crate::app::errors::{self, USER_NOT_FOUND};
use crate::app::{dto, services::AppServices};

/// `GET /users/:user_id/bookmarks?page=N`
///
/// An id that does not parse cannot name a user, so it is answered like an unknown one.
pub async fn list_bookmarks(
    Extension(services): Extension<Arc<AppServices>>,
    Path(user_id): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let user_id: UserId = match user_id.parse() {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(error = %e, "malformed user id");
            return errors::json_error(StatusCode::NOT_FOUND, USER_NOT_FOUND);
        }
    };

    let page = dto::BookmarksQuery::from_pairs(pairs).page();
    match services.resolver().resolve_page(user_id, page).await {
        Ok(page) => (StatusCode::OK, Json(dto::bookmark_page_to_json(page))).into_response(),
        Err(e) => errors::resolve_error_to_response(e),
    }
}
