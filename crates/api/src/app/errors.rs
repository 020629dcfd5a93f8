use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use parcelmark_infra::ResolveError;

pub const USER_NOT_FOUND: &str = "Пользователь не найден";
pub const BOOKMARKS_UNAVAILABLE: &str = "Произошла ошибка при получении закладок";

/// Map a resolver failure to a client response.
///
/// Internal details go to the log only; the client sees a fixed message.
pub fn resolve_error_to_response(err: ResolveError) -> axum::response::Response {
    match err {
        ResolveError::UserNotFound(_) => json_error(StatusCode::NOT_FOUND, USER_NOT_FOUND),
        other => {
            tracing::error!(error = %other, "failed to load user bookmarks");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, BOOKMARKS_UNAVAILABLE)
        }
    }
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "message": message.into(),
        })),
    )
        .into_response()
}
