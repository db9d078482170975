//! HTML pages

use axum::{
    Router,
    response::{Html, IntoResponse},
    routing::get,
};

use crate::AppState;
use crate::auth::CurrentUser;

pub fn pages_router() -> Router<AppState> {
    Router::new().route("/", get(home))
}

/// GET /
async fn home(CurrentUser(resolved): CurrentUser) -> impl IntoResponse {
    let user = &resolved.user;
    let display = user
        .name
        .as_deref()
        .or(user.email.as_deref())
        .unwrap_or(user.id.as_str());

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Home</title></head>
<body>
    <h1>Welcome, {}</h1>
    <form method="post" action="/auth/signout">
        <button type="submit">Sign out</button>
    </form>
</body>
</html>"#,
        html_escape::encode_text(display)
    ))
}
