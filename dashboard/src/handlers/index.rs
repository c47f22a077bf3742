use axum::response::{Html, IntoResponse};

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Handler for `/` - the chart page.
pub async fn index_handler() -> impl IntoResponse {
    Html(INDEX_HTML)
}
