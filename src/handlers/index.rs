use axum::response::Html;

static INDEX_HTML: &str = include_str!("../../static/index.html");

// Bait page served for every method and path that has no other route
pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}
