use axum::response::Html;

pub async fn get_index() -> Html<&'static str> { Html("<h2> You are welcome! </h2>") }
