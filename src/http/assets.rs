//! Static asset serving. The HTML/CSS/JS bundle's own design isn't this
//! crate's concern; these are a deliberately small shell sufficient to
//! exercise the REST/WS surface, embedded via `rust-embed`.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "static/"]
struct Assets;

fn serve(path: &str) -> Response {
    match Assets::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                file.data.into_owned(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

pub async fn serve_index() -> Response {
    serve("index.html")
}

pub async fn serve_style() -> Response {
    serve("style.css")
}

pub async fn serve_app_js() -> Response {
    serve("app.js")
}

pub async fn serve_manifest() -> Response {
    serve("manifest.json")
}

pub async fn serve_service_worker() -> Response {
    serve("sw.js")
}
