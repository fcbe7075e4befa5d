use actix_web::http::header;
use actix_web::HttpResponse;
use mime_guess::from_path;
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "static"]
struct Assets;

/// Serves an embedded asset, or `None` when no asset lives at `path`.
pub fn serve_static(path: &str) -> Option<HttpResponse> {
    let file_path = path.trim_start_matches('/');
    if file_path.is_empty() {
        return None;
    }

    let file = Assets::get(file_path)?;
    let mime = from_path(file_path).first_or_octet_stream();

    Some(
        HttpResponse::Ok()
            .content_type(mime.as_ref())
            .insert_header((header::CACHE_CONTROL, "public, max-age=3600"))
            .body(file.data.into_owned()),
    )
}
