use actix_web::http::Method;
use actix_web::{web, HttpRequest, HttpResponse};

use crate::core::errors::{AppError, NOT_FOUND_MESSAGE};
use crate::core::session::Session;
use crate::static_server::serve_static;
use crate::templates::{self, render};
use crate::{auth, comments, posts, users, AppState};

/// Route table. `/posts/new` is registered ahead of `/posts/{id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(home))
        .route("/posts", web::get().to(posts::list_posts))
        .route("/posts", web::post().to(posts::create_post))
        .route("/api/posts", web::get().to(posts::api_list_posts))
        .route("/posts/new", web::get().to(posts::new_post_form))
        .route("/posts/{id}", web::get().to(posts::show_post))
        .route("/posts/{id}", web::put().to(posts::update_post))
        .route("/posts/{id}", web::delete().to(posts::delete_post))
        .route("/posts/{id}/edit", web::get().to(posts::edit_post_form))
        .route("/posts/{id}/comments", web::post().to(comments::create_comment))
        .route(
            "/posts/{id}/comments/{comment_id}",
            web::delete().to(comments::delete_comment),
        )
        .route("/register", web::get().to(users::register_form))
        .route("/register", web::post().to(users::register))
        .route("/users/{id}", web::get().to(users::profile))
        .route("/login", web::get().to(auth::login_form))
        .route("/login", web::post().to(auth::login))
        .route("/logout", web::get().to(auth::logout));
}

pub async fn home(state: web::Data<AppState>, session: Session) -> Result<HttpResponse, AppError> {
    render(&state, session, templates::home_page()?).await
}

/// Embedded assets for GET/HEAD, the not-found page for everything else.
pub async fn fallback(req: HttpRequest) -> Result<HttpResponse, AppError> {
    if req.method() == Method::GET || req.method() == Method::HEAD {
        if let Some(resp) = serve_static(req.path()) {
            return Ok(resp);
        }
    }
    Err(AppError::NotFound(NOT_FOUND_MESSAGE.to_string()))
}
