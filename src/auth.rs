use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{info, warn};

use crate::comments::find_comment;
use crate::core::errors::AppError;
use crate::core::helpers::{checked_id, verify_password};
use crate::core::session::Session;
use crate::core::store::Store;
use crate::models::models::{Comment, Post};
use crate::posts::find_post;
use crate::templates::{self, render};
use crate::users::find_user_by_username;
use crate::validation::parse_payload;
use crate::AppState;

pub const LOGIN_FAILED_MESSAGE: &str = "Password or username is incorrect";

/// Result of comparing a record's author with the acting user.
pub enum Ownership<T> {
    Owner(T),
    NotOwner,
}

/// Remembers where the visitor was heading and sends them to the login form.
pub async fn login_required(
    state: &AppState,
    mut session: Session,
    req: &HttpRequest,
) -> Result<HttpResponse, AppError> {
    let target = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/posts");
    session.set_return_to(target);
    session.redirect(state, "/login").await
}

pub async fn already_logged_in(state: &AppState, mut session: Session) -> Result<HttpResponse, AppError> {
    session.flash_success("You signed in already!");
    session.redirect(state, "/posts").await
}

/// Loads the post and checks that `user_id` wrote it. A missing post is an
/// error, never a silent denial.
pub async fn post_author(store: &Store, post_id: &str, user_id: &str) -> Result<Ownership<Post>, AppError> {
    let post = find_post(store, checked_id(post_id)?)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    if post.author != user_id {
        warn!(post_id = %post_id, user_id = %user_id, "post change denied to non-author");
        return Ok(Ownership::NotOwner);
    }
    Ok(Ownership::Owner(post))
}

pub async fn comment_author(
    store: &Store,
    comment_id: &str,
    user_id: &str,
) -> Result<Ownership<Comment>, AppError> {
    let comment = find_comment(store, checked_id(comment_id)?)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    if comment.author != user_id {
        warn!(comment_id = %comment_id, user_id = %user_id, "comment change denied to non-author");
        return Ok(Ownership::NotOwner);
    }
    Ok(Ownership::Owner(comment))
}

// === HTTP Handlers ===

pub async fn login_form(state: web::Data<AppState>, session: Session) -> Result<HttpResponse, AppError> {
    if session.user_id().is_some() {
        return already_logged_in(&state, session).await;
    }
    render(&state, session, templates::login_page()?).await
}

pub async fn login(
    state: web::Data<AppState>,
    mut session: Session,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let creds = parse_payload(&req, &body)?;
    let username = creds["username"].as_str().unwrap_or_default();
    let password = creds["password"].as_str().unwrap_or_default();

    let user = match find_user_by_username(&state.store, username.trim()).await? {
        Some(u) if verify_password(password, &u.password) => u,
        _ => {
            warn!(username = %username, "login failed");
            session.flash_error(LOGIN_FAILED_MESSAGE);
            return session.redirect(&state, "/login").await;
        }
    };

    info!(user_id = %user.id, "user logged in");
    let target = session.take_return_to().unwrap_or_else(|| "/posts".to_string());
    session.log_in(&user.id);
    session.flash_success("Welcome Back!");
    session.redirect(&state, &target).await
}

pub async fn logout(state: web::Data<AppState>, mut session: Session) -> Result<HttpResponse, AppError> {
    if let Some(user_id) = session.user_id() {
        info!(user_id = %user_id, "user logged out");
    }
    session.log_out();
    session.flash_success("Logged Out");
    session.redirect(&state, "/posts").await
}
