use actix_web::{web, HttpRequest, HttpResponse};
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::already_logged_in;
use crate::config::*;
use crate::core::errors::AppError;
use crate::core::helpers::{checked_id, hash_password, new_id, now};
use crate::core::session::Session;
use crate::core::store::Store;
use crate::models::models::{Post, User};
use crate::posts::posts_by_author;
use crate::templates::{self, render};
use crate::validation::{contains_markup, parse_payload};
use crate::AppState;

/// Reasons a signup is bounced back to the form.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("No username was given")]
    MissingUsername,
    #[error("No password was given")]
    MissingPassword,
    #[error("Username must be 3-50 characters")]
    UsernameLength,
    #[error("Username must not include html!")]
    UsernameMarkup,
    #[error("Password must be at least 3 characters")]
    PasswordTooShort,
    #[error("A user with the given username is already registered")]
    UserExists,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub async fn find_user(store: &Store, user_id: &str) -> anyhow::Result<Option<User>> {
    store.get_json::<User>(&user_key(user_id)).await
}

pub async fn find_user_by_username(store: &Store, username: &str) -> anyhow::Result<Option<User>> {
    match store.get_json::<String>(&username_key(username)).await? {
        Some(user_id) => find_user(store, &user_id).await,
        None => Ok(None),
    }
}

/// Validates the credentials and persists a new user with a hashed password.
pub async fn create_user(store: &Store, username: &str, password: &str) -> Result<User, RegistrationError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(RegistrationError::MissingUsername);
    }
    if password.is_empty() {
        return Err(RegistrationError::MissingPassword);
    }
    let length = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&length) {
        return Err(RegistrationError::UsernameLength);
    }
    if contains_markup(username) {
        return Err(RegistrationError::UsernameMarkup);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(RegistrationError::PasswordTooShort);
    }

    let user = User {
        id: new_id(),
        username: username.to_string(),
        password: hash_password(password)?,
        created_at: now(),
    };

    // Claim the username before writing the record so concurrent signups
    // cannot both succeed.
    if !store.set_json_if_absent(&username_key(&user.username), &user.id).await? {
        return Err(RegistrationError::UserExists);
    }
    store.set_json(&user_key(&user.id), &user).await?;

    Ok(user)
}

// === HTTP Handlers ===

pub async fn register_form(state: web::Data<AppState>, session: Session) -> Result<HttpResponse, AppError> {
    if session.user_id().is_some() {
        return already_logged_in(&state, session).await;
    }
    render(&state, session, templates::register_page()?).await
}

pub async fn register(
    state: web::Data<AppState>,
    mut session: Session,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let payload = parse_payload(&req, &body)?;
    let username = payload["username"].as_str().unwrap_or_default();
    let password = payload["password"].as_str().unwrap_or_default();

    match create_user(&state.store, username, password).await {
        Ok(user) => {
            info!(user_id = %user.id, username = %user.username, "user registered");
            session.log_in(&user.id);
            session.flash_success("Welcome to dogpics!");
            session.redirect(&state, "/posts").await
        }
        Err(RegistrationError::Store(err)) => Err(AppError::Internal(err)),
        Err(err) => {
            warn!(username = %username, reason = %err, "registration rejected");
            session.flash_error(err.to_string());
            session.redirect(&state, "/register").await
        }
    }
}

pub async fn profile(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user_id = checked_id(&path)?;

    let user = find_user(&state.store, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    let posts: Vec<Post> = posts_by_author(&state.store, user_id).await?;
    let total_posts = state.store.list_len(&user_posts_key(user_id)).await?;

    render(&state, session, templates::profile_page(&user, &posts, total_posts)?).await
}
