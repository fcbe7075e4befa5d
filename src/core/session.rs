//! Cookie sessions.
//!
//! The browser only holds a signed session id; the identity, the post-login
//! return path and queued flash notices live in the store under
//! `session:{id}` and expire after seven days.

use std::time::Duration;

use actix_web::cookie::{time, Cookie, CookieJar, Key};
use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::config::{session_key, SESSION_COOKIE_NAME, SESSION_TTL_SECS};
use crate::core::errors::AppError;
use crate::core::helpers::{new_id, now, validate_uuid};
use crate::core::store::Store;
use crate::AppState;

/// One-shot notices shown on the next rendered page.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct Flash {
    #[serde(default)]
    pub success: Vec<String>,
    #[serde(default)]
    pub error: Vec<String>,
}

impl Flash {
    pub fn is_empty(&self) -> bool {
        self.success.is_empty() && self.error.is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionData {
    pub user_id: Option<String>,
    pub return_to: Option<String>,
    #[serde(default)]
    pub flash: Flash,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    fn new() -> Self {
        Self {
            user_id: None,
            return_to: None,
            flash: Flash::default(),
            created_at: now(),
        }
    }

    fn is_expired(&self, at: DateTime<Utc>) -> bool {
        (at - self.created_at).num_seconds() > SESSION_TTL_SECS as i64
    }
}

pub struct Session {
    id: String,
    data: SessionData,
    /// Id replaced by [`Session::log_in`], deleted on the next save.
    stale_id: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: new_id(),
            data: SessionData::new(),
            stale_id: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.data.user_id.as_deref()
    }

    /// Authenticates the session under a fresh id.
    pub fn log_in(&mut self, user_id: &str) {
        let previous = std::mem::replace(&mut self.id, new_id());
        self.stale_id.get_or_insert(previous);
        self.data.user_id = Some(user_id.to_string());
        self.data.created_at = now();
    }

    pub fn log_out(&mut self) {
        self.data.user_id = None;
    }

    pub fn set_return_to(&mut self, path: &str) {
        self.data.return_to = Some(path.to_string());
    }

    pub fn take_return_to(&mut self) -> Option<String> {
        self.data.return_to.take()
    }

    pub fn flash_success(&mut self, message: impl Into<String>) {
        self.data.flash.success.push(message.into());
    }

    pub fn flash_error(&mut self, message: impl Into<String>) {
        self.data.flash.error.push(message.into());
    }

    /// Reads and clears the queued notices.
    pub fn drain_flash(&mut self) -> Flash {
        std::mem::take(&mut self.data.flash)
    }

    pub async fn load(store: &Store, key: &Key, cookie: Option<Cookie<'static>>) -> anyhow::Result<Self> {
        let Some(id) = cookie.and_then(|c| verify_cookie(key, c)) else {
            return Ok(Self::new());
        };
        if !validate_uuid(&id) {
            return Ok(Self::new());
        }

        match store.get_json::<SessionData>(&session_key(&id)).await? {
            Some(data) if !data.is_expired(now()) => Ok(Self {
                id,
                data,
                stale_id: None,
            }),
            _ => Ok(Self::new()),
        }
    }

    pub async fn save(&self, store: &Store) -> anyhow::Result<()> {
        if let Some(stale) = &self.stale_id {
            store.delete(&session_key(stale)).await?;
        }
        store
            .set_json_ex(
                &session_key(&self.id),
                &self.data,
                Duration::from_secs(SESSION_TTL_SECS),
            )
            .await
    }

    pub fn cookie(&self, key: &Key) -> Cookie<'static> {
        let cookie = Cookie::build(SESSION_COOKIE_NAME, self.id.clone())
            .path("/")
            .http_only(true)
            .max_age(time::Duration::seconds(SESSION_TTL_SECS as i64))
            .finish();

        let mut jar = CookieJar::new();
        jar.signed_mut(key).add(cookie.clone());
        jar.get(SESSION_COOKIE_NAME).cloned().unwrap_or(cookie)
    }

    /// Persists the session and answers with a redirect carrying its cookie.
    pub async fn redirect(self, state: &AppState, location: &str) -> Result<HttpResponse, AppError> {
        self.save(&state.store).await?;

        Ok(HttpResponse::Found()
            .insert_header((header::LOCATION, location))
            .cookie(self.cookie(&state.cookie_key))
            .finish())
    }
}

/// Derives the cookie signing key from the configured secret.
pub fn signing_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

fn verify_cookie(key: &Key, cookie: Cookie<'static>) -> Option<String> {
    let mut jar = CookieJar::new();
    jar.add_original(cookie);
    jar.signed(key)
        .get(SESSION_COOKIE_NAME)
        .map(|c| c.value().to_string())
}

impl FromRequest for Session {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let cookie = req.cookie(SESSION_COOKIE_NAME);

        Box::pin(async move {
            let state = state.ok_or_else(|| anyhow::anyhow!("application state is not registered"))?;
            let session = Session::load(&state.store, &state.cookie_key, cookie).await?;
            Ok(session)
        })
    }
}
