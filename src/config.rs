use std::{env, fmt::Display, str::FromStr};

use anyhow::anyhow;
use tracing::info;

pub const DEFAULT_DB_URL: &str = "redis://127.0.0.1:6379/";
pub const DEFAULT_SECRET: &str = "notthebestsecret";

pub const SESSION_COOKIE_NAME: &str = "session";
pub const SESSION_TTL_SECS: u64 = 60 * 60 * 24 * 7;

pub const POSTS_PER_PAGE: usize = 6;
pub const DEFAULT_API_PAGE_SIZE: usize = 10;
pub const MAX_API_PAGE_SIZE: usize = 50;

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;

// === Store keys ===
pub const FEED_KEY: &str = "feed";

pub fn post_key(id: &str) -> String {
    format!("post:{}", id)
}

pub fn comment_key(id: &str) -> String {
    format!("comment:{}", id)
}

/// Comment ids of one post, oldest first.
pub fn post_comments_key(post_id: &str) -> String {
    format!("post_comments:{}", post_id)
}

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

pub fn user_posts_key(user_id: &str) -> String {
    format!("user_posts:{}", user_id)
}

pub fn session_key(id: &str) -> String {
    format!("session:{}", id)
}

/// Runtime settings read from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub db_url: String,
    pub secret: String,
    pub bind_address: String,
    pub port: u16,
    pub seed_demo_data: bool,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            db_url: try_load("DB_URL", DEFAULT_DB_URL)?,
            secret: try_load("SECRET", DEFAULT_SECRET)?,
            bind_address: try_load("BIND_ADDRESS", "0.0.0.0")?,
            port: try_load("PORT", "5000")?,
            seed_demo_data: try_load("SEED_DEMO_DATA", "false")?,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow!("Invalid {key} value: {e}"))
}
