use std::net::TcpListener;

use actix_web::cookie::Key;
use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};

pub mod auth;
pub mod comments;
pub mod config;
pub mod core;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod posts;
pub mod static_server;
pub mod templates;
pub mod users;
pub mod validation;

use crate::config::Config;
use crate::core::session::signing_key;
use crate::core::store::Store;
use crate::middleware::{MethodOverride, RequestLogging};

/// Shared by every worker through `web::Data`.
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        let cookie_key = signing_key(&config.secret);
        Self {
            store,
            config,
            cookie_key,
        }
    }
}

/// Builds the HTTP server on an already bound listener.
pub fn run(listener: TcpListener, state: web::Data<AppState>) -> std::io::Result<Server> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(MethodOverride)
            .wrap(RequestLogging)
            .configure(handlers::configure)
            .default_service(web::route().to(handlers::fallback))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
