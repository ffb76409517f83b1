pub mod auth;
pub mod client;
pub mod config;
pub mod err;
pub mod models;
pub mod notify;
pub mod registrations;
pub mod shutdown;
pub mod store;
pub mod token;
pub mod users;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::Config;
use crate::err::Error;
use crate::notify::{BroadcastBus, Publisher};
use crate::registrations::RegistrationService;
use crate::store::{CredentialStore, RegistrationStore};
use crate::token::TokenService;

pub type Payload<T> = Result<(StatusCode, Json<T>), Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok((StatusCode::OK, Json(value)))
}

pub fn created<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok((StatusCode::CREATED, Json(value)))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Err(err)
}

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn CredentialStore>,
    pub registrations: Arc<RegistrationService>,
    pub tokens: Arc<TokenService>,
    pub bus: Arc<BroadcastBus>,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, tokens: TokenService, bus: Arc<BroadcastBus>) -> Self
    where
        S: CredentialStore + RegistrationStore + 'static,
    {
        let publisher: Arc<dyn Publisher> = bus.clone();
        Self {
            users: store.clone(),
            registrations: Arc::new(RegistrationService::new(store, publisher)),
            tokens: Arc::new(tokens),
            bus,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/users/me", get(users::me).put(users::update_me))
        .route(
            "/api/registrations",
            post(registrations::create).get(registrations::list),
        )
        .route(
            "/api/registrations/:id",
            get(registrations::read).put(registrations::update),
        )
        .route_layer(middleware::from_fn(auth::require_auth));

    Router::new()
        .route("/", get(index))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/registrations/stats", get(registrations::stats))
        .route("/api/events", get(notify::subscribe))
        .merge(protected)
        .fallback(err::handler404)
        .layer(Extension(state))
}

/// [`router`] wrapped in the HTTP stack the server runs with: the body
/// limit outermost, CORS inside it.
pub fn app(state: AppState, config: &Config) -> anyhow::Result<Router> {
    Ok(router(state).layer(
        ServiceBuilder::new()
            .layer(RequestBodyLimitLayer::new(config.body_limit))
            .layer(config.cors_layer()?),
    ))
}

async fn index() -> &'static str {
    "Student registry API running"
}
