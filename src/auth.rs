use axum::extract::rejection::JsonRejection;
use axum::extract::Request;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use axum::{Extension, Json};
use chrono::Utc;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::err::Error;
use crate::models::{normalize_email, PublicUser, Role, UserAccount};
use crate::token::VerificationError;
use crate::{breaks, created, proceeds, AppState, Payload};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signup {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Login {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedIn {
    pub token: String,
    pub user: PublicUser,
}

pub fn hash_password(password: &str) -> Result<String, Error> {
    Ok(Pbkdf2
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, Error> {
    let hash = PasswordHash::new(password_hash)?;
    Ok(Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok())
}

fn filled(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub async fn signup(
    Extension(state): Extension<AppState>,
    body: Result<Json<Signup>, JsonRejection>,
) -> Payload<LoggedIn> {
    let Json(signup) = body?;
    // passwords are taken verbatim, only presence is checked
    let password = signup.password.filter(|p| !p.is_empty());
    let (first_name, last_name, email, password) = match (
        filled(signup.first_name),
        filled(signup.last_name),
        filled(signup.email),
        password,
    ) {
        (Some(f), Some(l), Some(e), Some(p)) => (f, l, normalize_email(&e), p),
        _ => return breaks(Error::invalid("Missing required fields")),
    };

    if state.users.find_user_by_email(&email).await?.is_some() {
        return breaks(Error::UserAlreadyExists {
            message: "Email already registered".to_string(),
        });
    }

    let now = Utc::now();
    let user = UserAccount {
        id: Uuid::new_v4(),
        first_name,
        last_name,
        email,
        password_hash: hash_password(&password)?,
        role: Role::Student,
        created_at: now,
        updated_at: now,
    };
    state.users.insert_user(&user).await?;

    let token = state.tokens.issue(user.id, user.role)?;
    log::info!("signed up user {}", user.id);
    created(LoggedIn {
        token,
        user: PublicUser::from(&user),
    })
}

pub async fn login(
    Extension(state): Extension<AppState>,
    body: Result<Json<Login>, JsonRejection>,
) -> Payload<LoggedIn> {
    let Json(login) = body?;
    let (email, password) = match (filled(login.email), login.password.filter(|p| !p.is_empty())) {
        (Some(e), Some(p)) => (normalize_email(&e), p),
        _ => return breaks(Error::invalid("Missing email or password")),
    };

    let user = match state.users.find_user_by_email(&email).await? {
        Some(user) => user,
        None => return breaks(Error::unauthenticated(INVALID_CREDENTIALS)),
    };
    if !verify_password(&password, &user.password_hash)? {
        return breaks(Error::unauthenticated(INVALID_CREDENTIALS));
    }

    let token = state.tokens.issue(user.id, user.role)?;
    log::info!("user {} logged in", user.id);
    proceeds(LoggedIn {
        token,
        user: PublicUser::from(&user),
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the bearer token into a [`Caller`](crate::token::Caller) request
/// extension. Only the token is consulted, never the credential store.
pub async fn require_auth(
    Extension(state): Extension<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Error> {
    let token = match bearer_token(request.headers()) {
        Some(token) => token,
        None => {
            log::debug!("rejected {}: no bearer token", request.uri().path());
            return Err(Error::unauthenticated("No token provided"));
        }
    };

    let caller = state.tokens.verify(token).map_err(|err| {
        log::debug!("rejected {}: {}", request.uri().path(), err);
        match err {
            VerificationError::Expired => Error::unauthenticated("Token expired"),
            VerificationError::Malformed => Error::unauthenticated("Invalid token"),
        }
    })?;

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}
