use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json};

use crate::err::Error;
use crate::models::{ProfileChanges, PublicUser};
use crate::token::Caller;
use crate::{proceeds, AppState, Payload};

pub async fn me(
    Extension(state): Extension<AppState>,
    Extension(caller): Extension<Caller>,
) -> Payload<PublicUser> {
    match state.users.find_user(caller.id).await? {
        Some(user) => proceeds(PublicUser::from(&user)),
        None => Err(Error::not_found("User not found")),
    }
}

pub async fn update_me(
    Extension(state): Extension<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ProfileChanges>, JsonRejection>,
) -> Payload<PublicUser> {
    let Json(changes) = body?;
    let changes = changes.normalized();
    match state.users.update_user(caller.id, &changes).await? {
        Some(user) => proceeds(PublicUser::from(&user)),
        None => Err(Error::not_found("User not found")),
    }
}
