use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::{Extension, Json};
use std::sync::Arc;
use uuid::Uuid;

use crate::err::Error;
use crate::models::{NewRegistration, Registration, RegistrationPatch, Stats};
use crate::notify::{Publisher, RegistrationEvent};
use crate::store::RegistrationStore;
use crate::token::Caller;
use crate::{created, proceeds, AppState, Payload};

/// Ownership rules and aggregates over the registration store.
///
/// Writes publish only after the store call returned, and before the caller
/// gets its result back.
pub struct RegistrationService {
    store: Arc<dyn RegistrationStore>,
    publisher: Arc<dyn Publisher>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn RegistrationStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self { store, publisher }
    }

    pub async fn create(&self, caller: &Caller, fields: NewRegistration) -> Result<Registration, Error> {
        let registration = fields.into_registration(caller.id)?;
        self.store.insert_registration(&registration).await?;
        self.publisher
            .publish(RegistrationEvent::Created(registration.clone()));
        Ok(registration)
    }

    pub async fn list(&self, caller: &Caller) -> Result<Vec<Registration>, Error> {
        let owner = if caller.is_admin() { None } else { Some(caller.id) };
        self.store.list_registrations(owner).await
    }

    pub async fn get(&self, id: Uuid, caller: &Caller) -> Result<Registration, Error> {
        let registration = self
            .store
            .find_registration(id)
            .await?
            .ok_or_else(|| Error::not_found("Not found"))?;
        if !caller.may_access(registration.owner) {
            return Err(Error::forbidden());
        }
        Ok(registration)
    }

    pub async fn update(
        &self,
        id: Uuid,
        caller: &Caller,
        patch: RegistrationPatch,
    ) -> Result<Registration, Error> {
        let mut registration = self.get(id, caller).await?;
        patch.apply(&mut registration)?;
        self.store.save_registration(&registration).await?;
        self.publisher
            .publish(RegistrationEvent::Updated(registration.clone()));
        Ok(registration)
    }

    pub async fn stats(&self) -> Result<Stats, Error> {
        Ok(Stats::from_groups(self.store.count_by_department().await?))
    }
}

fn parse_id(raw: &str) -> Result<Uuid, Error> {
    raw.parse().map_err(|_| Error::not_found("Not found"))
}

pub async fn create(
    Extension(state): Extension<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<NewRegistration>, JsonRejection>,
) -> Payload<Registration> {
    let Json(fields) = body?;
    created(state.registrations.create(&caller, fields).await?)
}

pub async fn list(
    Extension(state): Extension<AppState>,
    Extension(caller): Extension<Caller>,
) -> Payload<Vec<Registration>> {
    proceeds(state.registrations.list(&caller).await?)
}

pub async fn read(
    Extension(state): Extension<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Payload<Registration> {
    let id = parse_id(&id)?;
    proceeds(state.registrations.get(id, &caller).await?)
}

pub async fn update(
    Extension(state): Extension<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Result<Json<RegistrationPatch>, JsonRejection>,
) -> Payload<Registration> {
    let id = parse_id(&id)?;
    let Json(patch) = body?;
    proceeds(state.registrations.update(id, &caller, patch).await?)
}

pub async fn stats(Extension(state): Extension<AppState>) -> Payload<Stats> {
    proceeds(state.registrations.stats().await?)
}
