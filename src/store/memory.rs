use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{email_taken, unknown_owner, CredentialStore, RegistrationStore};
use crate::err::Error;
use crate::models::{Department, ProfileChanges, Registration, UserAccount};

/// Process-local store. Each call takes the lock once, so single-document
/// writes are atomic just like in the database backend.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, UserAccount>>,
    registrations: RwLock<Vec<Registration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, user: &UserAccount) -> Result<(), Error> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(email_taken());
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserAccount>, Error> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, Error> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Option<UserAccount>, Error> {
        let mut users = self.users.write().await;
        if let Some(email) = &changes.email {
            if users.values().any(|u| u.id != id && &u.email == email) {
                return Err(email_taken());
            }
        }
        Ok(users.get_mut(&id).map(|user| {
            changes.apply(user);
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn insert_registration(&self, registration: &Registration) -> Result<(), Error> {
        if !self.users.read().await.contains_key(&registration.owner) {
            return Err(unknown_owner());
        }
        self.registrations.write().await.push(registration.clone());
        Ok(())
    }

    async fn find_registration(&self, id: Uuid) -> Result<Option<Registration>, Error> {
        Ok(self
            .registrations
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list_registrations(&self, owner: Option<Uuid>) -> Result<Vec<Registration>, Error> {
        // reverse insertion order first so equal timestamps still come out newest-first
        let mut items: Vec<Registration> = self
            .registrations
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| owner.map_or(true, |o| r.owner == o))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn save_registration(&self, registration: &Registration) -> Result<(), Error> {
        let mut registrations = self.registrations.write().await;
        match registrations.iter_mut().find(|r| r.id == registration.id) {
            Some(slot) => {
                *slot = registration.clone();
                Ok(())
            }
            None => Err(Error::not_found("Not found")),
        }
    }

    async fn count_by_department(&self) -> Result<Vec<(Option<Department>, u64)>, Error> {
        let mut groups: HashMap<Option<Department>, u64> = HashMap::new();
        for registration in self.registrations.read().await.iter() {
            *groups.entry(registration.department).or_default() += 1;
        }
        Ok(groups.into_iter().collect())
    }
}
