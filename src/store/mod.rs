//! Persistence seams. Services only see these traits; the backends are
//! [`MemoryStore`] and [`PgStore`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::err::Error;
use crate::models::{Department, ProfileChanges, Registration, UserAccount};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `UserAlreadyExists` when the (lower-cased) email is taken.
    async fn insert_user(&self, user: &UserAccount) -> Result<(), Error>;

    async fn find_user(&self, id: Uuid) -> Result<Option<UserAccount>, Error>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, Error>;

    /// Returns `None` when no such user exists.
    async fn update_user(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Option<UserAccount>, Error>;
}

#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Fails with `NotFound` when the owner is not a known user.
    async fn insert_registration(&self, registration: &Registration) -> Result<(), Error>;

    async fn find_registration(&self, id: Uuid) -> Result<Option<Registration>, Error>;

    /// Newest first. `owner = None` lists every record.
    async fn list_registrations(&self, owner: Option<Uuid>) -> Result<Vec<Registration>, Error>;

    /// Replaces the stored document with the same id.
    async fn save_registration(&self, registration: &Registration) -> Result<(), Error>;

    async fn count_by_department(&self) -> Result<Vec<(Option<Department>, u64)>, Error>;
}

fn unknown_owner() -> Error {
    Error::not_found("User not found")
}

fn email_taken() -> Error {
    Error::UserAlreadyExists {
        message: "Email already registered".to_string(),
    }
}
