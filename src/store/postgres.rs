use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{email_taken, unknown_owner, CredentialStore, RegistrationStore};
use crate::err::Error;
use crate::models::{Department, ProfileChanges, Registration, UserAccount};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'student',
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS users_email_lower_idx ON users (lower(email))",
    "CREATE TABLE IF NOT EXISTS registrations (
        id UUID PRIMARY KEY,
        owner UUID NOT NULL REFERENCES users(id),
        student_id TEXT,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT,
        program TEXT NOT NULL,
        intake_year INTEGER,
        department TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS registrations_owner_idx ON registrations (owner, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS registrations_email_idx ON registrations (email)",
];

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserAccount {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RegistrationRow {
    id: Uuid,
    owner: Uuid,
    student_id: Option<String>,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    program: String,
    intake_year: Option<i32>,
    department: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = Error;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner: row.owner,
            student_id: row.student_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            program: row.program,
            intake_year: row.intake_year,
            department: parse_department(row.department)?,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_department(value: Option<String>) -> Result<Option<Department>, Error> {
    value
        .map(|d| d.parse::<Department>().map_err(|_| Error::storage(format!("unknown department `{}`", d))))
        .transpose()
}

fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map_or(false, |code| code == constraint)
}

pub struct PgStore {
    pg: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let pg = PgPoolOptions::new().max_connections(10).connect(url).await?;
        let store = Self { pg };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pg).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn insert_user(&self, user: &UserAccount) -> Result<(), Error> {
        let res = sqlx::query("INSERT INTO users VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(user.id)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pg)
            .await;

        match res {
            Ok(done) if done.rows_affected() >= 1 => Ok(()),
            Ok(_) => Err(Error::storage("Could not save user to database!")),
            Err(err) if violates(&err, UNIQUE_VIOLATION) => Err(email_taken()),
            Err(err) => Err(Error::from(err)),
        }
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserAccount>, Error> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pg)
            .await?
            .map(UserAccount::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, Error> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE lower(email) = lower($1) LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pg)
            .await?
            .map(UserAccount::try_from)
            .transpose()
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Option<UserAccount>, Error> {
        let res = sqlx::query_as::<_, UserRow>(
            "UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                updated_at = $5
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(&changes.email)
        .bind(Utc::now())
        .fetch_optional(&self.pg)
        .await;

        match res {
            Ok(row) => row.map(UserAccount::try_from).transpose(),
            Err(err) if violates(&err, UNIQUE_VIOLATION) => Err(email_taken()),
            Err(err) => Err(Error::from(err)),
        }
    }
}

#[async_trait]
impl RegistrationStore for PgStore {
    async fn insert_registration(&self, r: &Registration) -> Result<(), Error> {
        let res = sqlx::query(
            "INSERT INTO registrations VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(r.id)
        .bind(r.owner)
        .bind(&r.student_id)
        .bind(&r.first_name)
        .bind(&r.last_name)
        .bind(&r.email)
        .bind(&r.phone)
        .bind(&r.program)
        .bind(r.intake_year)
        .bind(r.department.map(|d| d.as_str()))
        .bind(r.status.as_str())
        .bind(r.created_at)
        .bind(r.updated_at)
        .execute(&self.pg)
        .await;

        match res {
            Ok(done) if done.rows_affected() >= 1 => Ok(()),
            Ok(_) => Err(Error::storage("Could not save registration to database!")),
            Err(err) if violates(&err, FOREIGN_KEY_VIOLATION) => Err(unknown_owner()),
            Err(err) => Err(Error::from(err)),
        }
    }

    async fn find_registration(&self, id: Uuid) -> Result<Option<Registration>, Error> {
        sqlx::query_as::<_, RegistrationRow>("SELECT * FROM registrations WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pg)
            .await?
            .map(Registration::try_from)
            .transpose()
    }

    async fn list_registrations(&self, owner: Option<Uuid>) -> Result<Vec<Registration>, Error> {
        let rows = sqlx::query_as::<_, RegistrationRow>(
            "SELECT * FROM registrations
             WHERE $1::uuid IS NULL OR owner = $1
             ORDER BY created_at DESC",
        )
        .bind(owner)
        .fetch_all(&self.pg)
        .await?;

        rows.into_iter().map(Registration::try_from).collect()
    }

    async fn save_registration(&self, r: &Registration) -> Result<(), Error> {
        let res = sqlx::query(
            "UPDATE registrations SET
                student_id = $2, first_name = $3, last_name = $4, email = $5, phone = $6,
                program = $7, intake_year = $8, department = $9, status = $10, updated_at = $11
             WHERE id = $1",
        )
        .bind(r.id)
        .bind(&r.student_id)
        .bind(&r.first_name)
        .bind(&r.last_name)
        .bind(&r.email)
        .bind(&r.phone)
        .bind(&r.program)
        .bind(r.intake_year)
        .bind(r.department.map(|d| d.as_str()))
        .bind(r.status.as_str())
        .bind(r.updated_at)
        .execute(&self.pg)
        .await?;

        if res.rows_affected() < 1 {
            return Err(Error::not_found("Not found"));
        }
        Ok(())
    }

    async fn count_by_department(&self) -> Result<Vec<(Option<Department>, u64)>, Error> {
        let rows: Vec<(Option<String>, i64)> = sqlx::query_as(
            "SELECT department, COUNT(*) FROM registrations GROUP BY department",
        )
        .fetch_all(&self.pg)
        .await?;

        rows.into_iter()
            .map(|(department, count)| Ok((parse_department(department)?, count.max(0) as u64)))
            .collect()
    }
}
