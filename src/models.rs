use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::err::Error;

pub const DEFAULT_PROGRAM: &str = "Business Intelligence with Technology";
pub const UNSPECIFIED_DEPARTMENT: &str = "unspecified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(Error::storage(format!("unknown role `{}`", other))),
        }
    }
}

/// A persisted user account. Holds the password hash, so it never leaves the
/// server as-is; see [`PublicUser`].
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserAccount> for PublicUser {
    fn from(user: &UserAccount) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Profile edits for `PUT /api/users/me`. Empty strings count as absent.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl ProfileChanges {
    pub fn normalized(self) -> Self {
        Self {
            first_name: non_empty(self.first_name),
            last_name: non_empty(self.last_name),
            email: non_empty(self.email).map(|e| normalize_email(&e)),
        }
    }

    pub fn apply(&self, user: &mut UserAccount) {
        if let Some(first_name) = &self.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            user.last_name = last_name.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Department {
    Accountancy,
    #[serde(rename = "ICT & Mathematics")]
    IctAndMathematics,
    #[serde(rename = "Business Administration")]
    BusinessAdministration,
    #[serde(rename = "Procurement & Logistic")]
    ProcurementAndLogistic,
    Marketing,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Department::Accountancy,
        Department::IctAndMathematics,
        Department::BusinessAdministration,
        Department::ProcurementAndLogistic,
        Department::Marketing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Accountancy => "Accountancy",
            Department::IctAndMathematics => "ICT & Mathematics",
            Department::BusinessAdministration => "Business Administration",
            Department::ProcurementAndLogistic => "Procurement & Logistic",
            Department::Marketing => "Marketing",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Department {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Department::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| Error::invalid(format!("Unknown department `{}`", s)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RegistrationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RegistrationStatus::Pending),
            "confirmed" => Ok(RegistrationStatus::Confirmed),
            "cancelled" => Ok(RegistrationStatus::Cancelled),
            other => Err(Error::storage(format!("unknown status `{}`", other))),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: Uuid,
    #[serde(rename = "user")]
    pub owner: Uuid,
    pub student_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub program: String,
    pub intake_year: Option<i32>,
    pub department: Option<Department>,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/registrations`. Anything not listed here (`status`,
/// `user`, ...) is dropped during deserialization.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRegistration {
    pub student_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub program: Option<String>,
    pub intake_year: Option<i32>,
    pub department: Option<Department>,
}

impl NewRegistration {
    pub fn into_registration(self, owner: Uuid) -> Result<Registration, Error> {
        let first_name = non_empty(self.first_name);
        let last_name = non_empty(self.last_name);
        let email = non_empty(self.email);
        let (first_name, last_name, email) = match (first_name, last_name, email) {
            (Some(f), Some(l), Some(e)) => (f, l, normalize_email(&e)),
            _ => return Err(Error::invalid("Missing required fields")),
        };

        let now = Utc::now();
        Ok(Registration {
            id: Uuid::new_v4(),
            owner,
            student_id: non_empty(self.student_id),
            first_name,
            last_name,
            email,
            phone: non_empty(self.phone),
            program: non_empty(self.program).unwrap_or_else(|| DEFAULT_PROGRAM.to_string()),
            intake_year: self.intake_year,
            department: self.department,
            status: RegistrationStatus::default(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Field mask for `PUT /api/registrations/:id`. Only the allow-listed fields
/// exist here; a `None` leaves the stored value untouched.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPatch {
    pub student_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub program: Option<String>,
    pub intake_year: Option<i32>,
    pub department: Option<Department>,
}

impl RegistrationPatch {
    /// Names and email may be changed but never blanked.
    pub fn apply(self, registration: &mut Registration) -> Result<(), Error> {
        let blanked = [&self.first_name, &self.last_name, &self.email]
            .into_iter()
            .any(|field| matches!(field, Some(value) if value.trim().is_empty()));
        if blanked {
            return Err(Error::invalid("Missing required fields"));
        }

        if let Some(student_id) = self.student_id {
            registration.student_id = Some(student_id.trim().to_string());
        }
        if let Some(first_name) = self.first_name {
            registration.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = self.last_name {
            registration.last_name = last_name.trim().to_string();
        }
        if let Some(email) = self.email {
            registration.email = normalize_email(&email);
        }
        if let Some(phone) = self.phone {
            registration.phone = Some(phone.trim().to_string());
        }
        if let Some(program) = self.program {
            registration.program = program.trim().to_string();
        }
        if let Some(intake_year) = self.intake_year {
            registration.intake_year = Some(intake_year);
        }
        if let Some(department) = self.department {
            registration.department = Some(department);
        }
        registration.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentCount {
    pub department: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: u64,
    pub by_department: Vec<DepartmentCount>,
}

impl Stats {
    pub fn from_groups(groups: Vec<(Option<Department>, u64)>) -> Self {
        let total: u64 = groups.iter().map(|(_, count)| count).sum();
        let mut by_department: Vec<DepartmentCount> = groups
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(department, count)| DepartmentCount {
                department: department
                    .map(|d| d.as_str())
                    .unwrap_or(UNSPECIFIED_DEPARTMENT)
                    .to_string(),
                count,
            })
            .collect();
        by_department.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.department.cmp(&b.department))
        });
        Self {
            total,
            by_department,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Registration {
        let draft: NewRegistration = serde_json::from_value(json!({
            "firstName": "Bob",
            "lastName": "Smith",
            "email": " Bob@Example.com ",
            "phone": "123456",
            "department": "Accountancy"
        }))
        .unwrap();
        draft.into_registration(Uuid::new_v4()).unwrap()
    }

    #[test]
    fn new_registration_defaults() {
        let reg = sample();
        assert_eq!(reg.status, RegistrationStatus::Pending);
        assert_eq!(reg.program, DEFAULT_PROGRAM);
        assert_eq!(reg.email, "bob@example.com");
        assert_eq!(reg.department, Some(Department::Accountancy));
    }

    #[test]
    fn new_registration_requires_names_and_email() {
        let draft: NewRegistration =
            serde_json::from_value(json!({ "firstName": "Bob", "lastName": "  " })).unwrap();
        let err = draft.into_registration(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload { .. }));
    }

    #[test]
    fn client_cannot_inject_status_or_owner() {
        let owner = Uuid::new_v4();
        let draft: NewRegistration = serde_json::from_value(json!({
            "firstName": "Bob",
            "lastName": "Smith",
            "email": "bob@example.com",
            "status": "confirmed",
            "user": Uuid::new_v4()
        }))
        .unwrap();
        let reg = draft.into_registration(owner).unwrap();
        assert_eq!(reg.status, RegistrationStatus::Pending);
        assert_eq!(reg.owner, owner);

        let patch: RegistrationPatch =
            serde_json::from_value(json!({ "status": "cancelled", "user": Uuid::new_v4() }))
                .unwrap();
        let mut patched = reg.clone();
        patch.apply(&mut patched).unwrap();
        assert_eq!(patched.status, RegistrationStatus::Pending);
        assert_eq!(patched.owner, owner);
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut reg = sample();
        let before = reg.clone();
        let patch: RegistrationPatch = serde_json::from_value(json!({ "phone": "999" })).unwrap();
        patch.apply(&mut reg).unwrap();

        assert_eq!(reg.phone.as_deref(), Some("999"));
        assert_eq!(reg.first_name, before.first_name);
        assert_eq!(reg.last_name, before.last_name);
        assert_eq!(reg.department, before.department);
        assert_eq!(reg.email, before.email);
    }

    #[test]
    fn patch_cannot_blank_names_or_email() {
        let mut reg = sample();
        let before = reg.clone();
        for body in [
            json!({ "firstName": "" }),
            json!({ "lastName": "   " }),
            json!({ "email": " ", "phone": "1" }),
        ] {
            let patch: RegistrationPatch = serde_json::from_value(body).unwrap();
            let err = patch.apply(&mut reg).unwrap_err();
            assert!(matches!(err, Error::InvalidPayload { .. }));
        }
        assert_eq!(reg, before);
    }

    #[test]
    fn department_uses_display_names() {
        let d: Department = serde_json::from_value(json!("ICT & Mathematics")).unwrap();
        assert_eq!(d, Department::IctAndMathematics);
        assert_eq!("Procurement & Logistic".parse::<Department>().unwrap(), Department::ProcurementAndLogistic);
        assert!("Physics".parse::<Department>().is_err());
        assert!(serde_json::from_value::<Department>(json!("Physics")).is_err());
    }

    #[test]
    fn stats_bucket_unspecified_and_sort() {
        let stats = Stats::from_groups(vec![
            (Some(Department::Marketing), 1),
            (None, 2),
            (Some(Department::Accountancy), 2),
        ]);
        assert_eq!(stats.total, 5);
        let labels: Vec<&str> = stats
            .by_department
            .iter()
            .map(|d| d.department.as_str())
            .collect();
        assert_eq!(labels, vec!["Accountancy", UNSPECIFIED_DEPARTMENT, "Marketing"]);
    }

    #[test]
    fn public_user_has_no_hash() {
        let now = Utc::now();
        let account = UserAccount {
            id: Uuid::new_v4(),
            first_name: "Sam".to_string(),
            last_name: "Lee".to_string(),
            email: "sam@example.com".to_string(),
            password_hash: "$pbkdf2-sha256$secret".to_string(),
            role: Role::Student,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&PublicUser::from(&account)).unwrap();
        assert!(!json.contains("pbkdf2"));
        assert!(json.contains("\"firstName\":\"Sam\""));
        assert!(json.contains("\"role\":\"student\""));
    }

    #[test]
    fn profile_changes_ignore_empty_values() {
        let changes: ProfileChanges =
            serde_json::from_value(json!({ "firstName": "", "email": " SAM@x.io " })).unwrap();
        let changes = changes.normalized();
        assert!(changes.first_name.is_none());
        assert_eq!(changes.email.as_deref(), Some("sam@x.io"));
    }
}
