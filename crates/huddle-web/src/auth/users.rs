use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    /// Always stored lowercase.
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
}

/// In-memory user accounts, keyed by lowercase email.
#[derive(Default)]
pub struct UserDirectory {
    by_email: DashMap<String, UserRecord>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account with a fresh id. Fails if the email is taken.
    pub fn create(
        &self,
        email: &str,
        name: &str,
        password_hash: String,
        role: Role,
    ) -> Result<UserRecord, AppError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::BadRequest("A valid email is required".to_string()));
        }
        let name = match name.trim() {
            "" => email.split('@').next().unwrap_or_default().to_string(),
            trimmed => trimmed.to_string(),
        };

        match self.by_email.entry(email.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!("User {email} already exists"))),
            Entry::Vacant(slot) => {
                let record = UserRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    email,
                    name,
                    password_hash,
                    role,
                };
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    pub fn find_by_email(&self, email: &str) -> Option<UserRecord> {
        self.by_email
            .get(&normalize_email(email))
            .map(|r| r.value().clone())
    }

    pub fn find_by_id(&self, id: &str) -> Option<UserRecord> {
        self.by_email
            .iter()
            .find(|r| r.value().id == id)
            .map(|r| r.value().clone())
    }

    /// Display name for `id`, falling back to the id itself.
    pub fn display_name(&self, id: &str) -> String {
        self.find_by_id(id)
            .map(|u| u.name)
            .unwrap_or_else(|| id.to_string())
    }

    /// All accounts ordered by email.
    pub fn list(&self) -> Vec<UserRecord> {
        let mut users: Vec<UserRecord> = self.by_email.iter().map(|r| r.value().clone()).collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users
    }

    pub fn len(&self) -> usize {
        self.by_email.len()
    }
}
