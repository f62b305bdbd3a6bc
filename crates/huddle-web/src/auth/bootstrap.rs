//! One-time administrator seed.
//!
//! Runs at startup, before the router exists. The login handler has no
//! knowledge of which account was seeded.

use crate::config::BootstrapConfig;

use super::users::{Role, UserDirectory, UserRecord};

/// Installs the configured administrator if it is not already present.
pub fn seed_admin(users: &UserDirectory, bootstrap: &BootstrapConfig) -> Option<UserRecord> {
    if !bootstrap.is_configured() {
        return None;
    }
    if users.find_by_email(&bootstrap.email).is_some() {
        tracing::debug!("Bootstrap administrator {} already present", bootstrap.email);
        return None;
    }

    match users.create(
        &bootstrap.email,
        &bootstrap.name,
        bootstrap.password_hash.clone(),
        Role::Admin,
    ) {
        Ok(admin) => {
            tracing::info!("Seeded administrator account {}", admin.email);
            Some(admin)
        }
        Err(e) => {
            tracing::error!("Failed to seed administrator {}: {:?}", bootstrap.email, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bootstrap() -> BootstrapConfig {
        BootstrapConfig {
            email: "root@example.com".to_string(),
            name: "Root".to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
        }
    }

    #[test]
    fn seeds_admin_once() {
        let users = UserDirectory::new();
        let admin = seed_admin(&users, &bootstrap()).unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(seed_admin(&users, &bootstrap()).is_none());
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn unconfigured_bootstrap_is_skipped() {
        let users = UserDirectory::new();
        assert!(seed_admin(&users, &BootstrapConfig::default()).is_none());
        assert_eq!(users.len(), 0);
    }
}
