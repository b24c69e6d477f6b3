use crate::application_port::*;
use crate::domain_model::*;
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use serde::Deserialize;
use std::collections::HashMap;

/// Hash checked when the email is unknown, so both failure paths cost the same.
const DECOY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$ZGV2c2FsdGRldnNhbHQxNg$K6PMkIkHEH8nDIYX1oSVCP889KBhRLWQtUhOVzy3TAo";

#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub email: String,
    /// Defaults to an id derived from the email.
    pub user_id: Option<UserId>,
    pub role: String,
    /// Argon2 PHC string.
    pub password_hash: String,
}

struct Account {
    principal: Principal,
    password_hash: String,
}

/// Settings-backed user directory for deployments whose user records live
/// elsewhere and only a handful of operator accounts are needed.
pub struct StaticUserDirectory {
    by_email: HashMap<String, Account>,
    by_id: HashMap<UserId, Principal>,
}

impl StaticUserDirectory {
    pub fn new(entries: Vec<UserEntry>) -> Result<Self, AuthError> {
        let mut by_email = HashMap::new();
        let mut by_id = HashMap::new();
        for entry in entries {
            PasswordHash::new(&entry.password_hash).map_err(|e| {
                AuthError::InternalError(format!("invalid PHC hash for {}: {}", entry.email, e))
            })?;
            let email = normalize(&entry.email);
            let principal = Principal {
                user_id: entry.user_id.unwrap_or_else(|| UserId::derived_from(&email)),
                role: Role::new(entry.role),
            };
            by_id.insert(principal.user_id, principal.clone());
            by_email.insert(
                email,
                Account {
                    principal,
                    password_hash: entry.password_hash,
                },
            );
        }
        Ok(Self { by_email, by_id })
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

fn verify_password(password: &str, password_hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| AuthError::InternalError(format!("invalid PHC hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::InternalError(format!("verify error: {}", e))),
    }
}

#[async_trait::async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        match self.by_email.get(&normalize(email)) {
            Some(account) => {
                if verify_password(password, &account.password_hash)? {
                    Ok(account.principal.clone())
                } else {
                    Err(AuthError::InvalidCredentials)
                }
            }
            None => {
                let _ = verify_password(password, DECOY_HASH);
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    async fn find(&self, user_id: UserId) -> Result<Option<Principal>, AuthError> {
        Ok(self.by_id.get(&user_id).cloned())
    }
}
