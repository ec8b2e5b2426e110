use crate::db::Database;
use crate::errors::{AppError, AppResult, AuthError};
use crate::models::Subject;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_ITEM_QUANTITY: u32 = 10_000;

/// Credential issuance and verification live outside this crate; the gate
/// only needs a verified username back from a bearer token.
pub trait AuthProvider: Send + Sync {
    fn verify(&self, token: &str) -> Result<Subject, AuthError>;
}

/// Token table for embedders and tests. Production deployments plug in their
/// own verifier (JWT, session store, ...).
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    tokens: Mutex<HashMap<String, String>>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, token: &str, username: &str) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(token.to_string(), username.to_string());
        }
    }

    pub fn revoke(&self, token: &str) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.remove(token);
        }
    }
}

impl AuthProvider for StaticTokenProvider {
    fn verify(&self, token: &str) -> Result<Subject, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }
        let tokens = self.tokens.lock().map_err(|_| AuthError::InvalidToken)?;
        tokens
            .get(token)
            .map(|username| Subject {
                username: username.clone(),
            })
            .ok_or(AuthError::InvalidToken)
    }
}

/// The authorization gate. Every mutating operation runs one of the two
/// predicates, selected by the scope the request declares; a mismatch with
/// the stored scope is caught later, against the canonical record.
pub struct AccessPolicy {
    db: Arc<Database>,
    auth: Arc<dyn AuthProvider>,
}

impl AccessPolicy {
    pub fn new(db: Arc<Database>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { db, auth }
    }

    pub fn resolve_subject(&self, token: &str) -> AppResult<Subject> {
        Ok(self.auth.verify(token)?)
    }

    /// Owner check: the subject must own the named container.
    pub fn authorize_private(&self, subject: &Subject, container_id: &str) -> AppResult<()> {
        let container = self
            .db
            .get_container(container_id)?
            .ok_or_else(|| AppError::NotFound(format!("Could not find the container with id: {}", container_id)))?;
        if container.owner_username != subject.username {
            return Err(AppError::Forbidden(
                "Not an authorized subject to request this asset".to_string(),
            ));
        }
        Ok(())
    }

    /// Membership check against the canonical list, via its members-only
    /// projection.
    pub fn authorize_restricted(&self, subject: &Subject, list_id: &str) -> AppResult<()> {
        let members = self
            .db
            .get_list_members(list_id)?
            .ok_or_else(|| AppError::NotFound(format!("No list was found that matches id: {}", list_id)))?;
        if !members.contains(&subject.username) {
            return Err(AppError::Forbidden(
                "Not an authorized subject to request this asset".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn validate_name(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Argument cannot be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Argument exceeds the {} character limit",
            MAX_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_quantity(quantity: u32) -> AppResult<()> {
    if quantity > MAX_ITEM_QUANTITY {
        return Err(AppError::Validation(format!(
            "Quantity cannot be greater than {}",
            MAX_ITEM_QUANTITY
        )));
    }
    Ok(())
}

pub fn validate_usernames(people: &[String]) -> AppResult<()> {
    if people.is_empty() {
        return Err(AppError::Validation("No usernames given".to_string()));
    }
    for person in people {
        validate_name(person)?;
    }
    Ok(())
}
