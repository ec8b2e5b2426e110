use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{CollapsedUser, ContainerRecord, ListKind, RegisterUserPayload, UserRecord};
use crate::policy::validate_name;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// User accounts and the people-suggestion queue. Credentials are the
/// `AuthProvider`'s business and are never stored here.
pub struct UserDirectory {
    db: Arc<Database>,
}

impl UserDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Creates the account together with its three containers, one per list
    /// kind. Container ids are handed back inside the record so clients can
    /// address them directly.
    pub fn register_user(&self, payload: &RegisterUserPayload) -> AppResult<UserRecord> {
        let username = validate_name(&payload.username)?;
        let name = validate_name(&payload.name)?;
        let email = validate_name(&payload.email)?;
        if self.db.get_user(&username)?.is_some() {
            return Err(AppError::Validation(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        let grocery = ContainerRecord::new(&username, ListKind::Grocery);
        let todo = ContainerRecord::new(&username, ListKind::Todo);
        let wishlist = ContainerRecord::new(&username, ListKind::Wishlist);

        let user = UserRecord {
            username,
            name,
            email,
            grocery_container_id: grocery.id.clone(),
            todo_container_id: todo.id.clone(),
            wishlist_container_id: wishlist.id.clone(),
            relevant_users: VecDeque::new(),
            created_at: Utc::now(),
        };

        self.db.insert_user(&user)?;
        self.db.insert_container(&grocery)?;
        self.db.insert_container(&todo)?;
        self.db.insert_container(&wishlist)?;
        debug!(username = %user.username, "registered user");
        Ok(user)
    }

    /// Resolves a username to its collapsed view and records the contact in
    /// the requester's suggestion queue.
    pub fn lookup_user(&self, requester: &str, requested: &str) -> AppResult<CollapsedUser> {
        let target = self
            .db
            .get_user(requested)?
            .ok_or_else(|| AppError::NotFound(format!("No user found with username: {}", requested)))?;

        if requester != target.username {
            if let Some(mut me) = self.db.get_user(requester)? {
                me.record_contact(&target.username);
                self.db.save_user(&me)?;
            }
        }

        Ok(CollapsedUser {
            username: target.username,
            name: target.name,
        })
    }

    /// Most-recently-contacted usernames, newest first.
    pub fn suggested_people(&self, username: &str) -> AppResult<Vec<String>> {
        let user = self
            .db
            .get_user(username)?
            .ok_or_else(|| AppError::NotFound(format!("No user found with username: {}", username)))?;
        Ok(user.relevant_users.into_iter().collect())
    }
}
