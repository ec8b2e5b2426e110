use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{ListRecord, ListRef, ListScope};
use std::sync::Arc;
use tracing::debug;

/// Keeps canonical lists and their container projections consistent across
/// scope, membership, and name changes. Every transition is an ordered
/// sequence of independent writes; there is no cross-collection transaction,
/// so each removal is built to be a no-op on replay.
pub struct SyncEngine {
    db: Arc<Database>,
}

impl SyncEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// New list plus its first reference in the owning container. Two writes,
    /// list first: a crash in between leaves a list without a reference,
    /// which the owner's next refresh can rebuild.
    pub fn create_list(
        &self,
        container_id: &str,
        name: &str,
        requested_scope: Option<ListScope>,
    ) -> AppResult<ListRef> {
        let container = self
            .db
            .get_container(container_id)?
            .ok_or_else(|| AppError::NotFound("Not a valid container id given".to_string()))?;

        let mut list = ListRecord::new(name, container.kind, container_id, &container.owner_username);
        if let Some(scope) = requested_scope {
            list.scope = scope;
        }
        let entry = list.build_ref();

        self.db.insert_list(&list)?;
        self.db.add_ref(container_id, &entry)?;
        debug!(list_id = %list.id, scope = list.scope.as_str(), "created list");
        Ok(entry)
    }

    /// Grant access to a restricted list: extend membership, then fan the
    /// reference out to every granted user's container of the list's kind.
    /// Granting the same usernames twice is a no-op.
    pub fn grant_access(&self, container_id: &str, list_id: &str, people: &[String]) -> AppResult<()> {
        let mut list = self.load_owned(container_id, list_id)?;
        if list.scope != ListScope::Restricted {
            return Err(AppError::ScopeMismatch(
                "List scope doesn't match your authorization".to_string(),
            ));
        }

        list.add_members(people);
        let entry = list.build_ref();
        debug!(list_id = %list.id, granted = people.len(), "fanning out list reference");
        self.db.bulk_add_ref(people, list.kind, &entry)?;
        self.db.save_list(&list)?;
        Ok(())
    }

    /// Revoke access: pull the reference from every revoked user's container,
    /// then shrink membership. The owner is never revocable, which keeps the
    /// member set non-empty while the list stays restricted.
    pub fn revoke_access(&self, container_id: &str, list_id: &str, people: &[String]) -> AppResult<()> {
        let mut list = self.load_owned(container_id, list_id)?;
        if list.scope != ListScope::Restricted {
            return Err(AppError::ScopeMismatch(
                "List scope doesn't match your authorization".to_string(),
            ));
        }

        let container = self
            .db
            .get_container(container_id)?
            .ok_or_else(|| AppError::NotFound(format!("Could not find the container with id: {}", container_id)))?;
        let revoked: Vec<String> = people
            .iter()
            .filter(|person| **person != container.owner_username)
            .cloned()
            .collect();

        let entry = list.build_ref();
        debug!(list_id = %list.id, revoked = revoked.len(), "pulling list reference");
        self.db.bulk_remove_ref(&revoked, list.kind, &entry)?;
        list.remove_members(&revoked);
        self.db.save_list(&list)?;
        Ok(())
    }

    /// Rename and/or scope change. A scope change is destructive toward
    /// non-owner references: every current member except the owner loses
    /// theirs, and membership collapses back to the owner alone.
    pub fn update_list(
        &self,
        container_id: &str,
        list_id: &str,
        name: &str,
        scope: ListScope,
    ) -> AppResult<ListRecord> {
        let mut list = self.load_owned(container_id, list_id)?;
        let container = self
            .db
            .get_container(container_id)?
            .ok_or_else(|| AppError::NotFound(format!("Could not find the container with id: {}", container_id)))?;

        let scope_changed = list.scope != scope;
        if scope_changed && list.members.len() > 1 {
            // The filter is built from the state read above; a same-instant
            // rename can leave a reference behind (documented race).
            let stale = list.build_ref();
            let members: Vec<String> = list.members.iter().cloned().collect();
            debug!(list_id = %list.id, members = members.len(), "unsharing on scope change");
            self.db.bulk_remove_ref(&members, list.kind, &stale)?;
        }
        if scope_changed {
            list.members.clear();
            list.members.insert(container.owner_username.clone());
            list.scope = scope;
        }
        list.name = name.trim().to_string();
        self.db.save_list(&list)?;

        // References are never edited in place: drop the owner's old copy and
        // insert a fresh one carrying the new scope and name.
        self.db.remove_ref(container_id, list_id)?;
        self.db.add_ref(container_id, &list.build_ref())?;
        Ok(list)
    }

    /// Owner-initiated delete of a non-restricted list.
    pub fn delete_owned(&self, container_id: &str, list_id: &str, declared: ListScope) -> AppResult<()> {
        let list = self.load_owned(container_id, list_id)?;
        if list.scope != declared {
            return Err(AppError::ScopeMismatch(
                "List scope doesn't match your authorization".to_string(),
            ));
        }

        self.db.remove_ref(container_id, list_id)?;
        self.db.delete_list(list_id)?;
        debug!(list_id, "deleted list");
        Ok(())
    }

    /// Restricted delete is two different operations depending on who calls:
    /// the owner tears down every reference and the list itself; anyone else
    /// merely leaves, and the list survives for the remaining members.
    pub fn delete_restricted(&self, container_id: &str, list_id: &str, declared: ListScope) -> AppResult<()> {
        let mut list = self
            .db
            .get_list(list_id)?
            .ok_or_else(|| AppError::NotFound(format!("No list was found that matches id: {}", list_id)))?;
        if list.scope != declared {
            return Err(AppError::ScopeMismatch(
                "List scope doesn't match your authorization".to_string(),
            ));
        }

        if list.container_id != container_id {
            let container = self
                .db
                .get_container(container_id)?
                .ok_or_else(|| AppError::NotFound(format!("Could not find the container with id: {}", container_id)))?;
            debug!(list_id, username = %container.owner_username, "member leaving restricted list");
            self.db.remove_ref(container_id, list_id)?;
            list.remove_members(std::iter::once(&container.owner_username));
            self.db.save_list(&list)?;
            return Ok(());
        }

        if list.members.len() > 1 {
            let members: Vec<String> = list.members.iter().cloned().collect();
            debug!(list_id, members = members.len(), "tearing down shared references");
            self.db.bulk_remove_ref(&members, list.kind, &list.build_ref())?;
        } else {
            self.db.remove_ref(container_id, list_id)?;
        }
        self.db.delete_list(list_id)?;
        Ok(())
    }

    /// Guard shared by the mutating transitions: the list must exist and must
    /// belong to the named container.
    fn load_owned(&self, container_id: &str, list_id: &str) -> AppResult<ListRecord> {
        let list = self
            .db
            .get_list(list_id)?
            .ok_or_else(|| AppError::NotFound(format!("No list was found that matches id: {}", list_id)))?;
        if list.container_id != container_id {
            return Err(AppError::Forbidden(format!(
                "No list was found that matches container id: {}",
                container_id
            )));
        }
        Ok(list)
    }
}
