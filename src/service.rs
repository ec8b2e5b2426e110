use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{
    CheckItemsPayload, ContainerRecord, CreateItemPayload, CreateListPayload, DeleteItemPayload,
    DeleteListPayload, GetListPayload, ListItem, ListRecord, ListRef, ListScope, PeoplePayload,
    ReorderListsPayload, ResetListPayload, Subject, UpdateItemPayload, UpdateListPayload,
};
use crate::policy::{validate_name, validate_quantity, validate_usernames, AccessPolicy, AuthProvider};
use crate::sync::SyncEngine;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Public facade: one method per use case. Each call validates its input,
/// resolves and authorizes the subject along the path the declared scope
/// selects, then runs the store and sync operations in their fixed order.
pub struct ListService {
    db: Arc<Database>,
    policy: AccessPolicy,
    sync: SyncEngine,
}

impl ListService {
    pub fn new(db: Arc<Database>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            policy: AccessPolicy::new(db.clone(), auth),
            sync: SyncEngine::new(db.clone()),
            db,
        }
    }

    pub fn create_list(&self, token: &str, payload: &CreateListPayload) -> AppResult<ListRef> {
        let name = validate_name(&payload.name)?;
        let subject = self.policy.resolve_subject(token)?;
        self.policy.authorize_private(&subject, &payload.container_id)?;
        self.sync.create_list(&payload.container_id, &name, payload.scope)
    }

    pub fn get_all_lists(&self, token: &str, container_id: &str) -> AppResult<ContainerRecord> {
        let subject = self.policy.resolve_subject(token)?;
        self.policy.authorize_private(&subject, container_id)?;
        self.db
            .get_container(container_id)?
            .ok_or_else(|| AppError::NotFound(format!("Could not find the container with id: {}", container_id)))
    }

    pub fn get_list(&self, token: &str, payload: &GetListPayload) -> AppResult<ListRecord> {
        self.authorize_scope(token, payload.scope, &payload.container_id, &payload.list_id)?;
        self.load_list_checked(&payload.container_id, &payload.list_id, payload.scope)
    }

    pub fn create_item(&self, token: &str, payload: &CreateItemPayload) -> AppResult<ListItem> {
        let name = validate_name(&payload.name)?;
        validate_quantity(payload.quantity)?;
        self.authorize_scope(token, payload.scope, &payload.container_id, &payload.list_id)?;

        let mut list = self.load_list_checked(&payload.container_id, &payload.list_id, payload.scope)?;
        let item = ListItem::new(
            &name,
            &payload.category,
            payload.quantity,
            payload.priority,
            &payload.added_by,
        );
        list.add_item(item.clone());
        self.db.save_list(&list)?;
        Ok(item)
    }

    /// Replace-by-previous-id: the old item is dropped and the updated one
    /// appended under a fresh id. Last write wins.
    pub fn update_item(&self, token: &str, payload: &UpdateItemPayload) -> AppResult<ListItem> {
        let name = validate_name(&payload.name)?;
        validate_quantity(payload.quantity)?;
        self.authorize_scope(token, payload.scope, &payload.container_id, &payload.list_id)?;

        let mut list = self.load_list_checked(&payload.container_id, &payload.list_id, payload.scope)?;
        list.delete_item_by_id(&payload.previous_item_id);
        let mut item = ListItem::new(
            &name,
            &payload.category,
            payload.quantity,
            payload.priority,
            &payload.added_by,
        );
        item.checked = payload.checked;
        list.add_item(item.clone());
        self.db.save_list(&list)?;
        Ok(item)
    }

    pub fn delete_item(&self, token: &str, payload: &DeleteItemPayload) -> AppResult<()> {
        self.authorize_scope(token, payload.scope, &payload.container_id, &payload.list_id)?;
        let mut list = self.load_list_checked(&payload.container_id, &payload.list_id, payload.scope)?;
        list.delete_item_by_id(&payload.item_id);
        self.db.save_list(&list)
    }

    /// Bulk check/uncheck: each listed item's flag flips independently. An
    /// empty id set succeeds without touching the store.
    pub fn check_items(&self, token: &str, payload: &CheckItemsPayload) -> AppResult<()> {
        self.authorize_scope(token, payload.scope, &payload.container_id, &payload.list_id)?;
        if payload.item_ids.is_empty() {
            return Ok(());
        }
        let mut list = self.load_list_checked(&payload.container_id, &payload.list_id, payload.scope)?;
        list.toggle_checked(&payload.item_ids);
        self.db.save_list(&list)
    }

    pub fn reset_list(&self, token: &str, payload: &ResetListPayload) -> AppResult<ListRecord> {
        self.authorize_scope(token, payload.scope, &payload.container_id, &payload.list_id)?;
        let mut list = self.load_list_checked(&payload.container_id, &payload.list_id, payload.scope)?;
        list.reset_items();
        self.db.save_list(&list)?;
        Ok(list)
    }

    /// Rename and/or scope change; owner only.
    pub fn update_list(&self, token: &str, payload: &UpdateListPayload) -> AppResult<ListRecord> {
        let name = validate_name(&payload.name)?;
        let subject = self.policy.resolve_subject(token)?;
        self.policy.authorize_private(&subject, &payload.container_id)?;
        self.sync
            .update_list(&payload.container_id, &payload.list_id, &name, payload.scope)
    }

    pub fn add_people(&self, token: &str, payload: &PeoplePayload) -> AppResult<()> {
        validate_usernames(&payload.people)?;
        let subject = self.policy.resolve_subject(token)?;
        self.policy.authorize_restricted(&subject, &payload.list_id)?;
        self.sync
            .grant_access(&payload.container_id, &payload.list_id, &payload.people)
    }

    pub fn remove_people(&self, token: &str, payload: &PeoplePayload) -> AppResult<()> {
        validate_usernames(&payload.people)?;
        let subject = self.policy.resolve_subject(token)?;
        self.policy.authorize_restricted(&subject, &payload.list_id)?;
        self.sync
            .revoke_access(&payload.container_id, &payload.list_id, &payload.people)
    }

    pub fn get_people(&self, token: &str, container_id: &str, list_id: &str) -> AppResult<BTreeSet<String>> {
        let subject = self.policy.resolve_subject(token)?;
        self.policy.authorize_restricted(&subject, list_id)?;
        let list = self.load_list_checked(container_id, list_id, ListScope::Restricted)?;
        Ok(list.members)
    }

    /// Delete routes on the declared scope: restricted deletes go through the
    /// owner-or-leave split, everything else is a plain owner delete.
    pub fn delete_list(&self, token: &str, payload: &DeleteListPayload) -> AppResult<()> {
        let subject = self.policy.resolve_subject(token)?;
        match payload.scope {
            ListScope::Restricted => {
                self.policy.authorize_restricted(&subject, &payload.list_id)?;
                self.sync
                    .delete_restricted(&payload.container_id, &payload.list_id, payload.scope)
            }
            _ => {
                self.policy.authorize_private(&subject, &payload.container_id)?;
                self.sync
                    .delete_owned(&payload.container_id, &payload.list_id, payload.scope)
            }
        }
    }

    pub fn reorder_lists(&self, token: &str, payload: &ReorderListsPayload) -> AppResult<()> {
        let subject = self.policy.resolve_subject(token)?;
        self.policy.authorize_private(&subject, &payload.container_id)?;
        self.db.reorder_refs(&payload.container_id, &payload.list_ids)
    }

    /// Routes authorization along the declared scope. Public requests carry
    /// no subject at all; the id pair is the capability.
    fn authorize_scope(
        &self,
        token: &str,
        scope: ListScope,
        container_id: &str,
        list_id: &str,
    ) -> AppResult<Option<Subject>> {
        match scope {
            ListScope::Private => {
                let subject = self.policy.resolve_subject(token)?;
                self.policy.authorize_private(&subject, container_id)?;
                Ok(Some(subject))
            }
            ListScope::Restricted => {
                let subject = self.policy.resolve_subject(token)?;
                self.policy.authorize_restricted(&subject, list_id)?;
                Ok(Some(subject))
            }
            ListScope::Public => Ok(None),
        }
    }

    /// Shared guard: the list must exist, belong to the named container, and
    /// be stored under the scope the request declared. A declared scope that
    /// differs from the stored one is an authorization failure even when the
    /// caller would pass the other predicate.
    fn load_list_checked(
        &self,
        container_id: &str,
        list_id: &str,
        declared: ListScope,
    ) -> AppResult<ListRecord> {
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
        if list.scope != declared {
            return Err(AppError::ScopeMismatch(
                "List scope doesn't match your authorization".to_string(),
            ));
        }
        Ok(list)
    }
}
