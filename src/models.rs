use crate::errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use uuid::Uuid;

/// Capacity of the per-user relevant-contacts queue.
pub const RELEVANT_USERS_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListKind {
    Grocery,
    Todo,
    Wishlist,
}

impl ListKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grocery => "GROCERY",
            Self::Todo => "TODO",
            Self::Wishlist => "WISHLIST",
        }
    }

    /// Container and list ids embed the kind token at creation; the kind of
    /// an id never changes, so it can always be recovered from the id alone.
    pub fn infer_from_id(id: &str) -> Option<Self> {
        [Self::Grocery, Self::Todo, Self::Wishlist]
            .into_iter()
            .find(|kind| id.contains(kind.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListScope {
    Private,
    Restricted,
    Public,
}

impl ListScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "PRIVATE",
            Self::Restricted => "RESTRICTED",
            Self::Public => "PUBLIC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub quantity: u32,
    pub checked: bool,
    pub priority: i32,
    pub added_by: String,
}

impl ListItem {
    pub fn new(name: &str, category: &str, quantity: u32, priority: i32, added_by: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            category: category.trim().to_string(),
            quantity,
            checked: false,
            priority,
            added_by: added_by.to_string(),
        }
    }
}

/// Canonical list document. Projections of it (`ListRef`) live inside
/// containers and are rebuilt, never edited, when this record changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecord {
    pub id: String,
    pub kind: ListKind,
    pub name: String,
    pub scope: ListScope,
    pub container_id: String,
    pub members: BTreeSet<String>,
    pub items: Vec<ListItem>,
    pub created_at: DateTime<Utc>,
}

impl ListRecord {
    pub fn new(name: &str, kind: ListKind, container_id: &str, owner: &str) -> Self {
        let mut members = BTreeSet::new();
        members.insert(owner.to_string());
        Self {
            id: format!("{}{}", Uuid::new_v4().simple(), kind.as_str()),
            kind,
            name: name.trim().to_string(),
            scope: ListScope::Private,
            container_id: container_id.to_string(),
            members,
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn add_item(&mut self, item: ListItem) {
        self.items.push(item);
    }

    pub fn item_by_id(&self, item_id: &str) -> Option<&ListItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn delete_item_by_id(&mut self, item_id: &str) {
        self.items.retain(|item| item.id != item_id);
    }

    /// Flips the checked flag of every listed item independently; one bulk
    /// action serves both directions. Ids not present are ignored and an
    /// empty id set is a no-op.
    pub fn toggle_checked(&mut self, item_ids: &BTreeSet<String>) {
        for item in &mut self.items {
            if item_ids.contains(&item.id) {
                item.checked = !item.checked;
            }
        }
    }

    pub fn reset_items(&mut self) {
        self.items.clear();
    }

    pub fn add_members<'a>(&mut self, people: impl IntoIterator<Item = &'a String>) {
        self.members.extend(people.into_iter().cloned());
    }

    pub fn remove_members<'a>(&mut self, people: impl IntoIterator<Item = &'a String>) {
        for person in people {
            self.members.remove(person);
        }
    }

    /// Builds the projection that containers hold for this list, denormalized
    /// from the record as it reads right now.
    pub fn build_ref(&self) -> ListRef {
        ListRef {
            list_id: self.id.clone(),
            list_name: self.name.clone(),
            scope: self.scope,
            reference: self.container_id.clone(),
            position: 0,
        }
    }
}

/// Denormalized projection of a list stored inside a container for fast
/// enumeration. `reference` names the owning container, which is what
/// members use to dereference a shared list. Removal matches structurally
/// (id + name + scope), not by id alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRef {
    pub list_id: String,
    pub list_name: String,
    pub scope: ListScope,
    pub reference: String,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    pub id: String,
    pub owner_username: String,
    pub kind: ListKind,
    pub refs: Vec<ListRef>,
}

impl ContainerRecord {
    pub fn new(owner_username: &str, kind: ListKind) -> Self {
        Self {
            id: format!("{}{}", Uuid::new_v4().simple(), kind.as_str()),
            owner_username: owner_username.to_string(),
            kind,
            refs: Vec::new(),
        }
    }

    pub fn ref_by_id(&self, list_id: &str) -> Option<&ListRef> {
        self.refs.iter().find(|entry| entry.list_id == list_id)
    }
}

/// Verified caller identity. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollapsedUser {
    pub username: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub username: String,
    pub name: String,
    pub email: String,
    pub grocery_container_id: String,
    pub todo_container_id: String,
    pub wishlist_container_id: String,
    pub relevant_users: VecDeque<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn container_id_for(&self, kind: ListKind) -> &str {
        match kind {
            ListKind::Grocery => &self.grocery_container_id,
            ListKind::Todo => &self.todo_container_id,
            ListKind::Wishlist => &self.wishlist_container_id,
        }
    }

    /// Most-recent-first contact queue: repeat contacts move to the front,
    /// the oldest entry falls off once capacity is reached.
    pub fn record_contact(&mut self, username: &str) {
        self.relevant_users.retain(|entry| entry != username);
        while self.relevant_users.len() >= RELEVANT_USERS_CAPACITY {
            self.relevant_users.pop_back();
        }
        self.relevant_users.push_front(username.to_string());
    }
}

// ─── Request payloads ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListPayload {
    pub container_id: String,
    pub name: String,
    pub scope: Option<ListScope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetListPayload {
    pub container_id: String,
    pub list_id: String,
    pub scope: ListScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemPayload {
    pub container_id: String,
    pub list_id: String,
    pub scope: ListScope,
    pub name: String,
    pub category: String,
    pub quantity: u32,
    pub priority: i32,
    pub added_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemPayload {
    pub container_id: String,
    pub list_id: String,
    pub scope: ListScope,
    pub previous_item_id: String,
    pub name: String,
    pub category: String,
    pub quantity: u32,
    pub checked: bool,
    pub priority: i32,
    pub added_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItemPayload {
    pub container_id: String,
    pub list_id: String,
    pub scope: ListScope,
    pub item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckItemsPayload {
    pub container_id: String,
    pub list_id: String,
    pub scope: ListScope,
    pub item_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListPayload {
    pub container_id: String,
    pub list_id: String,
    pub name: String,
    pub scope: ListScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeoplePayload {
    pub container_id: String,
    pub list_id: String,
    pub people: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteListPayload {
    pub container_id: String,
    pub list_id: String,
    pub scope: ListScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetListPayload {
    pub container_id: String,
    pub list_id: String,
    pub scope: ListScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderListsPayload {
    pub container_id: String,
    pub list_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserPayload {
    pub username: String,
    pub name: String,
    pub email: String,
}

// ─── Response envelope ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseStatus {
    Ok,
    BadRequest,
    Forbidden,
    Internal,
}

impl ResponseStatus {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::Forbidden => 401,
            Self::Internal => 500,
        }
    }

    pub fn of(error: &AppError) -> Self {
        match error {
            AppError::Validation(_) | AppError::NotFound(_) => Self::BadRequest,
            AppError::Auth(_) | AppError::Forbidden(_) | AppError::ScopeMismatch(_) => {
                Self::Forbidden
            }
            AppError::Store(_) | AppError::Internal(_) => Self::Internal,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            status: ResponseStatus::Ok.code(),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn from_error(error: &AppError) -> Self {
        Self {
            status: ResponseStatus::of(error).code(),
            payload: None,
            error: Some(error.to_string()),
        }
    }

    pub fn from_result(result: Result<T, AppError>) -> Self {
        match result {
            Ok(payload) => Self::ok(payload),
            Err(error) => Self::from_error(&error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_inferred_from_embedded_token() {
        let container = ContainerRecord::new("ana", ListKind::Todo);
        assert_eq!(ListKind::infer_from_id(&container.id), Some(ListKind::Todo));

        let list = ListRecord::new("errands", ListKind::Todo, &container.id, "ana");
        assert_eq!(ListKind::infer_from_id(&list.id), Some(ListKind::Todo));
        assert_eq!(ListKind::infer_from_id("no-token-here"), None);
    }

    #[test]
    fn toggle_checked_flips_both_directions() {
        let mut list = ListRecord::new("market", ListKind::Grocery, "c1GROCERY", "ana");
        let mut first = ListItem::new("milk", "dairy", 1, 0, "ana");
        first.checked = true;
        let second = ListItem::new("bread", "bakery", 2, 0, "ana");
        let ids: BTreeSet<String> = [first.id.clone(), second.id.clone()].into_iter().collect();
        list.add_item(first);
        list.add_item(second);

        list.toggle_checked(&ids);
        assert!(!list.items[0].checked);
        assert!(list.items[1].checked);
    }

    #[test]
    fn toggle_checked_with_empty_set_is_a_no_op() {
        let mut list = ListRecord::new("market", ListKind::Grocery, "c1GROCERY", "ana");
        list.add_item(ListItem::new("milk", "dairy", 1, 0, "ana"));
        list.toggle_checked(&BTreeSet::new());
        assert!(!list.items[0].checked);
    }

    #[test]
    fn record_contact_moves_repeats_to_front_and_bounds_capacity() {
        let mut user = UserRecord {
            username: "ana".to_string(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            grocery_container_id: "gGROCERY".to_string(),
            todo_container_id: "tTODO".to_string(),
            wishlist_container_id: "wWISHLIST".to_string(),
            relevant_users: VecDeque::new(),
            created_at: Utc::now(),
        };

        for index in 0..RELEVANT_USERS_CAPACITY + 2 {
            user.record_contact(&format!("user{index}"));
        }
        assert_eq!(user.relevant_users.len(), RELEVANT_USERS_CAPACITY);
        assert_eq!(user.relevant_users.front().map(String::as_str), Some("user11"));

        user.record_contact("user5");
        assert_eq!(user.relevant_users.len(), RELEVANT_USERS_CAPACITY);
        assert_eq!(user.relevant_users.front().map(String::as_str), Some("user5"));
        assert_eq!(
            user.relevant_users.iter().filter(|entry| *entry == "user5").count(),
            1
        );
    }

    #[test]
    fn api_response_wraps_results() {
        let ok = ApiResponse::ok(42u32);
        assert_eq!(ok.status, 200);
        assert_eq!(ok.payload, Some(42));

        let err: ApiResponse<u32> =
            ApiResponse::from_result(Err(AppError::Validation("bad input".to_string())));
        assert_eq!(err.status, 400);
        assert!(err.payload.is_none());
        assert!(err.error.is_some());
    }

    #[test]
    fn error_statuses_preserve_the_four_way_envelope() {
        assert_eq!(ResponseStatus::of(&AppError::Validation("x".into())).code(), 400);
        assert_eq!(ResponseStatus::of(&AppError::NotFound("x".into())).code(), 400);
        assert_eq!(ResponseStatus::of(&AppError::Forbidden("x".into())).code(), 401);
        assert_eq!(ResponseStatus::of(&AppError::ScopeMismatch("x".into())).code(), 401);
        assert_eq!(ResponseStatus::of(&AppError::Store("x".into())).code(), 500);
    }
}
