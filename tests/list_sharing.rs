use listpal::{
    AppError, CheckItemsPayload, CreateItemPayload, CreateListPayload, Database, DeleteListPayload,
    GetListPayload, ListScope, ListService, PeoplePayload, RegisterUserPayload,
    ReorderListsPayload, ResponseStatus, StaticTokenProvider, UpdateItemPayload, UpdateListPayload,
    UserDirectory, UserRecord,
};
use std::collections::BTreeSet;
use std::sync::Arc;

struct Harness {
    _dir: tempfile::TempDir,
    db: Arc<Database>,
    auth: Arc<StaticTokenProvider>,
    users: UserDirectory,
    service: ListService,
}

fn harness() -> Harness {
    listpal::init_tracing();
    let dir = tempfile::tempdir().expect("temp dir");
    let db = Arc::new(Database::new(&dir.path().join("listpal.sqlite")).expect("open database"));
    let auth = Arc::new(StaticTokenProvider::new());
    let service = ListService::new(db.clone(), auth.clone());
    let users = UserDirectory::new(db.clone());
    Harness {
        _dir: dir,
        db,
        auth,
        users,
        service,
    }
}

fn register(h: &Harness, username: &str) -> UserRecord {
    let user = h
        .users
        .register_user(&RegisterUserPayload {
            username: username.to_string(),
            name: username.to_string(),
            email: format!("{username}@example.com"),
        })
        .expect("register user");
    h.auth.grant(&token(username), username);
    user
}

fn token(username: &str) -> String {
    format!("tok-{username}")
}

fn refs_for(h: &Harness, container_id: &str, list_id: &str) -> usize {
    h.db.get_container(container_id)
        .unwrap()
        .unwrap()
        .refs
        .iter()
        .filter(|entry| entry.list_id == list_id)
        .count()
}

#[test]
fn restricted_membership_and_refs_stay_in_lockstep() {
    let h = harness();
    let ana = register(&h, "ana");
    let ben = register(&h, "ben");
    let cody = register(&h, "cody");

    let entry = h
        .service
        .create_list(
            &token("ana"),
            &CreateListPayload {
                container_id: ana.grocery_container_id.clone(),
                name: "market".to_string(),
                scope: Some(ListScope::Restricted),
            },
        )
        .unwrap();

    h.service
        .add_people(
            &token("ana"),
            &PeoplePayload {
                container_id: ana.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                people: vec!["ben".to_string(), "cody".to_string()],
            },
        )
        .unwrap();
    h.service
        .remove_people(
            &token("ana"),
            &PeoplePayload {
                container_id: ana.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                people: vec!["cody".to_string()],
            },
        )
        .unwrap();

    // Validate against the canonical list, then check every projection.
    let list = h.db.get_list(&entry.list_id).unwrap().unwrap();
    let expected: BTreeSet<String> = ["ana".to_string(), "ben".to_string()].into_iter().collect();
    assert_eq!(list.members, expected);
    assert_eq!(refs_for(&h, &ana.grocery_container_id, &entry.list_id), 1);
    assert_eq!(refs_for(&h, &ben.grocery_container_id, &entry.list_id), 1);
    assert_eq!(refs_for(&h, &cody.grocery_container_id, &entry.list_id), 0);
}

#[test]
fn granting_the_same_people_twice_changes_nothing() {
    let h = harness();
    let ana = register(&h, "ana");
    let ben = register(&h, "ben");

    let entry = h
        .service
        .create_list(
            &token("ana"),
            &CreateListPayload {
                container_id: ana.grocery_container_id.clone(),
                name: "market".to_string(),
                scope: Some(ListScope::Restricted),
            },
        )
        .unwrap();

    let payload = PeoplePayload {
        container_id: ana.grocery_container_id.clone(),
        list_id: entry.list_id.clone(),
        people: vec!["ben".to_string()],
    };
    h.service.add_people(&token("ana"), &payload).unwrap();
    h.service.add_people(&token("ana"), &payload).unwrap();

    let list = h.db.get_list(&entry.list_id).unwrap().unwrap();
    assert_eq!(list.members.len(), 2);
    assert_eq!(refs_for(&h, &ben.grocery_container_id, &entry.list_id), 1);
}

#[test]
fn item_round_trip_replaces_by_previous_id() {
    let h = harness();
    let ana = register(&h, "ana");

    let entry = h
        .service
        .create_list(
            &token("ana"),
            &CreateListPayload {
                container_id: ana.todo_container_id.clone(),
                name: "errands".to_string(),
                scope: None,
            },
        )
        .unwrap();

    let created = h
        .service
        .create_item(
            &token("ana"),
            &CreateItemPayload {
                container_id: ana.todo_container_id.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Private,
                name: "post office".to_string(),
                category: "town".to_string(),
                quantity: 1,
                priority: 2,
                added_by: "ana".to_string(),
            },
        )
        .unwrap();

    h.service
        .update_item(
            &token("ana"),
            &UpdateItemPayload {
                container_id: ana.todo_container_id.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Private,
                previous_item_id: created.id.clone(),
                name: "post office + stamps".to_string(),
                category: "town".to_string(),
                quantity: 2,
                checked: true,
                priority: 1,
                added_by: "ana".to_string(),
            },
        )
        .unwrap();

    let list = h
        .service
        .get_list(
            &token("ana"),
            &GetListPayload {
                container_id: ana.todo_container_id.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Private,
            },
        )
        .unwrap();

    assert_eq!(list.id, entry.list_id);
    assert_eq!(list.items.len(), 1);
    assert_eq!(list.items[0].name, "post office + stamps");
    assert_eq!(list.items[0].quantity, 2);
    assert!(list.items[0].checked);
}

#[test]
fn narrowing_scope_unshares_everyone_but_the_owner() {
    let h = harness();
    let ana = register(&h, "ana");
    let ben = register(&h, "ben");
    let cody = register(&h, "cody");

    let entry = h
        .service
        .create_list(
            &token("ana"),
            &CreateListPayload {
                container_id: ana.grocery_container_id.clone(),
                name: "market".to_string(),
                scope: Some(ListScope::Restricted),
            },
        )
        .unwrap();
    h.service
        .add_people(
            &token("ana"),
            &PeoplePayload {
                container_id: ana.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                people: vec!["ben".to_string(), "cody".to_string()],
            },
        )
        .unwrap();

    let updated = h
        .service
        .update_list(
            &token("ana"),
            &UpdateListPayload {
                container_id: ana.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                name: "market".to_string(),
                scope: ListScope::Private,
            },
        )
        .unwrap();

    let expected: BTreeSet<String> = [String::from("ana")].into_iter().collect();
    assert_eq!(updated.members, expected);
    assert_eq!(refs_for(&h, &ana.grocery_container_id, &entry.list_id), 1);
    assert_eq!(refs_for(&h, &ben.grocery_container_id, &entry.list_id), 0);
    assert_eq!(refs_for(&h, &cody.grocery_container_id, &entry.list_id), 0);
}

#[test]
fn leaving_and_owner_delete_differ() {
    let h = harness();
    let ana = register(&h, "ana");
    let ben = register(&h, "ben");

    let entry = h
        .service
        .create_list(
            &token("ana"),
            &CreateListPayload {
                container_id: ana.grocery_container_id.clone(),
                name: "market".to_string(),
                scope: Some(ListScope::Restricted),
            },
        )
        .unwrap();
    h.service
        .add_people(
            &token("ana"),
            &PeoplePayload {
                container_id: ana.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                people: vec!["ben".to_string()],
            },
        )
        .unwrap();

    // Ben leaves: his ref and membership go, the list stays.
    h.service
        .delete_list(
            &token("ben"),
            &DeleteListPayload {
                container_id: ben.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Restricted,
            },
        )
        .unwrap();

    let list = h.db.get_list(&entry.list_id).unwrap().unwrap();
    assert_eq!(list.members.len(), 1);
    assert!(list.members.contains("ana"));
    assert_eq!(refs_for(&h, &ben.grocery_container_id, &entry.list_id), 0);
    assert_eq!(refs_for(&h, &ana.grocery_container_id, &entry.list_id), 1);

    // Ana deletes: the list and her ref go too.
    h.service
        .delete_list(
            &token("ana"),
            &DeleteListPayload {
                container_id: ana.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Restricted,
            },
        )
        .unwrap();

    assert!(h.db.get_list(&entry.list_id).unwrap().is_none());
    assert_eq!(refs_for(&h, &ana.grocery_container_id, &entry.list_id), 0);
}

#[test]
fn empty_check_set_is_a_successful_no_op() {
    let h = harness();
    let ana = register(&h, "ana");

    let entry = h
        .service
        .create_list(
            &token("ana"),
            &CreateListPayload {
                container_id: ana.grocery_container_id.clone(),
                name: "market".to_string(),
                scope: None,
            },
        )
        .unwrap();

    h.service
        .check_items(
            &token("ana"),
            &CheckItemsPayload {
                container_id: ana.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Private,
                item_ids: BTreeSet::new(),
            },
        )
        .unwrap();
}

#[test]
fn check_items_toggles_in_both_directions() {
    let h = harness();
    let ana = register(&h, "ana");

    let entry = h
        .service
        .create_list(
            &token("ana"),
            &CreateListPayload {
                container_id: ana.grocery_container_id.clone(),
                name: "market".to_string(),
                scope: None,
            },
        )
        .unwrap();
    let item = h
        .service
        .create_item(
            &token("ana"),
            &CreateItemPayload {
                container_id: ana.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Private,
                name: "milk".to_string(),
                category: "dairy".to_string(),
                quantity: 1,
                priority: 0,
                added_by: "ana".to_string(),
            },
        )
        .unwrap();

    let payload = CheckItemsPayload {
        container_id: ana.grocery_container_id.clone(),
        list_id: entry.list_id.clone(),
        scope: ListScope::Private,
        item_ids: [item.id.clone()].into_iter().collect(),
    };
    h.service.check_items(&token("ana"), &payload).unwrap();
    let list = h.db.get_list(&entry.list_id).unwrap().unwrap();
    assert!(list.items[0].checked);

    h.service.check_items(&token("ana"), &payload).unwrap();
    let list = h.db.get_list(&entry.list_id).unwrap().unwrap();
    assert!(!list.items[0].checked);
}

#[test]
fn declared_scope_must_match_stored_scope() {
    let h = harness();
    let ana = register(&h, "ana");
    register(&h, "ben");

    let entry = h
        .service
        .create_list(
            &token("ana"),
            &CreateListPayload {
                container_id: ana.grocery_container_id.clone(),
                name: "market".to_string(),
                scope: Some(ListScope::Restricted),
            },
        )
        .unwrap();
    h.service
        .add_people(
            &token("ana"),
            &PeoplePayload {
                container_id: ana.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                people: vec!["ben".to_string()],
            },
        )
        .unwrap();

    // The owner passes the private predicate but the stored scope disagrees.
    let owner_err = h
        .service
        .get_list(
            &token("ana"),
            &GetListPayload {
                container_id: ana.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Private,
            },
        )
        .unwrap_err();
    assert!(matches!(owner_err, AppError::ScopeMismatch(_)));
    assert_eq!(ResponseStatus::of(&owner_err), ResponseStatus::Forbidden);

    // A member declaring PRIVATE fails the owner predicate outright.
    let member_err = h
        .service
        .get_list(
            &token("ben"),
            &GetListPayload {
                container_id: ana.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Private,
            },
        )
        .unwrap_err();
    assert_eq!(ResponseStatus::of(&member_err), ResponseStatus::Forbidden);
}

#[test]
fn public_lists_are_reachable_by_id_pair_without_a_token() {
    let h = harness();
    let ana = register(&h, "ana");

    let entry = h
        .service
        .create_list(
            &token("ana"),
            &CreateListPayload {
                container_id: ana.wishlist_container_id.clone(),
                name: "gift ideas".to_string(),
                scope: None,
            },
        )
        .unwrap();
    h.service
        .update_list(
            &token("ana"),
            &UpdateListPayload {
                container_id: ana.wishlist_container_id.clone(),
                list_id: entry.list_id.clone(),
                name: "gift ideas".to_string(),
                scope: ListScope::Public,
            },
        )
        .unwrap();

    h.service
        .create_item(
            "",
            &CreateItemPayload {
                container_id: ana.wishlist_container_id.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Public,
                name: "bicycle bell".to_string(),
                category: "outdoors".to_string(),
                quantity: 1,
                priority: 0,
                added_by: "guest".to_string(),
            },
        )
        .unwrap();

    let list = h
        .service
        .get_list(
            "",
            &GetListPayload {
                container_id: ana.wishlist_container_id.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Public,
            },
        )
        .unwrap();
    assert_eq!(list.items.len(), 1);
    assert_eq!(list.items[0].added_by, "guest");
}

#[test]
fn reorder_replaces_the_ordering_wholesale() {
    let h = harness();
    let ana = register(&h, "ana");

    let first = h
        .service
        .create_list(
            &token("ana"),
            &CreateListPayload {
                container_id: ana.todo_container_id.clone(),
                name: "errands".to_string(),
                scope: None,
            },
        )
        .unwrap();
    let second = h
        .service
        .create_list(
            &token("ana"),
            &CreateListPayload {
                container_id: ana.todo_container_id.clone(),
                name: "chores".to_string(),
                scope: None,
            },
        )
        .unwrap();

    let bogus = h.service.reorder_lists(
        &token("ana"),
        &ReorderListsPayload {
            container_id: ana.todo_container_id.clone(),
            list_ids: vec![first.list_id.clone(), "no-such-idTODO".to_string()],
        },
    );
    assert!(matches!(bogus, Err(AppError::Validation(_))));

    h.service
        .reorder_lists(
            &token("ana"),
            &ReorderListsPayload {
                container_id: ana.todo_container_id.clone(),
                list_ids: vec![second.list_id.clone(), first.list_id.clone()],
            },
        )
        .unwrap();

    let container = h
        .service
        .get_all_lists(&token("ana"), &ana.todo_container_id)
        .unwrap();
    let ordered: Vec<&str> = container.refs.iter().map(|r| r.list_id.as_str()).collect();
    assert_eq!(ordered, vec![second.list_id.as_str(), first.list_id.as_str()]);
}

#[test]
fn requests_without_a_valid_token_are_rejected() {
    let h = harness();
    let ana = register(&h, "ana");

    let missing = h
        .service
        .get_all_lists("", &ana.grocery_container_id)
        .unwrap_err();
    assert_eq!(ResponseStatus::of(&missing), ResponseStatus::Forbidden);

    let unknown = h
        .service
        .get_all_lists("tok-mallory", &ana.grocery_container_id)
        .unwrap_err();
    assert!(matches!(unknown, AppError::Auth(_)));
}

#[test]
fn members_can_edit_and_reset_a_shared_list() {
    let h = harness();
    let ana = register(&h, "ana");
    register(&h, "ben");

    let entry = h
        .service
        .create_list(
            &token("ana"),
            &CreateListPayload {
                container_id: ana.grocery_container_id.clone(),
                name: "market".to_string(),
                scope: Some(ListScope::Restricted),
            },
        )
        .unwrap();
    h.service
        .add_people(
            &token("ana"),
            &PeoplePayload {
                container_id: ana.grocery_container_id.clone(),
                list_id: entry.list_id.clone(),
                people: vec!["ben".to_string()],
            },
        )
        .unwrap();

    // Ben edits through the owning container id carried on his ref.
    let item = h
        .service
        .create_item(
            &token("ben"),
            &CreateItemPayload {
                container_id: entry.reference.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Restricted,
                name: "olive oil".to_string(),
                category: "pantry".to_string(),
                quantity: 1,
                priority: 0,
                added_by: "ben".to_string(),
            },
        )
        .unwrap();

    let people = h
        .service
        .get_people(&token("ben"), &entry.reference, &entry.list_id)
        .unwrap();
    assert!(people.contains("ana") && people.contains("ben"));

    h.service
        .delete_item(
            &token("ana"),
            &listpal::DeleteItemPayload {
                container_id: entry.reference.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Restricted,
                item_id: item.id.clone(),
            },
        )
        .unwrap();

    let reset = h
        .service
        .reset_list(
            &token("ana"),
            &listpal::ResetListPayload {
                container_id: entry.reference.clone(),
                list_id: entry.list_id.clone(),
                scope: ListScope::Restricted,
            },
        )
        .unwrap();
    assert!(reset.items.is_empty());
}
