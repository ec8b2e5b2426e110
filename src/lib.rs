pub mod db;
pub mod errors;
pub mod models;
pub mod policy;
pub mod service;
pub mod sync;
pub mod users;

pub use db::Database;
pub use errors::{AppError, AppResult, AuthError};
pub use models::{
    ApiResponse, CheckItemsPayload, CollapsedUser, ContainerRecord, CreateItemPayload,
    CreateListPayload, DeleteItemPayload, DeleteListPayload, GetListPayload, ListItem, ListKind,
    ListRecord, ListRef, ListScope, PeoplePayload, RegisterUserPayload, ReorderListsPayload,
    ResetListPayload, ResponseStatus, Subject, UpdateItemPayload, UpdateListPayload, UserRecord,
};
pub use policy::{AccessPolicy, AuthProvider, StaticTokenProvider};
pub use service::ListService;
pub use sync::SyncEngine;
pub use users::UserDirectory;

use once_cell::sync::OnceCell;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the global tracing subscriber once; repeat calls are no-ops so
/// embedders and tests can call this freely.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .json()
            .try_init();
    });
}
