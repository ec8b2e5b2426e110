use crate::errors::{AppError, AppResult};
use crate::models::{ContainerRecord, ListKind, ListRecord, ListRef, ListScope, UserRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// The document store. Lists and containers are two independent collections;
/// there is no cross-collection transaction, so multi-document operations are
/// sequenced by the sync engine, not here.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Store(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ─── List store ───────────────────────────────────────────────────────────

    pub fn insert_list(&self, list: &ListRecord) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO lists (id, container_id, kind, name, scope, members_json, items_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                list.id,
                list.container_id,
                list.kind.as_str(),
                list.name,
                list.scope.as_str(),
                serde_json::to_string(&list.members)?,
                serde_json::to_string(&list.items)?,
                list.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_list(&self, list_id: &str) -> AppResult<Option<ListRecord>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.query_row(
            "SELECT id, container_id, kind, name, scope, members_json, items_json, created_at
             FROM lists WHERE id = ?1",
            [list_id],
            parse_list_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Idempotent overwrite by id.
    pub fn save_list(&self, list: &ListRecord) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO lists (id, container_id, kind, name, scope, members_json, items_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                list.id,
                list.container_id,
                list.kind.as_str(),
                list.name,
                list.scope.as_str(),
                serde_json::to_string(&list.members)?,
                serde_json::to_string(&list.items)?,
                list.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_list(&self, list_id: &str) -> AppResult<bool> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute("DELETE FROM lists WHERE id = ?1", [list_id])?;
        Ok(changed > 0)
    }

    /// Membership-only projection, for the restricted authorization predicate.
    pub fn get_list_members(&self, list_id: &str) -> AppResult<Option<BTreeSet<String>>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let raw = conn
            .query_row(
                "SELECT members_json FROM lists WHERE id = ?1",
                [list_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).unwrap_or_default())),
            None => Ok(None),
        }
    }

    // ─── Container store ──────────────────────────────────────────────────────

    pub fn insert_container(&self, container: &ContainerRecord) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO containers (id, owner_username, kind) VALUES (?1, ?2, ?3)",
            params![container.id, container.owner_username, container.kind.as_str()],
        )?;
        Ok(())
    }

    pub fn get_container(&self, container_id: &str) -> AppResult<Option<ContainerRecord>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let head = conn
            .query_row(
                "SELECT id, owner_username, kind FROM containers WHERE id = ?1",
                [container_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        parse_kind(&row.get::<_, String>(2)?)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, owner_username, kind)) = head else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT list_id, list_name, scope, reference, position
             FROM list_refs WHERE container_id = ?1 ORDER BY position ASC, list_id ASC",
        )?;
        let refs = stmt
            .query_map([container_id], parse_ref_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ContainerRecord {
            id,
            owner_username,
            kind,
            refs,
        }))
    }

    /// addToSet semantics: inserting a reference the container already holds
    /// is a no-op, not a duplicate.
    pub fn add_ref(&self, container_id: &str, entry: &ListRef) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT OR IGNORE INTO list_refs (container_id, list_id, list_name, scope, reference, position)
             VALUES (?1, ?2, ?3, ?4, ?5,
                     (SELECT COALESCE(MAX(position), -1) + 1 FROM list_refs WHERE container_id = ?1))",
            params![
                container_id,
                entry.list_id,
                entry.list_name,
                entry.scope.as_str(),
                entry.reference,
            ],
        )?;
        Ok(())
    }

    pub fn remove_ref(&self, container_id: &str, list_id: &str) -> AppResult<bool> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute(
            "DELETE FROM list_refs WHERE container_id = ?1 AND list_id = ?2",
            params![container_id, list_id],
        )?;
        Ok(changed > 0)
    }

    /// Wholesale replacement of a container's ordering. The new sequence must
    /// be a permutation of the references the container already holds.
    pub fn reorder_refs(&self, container_id: &str, list_ids: &[String]) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut stmt =
            conn.prepare("SELECT list_id FROM list_refs WHERE container_id = ?1")?;
        let current: BTreeSet<String> = stmt
            .query_map([container_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let requested: BTreeSet<String> = list_ids.iter().cloned().collect();
        if requested != current || list_ids.len() != current.len() {
            return Err(AppError::Validation(
                "Reordered ids must be a permutation of the container's list references".to_string(),
            ));
        }

        let mut update = conn.prepare(
            "UPDATE list_refs SET position = ?1 WHERE container_id = ?2 AND list_id = ?3",
        )?;
        for (position, list_id) in list_ids.iter().enumerate() {
            update.execute(params![position as i64, container_id, list_id])?;
        }
        Ok(())
    }

    /// Fan-out upsert: one batched statement that appends the reference to the
    /// container of every matching (username, kind), skipping containers that
    /// already hold it.
    pub fn bulk_add_ref(
        &self,
        usernames: &[String],
        kind: ListKind,
        entry: &ListRef,
    ) -> AppResult<usize> {
        if usernames.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let placeholders = vec!["?"; usernames.len()].join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO list_refs (container_id, list_id, list_name, scope, reference, position)
             SELECT c.id, ?1, ?2, ?3, ?4,
                    (SELECT COALESCE(MAX(r.position), -1) + 1 FROM list_refs r WHERE r.container_id = c.id)
             FROM containers c
             WHERE c.kind = ?5 AND c.owner_username IN ({placeholders})"
        );

        let scope = entry.scope.as_str();
        let kind_token = kind.as_str();
        let mut dyn_params: Vec<&dyn rusqlite::ToSql> = vec![
            &entry.list_id,
            &entry.list_name,
            &scope,
            &entry.reference,
            &kind_token,
        ];
        for username in usernames {
            dyn_params.push(username);
        }

        let changed = conn.execute(&sql, rusqlite::params_from_iter(dyn_params))?;
        Ok(changed)
    }

    /// Fan-out removal: one batched statement that pulls the reference from
    /// the container of every matching (username, kind). The reference is
    /// matched structurally (id + name + scope) as it was read by the caller;
    /// re-applying the same removal is a no-op.
    pub fn bulk_remove_ref(
        &self,
        usernames: &[String],
        kind: ListKind,
        entry: &ListRef,
    ) -> AppResult<usize> {
        if usernames.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let placeholders = vec!["?"; usernames.len()].join(", ");
        let sql = format!(
            "DELETE FROM list_refs
             WHERE list_id = ?1 AND list_name = ?2 AND scope = ?3
               AND container_id IN (
                 SELECT id FROM containers
                 WHERE kind = ?4 AND owner_username IN ({placeholders})
               )"
        );

        let scope = entry.scope.as_str();
        let kind_token = kind.as_str();
        let mut dyn_params: Vec<&dyn rusqlite::ToSql> =
            vec![&entry.list_id, &entry.list_name, &scope, &kind_token];
        for username in usernames {
            dyn_params.push(username);
        }

        let changed = conn.execute(&sql, rusqlite::params_from_iter(dyn_params))?;
        Ok(changed)
    }

    // ─── User store ───────────────────────────────────────────────────────────

    pub fn insert_user(&self, user: &UserRecord) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO users (username, name, email, grocery_container_id, todo_container_id,
                                wishlist_container_id, relevant_users_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.username,
                user.name,
                user.email,
                user.grocery_container_id,
                user.todo_container_id,
                user.wishlist_container_id,
                serde_json::to_string(&user.relevant_users)?,
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, username: &str) -> AppResult<Option<UserRecord>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.query_row(
            "SELECT username, name, email, grocery_container_id, todo_container_id,
                    wishlist_container_id, relevant_users_json, created_at
             FROM users WHERE username = ?1",
            [username],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn save_user(&self, user: &UserRecord) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "UPDATE users SET name = ?1, email = ?2, relevant_users_json = ?3 WHERE username = ?4",
            params![
                user.name,
                user.email,
                serde_json::to_string(&user.relevant_users)?,
                user.username,
            ],
        )?;
        Ok(())
    }
}

// ─── Row parsing ────────────────────────────────────────────────────────────

fn parse_list_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ListRecord> {
    Ok(ListRecord {
        id: row.get(0)?,
        container_id: row.get(1)?,
        kind: parse_kind(&row.get::<_, String>(2)?)?,
        name: row.get(3)?,
        scope: parse_scope(&row.get::<_, String>(4)?)?,
        members: serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or_default(),
        items: serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or_default(),
        created_at: parse_time(&row.get::<_, String>(7)?)?,
    })
}

fn parse_ref_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ListRef> {
    Ok(ListRef {
        list_id: row.get(0)?,
        list_name: row.get(1)?,
        scope: parse_scope(&row.get::<_, String>(2)?)?,
        reference: row.get(3)?,
        position: row.get(4)?,
    })
}

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        username: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        grocery_container_id: row.get(3)?,
        todo_container_id: row.get(4)?,
        wishlist_container_id: row.get(5)?,
        relevant_users: serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or_default(),
        created_at: parse_time(&row.get::<_, String>(7)?)?,
    })
}

fn parse_kind(raw: &str) -> rusqlite::Result<ListKind> {
    match raw {
        "GROCERY" => Ok(ListKind::Grocery),
        "TODO" => Ok(ListKind::Todo),
        "WISHLIST" => Ok(ListKind::Wishlist),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown list kind '{}'", other),
            )),
        )),
    }
}

fn parse_scope(raw: &str) -> rusqlite::Result<ListScope> {
    match raw {
        "PRIVATE" => Ok(ListScope::Private),
        "RESTRICTED" => Ok(ListScope::Restricted),
        "PUBLIC" => Ok(ListScope::Public),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown list scope '{}'", other),
            )),
        )),
    }
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}
