//! SQLite-backed entity store.
//!
//! Records, tags and their associations live in normalized tables. The page
//! title is store-private auxiliary data kept in `extras`, removed together
//! with its record through `ON DELETE CASCADE`. Dates are stored as unix
//! milliseconds.
//!
//! Text is case-folded for search and ordering with `fold_case`, a scalar
//! function registered on open that applies Unicode lower-casing. SQLite's
//! own `lower()` folds ASCII only and would order differently from
//! `ListQuery::compare`.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hipsta_core::{
    require_id, sort_tags, EntityStore, Item, ListQuery, SortKey, StoreError, StoreRole, Tag,
    TagKey,
};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS items (
        id TEXT PRIMARY KEY,
        linked_id TEXT,
        url_string TEXT NOT NULL,
        is_archived INTEGER NOT NULL DEFAULT 0,
        creation_date INTEGER NOT NULL,
        modification_date INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_items_modification ON items(modification_date);

    CREATE TABLE IF NOT EXISTS tags (
        key TEXT PRIMARY KEY,
        display_name TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS item_tags (
        item_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        tag_key TEXT NOT NULL REFERENCES tags(key) ON DELETE CASCADE,
        PRIMARY KEY (item_id, tag_key)
    );

    CREATE TABLE IF NOT EXISTS extras (
        item_id TEXT PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
        page_title TEXT
    );
";

/// Entity store persisted in a SQLite database.
///
/// Statements run inline on the calling task while the connection mutex is
/// held. Every operation is a single short transaction on a local file.
pub struct SqliteStore {
    role: StoreRole,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path, role: StoreRole) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::storage(role, e))?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError::storage(role, e))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StoreError::storage(role, e))?;
        Self::init(conn, role)
    }

    /// Create a store that lives only as long as this value.
    pub fn in_memory(role: StoreRole) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::storage(role, e))?;
        Self::init(conn, role)
    }

    fn init(conn: Connection, role: StoreRole) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| StoreError::storage(role, e))?;
        conn.create_scalar_function(
            "fold_case",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| text.to_lowercase())),
        )
        .map_err(|e| StoreError::storage(role, e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::storage(role, e))?;
        Ok(SqliteStore {
            role,
            conn: Mutex::new(conn),
        })
    }

    /// Set the store-private page title of a record.
    pub fn set_page_title(&self, id: &str, title: Option<&str>) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        if !exists(&conn, id).map_err(|e| self.storage(e))? {
            return Err(StoreError::not_found(self.role, id));
        }
        conn.execute(
            "INSERT INTO extras (item_id, page_title) VALUES (?1, ?2)
             ON CONFLICT(item_id) DO UPDATE SET page_title = excluded.page_title",
            params![id, title],
        )
        .map_err(|e| self.storage(e))?;
        Ok(())
    }

    /// Number of records held.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
            .map_err(|e| self.storage(e))?;
        Ok(n as usize)
    }

    fn storage(&self, e: rusqlite::Error) -> StoreError {
        StoreError::storage(self.role, e)
    }

    fn load(&self, conn: &Connection, id: &str) -> Result<Item, StoreError> {
        let row = conn
            .query_row(
                "SELECT i.linked_id, i.url_string, i.is_archived, i.creation_date,
                        i.modification_date, e.page_title
                 FROM items i LEFT JOIN extras e ON e.item_id = i.id
                 WHERE i.id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| self.storage(e))?
            .ok_or_else(|| StoreError::not_found(self.role, id))?;

        let (linked_id, url_string, is_archived, created, modified, page_title) = row;
        let mut item = Item {
            local_id: None,
            remote_id: None,
            url_string,
            is_archived,
            tags: self.load_tags(conn, id)?,
            creation_date: from_millis(created),
            modification_date: from_millis(modified),
            page_title,
        };
        item.set_id_for(self.role, Some(id.to_string()));
        if self.role == StoreRole::Local {
            item.remote_id = linked_id;
        }
        Ok(item)
    }

    fn load_tags(&self, conn: &Connection, id: &str) -> Result<BTreeSet<Tag>, StoreError> {
        let mut stmt = conn
            .prepare(
                "SELECT t.key, t.display_name FROM item_tags it
                 JOIN tags t ON t.key = it.tag_key
                 WHERE it.item_id = ?1",
            )
            .map_err(|e| self.storage(e))?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| self.storage(e))?;

        let mut tags = BTreeSet::new();
        for row in rows {
            let (key, display_name) = row.map_err(|e| self.storage(e))?;
            tags.insert(Tag::from_parts(TagKey::normalize(&key)?, display_name));
        }
        Ok(tags)
    }
}

fn exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM items WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map(|r| r.is_some())
}

/// Replace the tag set of a record, creating missing tags.
fn write_tags(conn: &Connection, id: &str, tags: &BTreeSet<Tag>) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM item_tags WHERE item_id = ?1", params![id])?;
    for tag in tags {
        conn.execute(
            "INSERT OR IGNORE INTO tags (key, display_name) VALUES (?1, ?2)",
            params![tag.key.as_str(), tag.display_name],
        )?;
        conn.execute(
            "INSERT INTO item_tags (item_id, tag_key) VALUES (?1, ?2)",
            params![id, tag.key.as_str()],
        )?;
    }
    Ok(())
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn order_clause(query: &ListQuery) -> String {
    let column = match query.sort {
        SortKey::CreationDate => "i.creation_date",
        SortKey::ModificationDate => "i.modification_date",
        SortKey::UrlString => "fold_case(i.url_string)",
        SortKey::PageTitle => "fold_case(COALESCE(e.page_title, ''))",
    };
    let direction = if query.ascending { "ASC" } else { "DESC" };
    format!("ORDER BY {column} {direction}, i.id {direction}")
}

#[async_trait]
impl EntityStore for SqliteStore {
    fn role(&self) -> StoreRole {
        self.role
    }

    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create(&self, template: Option<&Item>) -> Result<Item, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let record = super::new_record(self.role, id.clone(), template);
        let linked = match self.role {
            StoreRole::Local => record.remote_id.clone(),
            StoreRole::Remote => None,
        };

        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| self.storage(e))?;
        tx.execute(
            "INSERT INTO items (id, linked_id, url_string, is_archived, creation_date, modification_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                linked,
                record.url_string,
                record.is_archived,
                record.creation_date.timestamp_millis(),
                record.modification_date.timestamp_millis(),
            ],
        )
        .map_err(|e| self.storage(e))?;
        write_tags(&tx, &id, &record.tags).map_err(|e| self.storage(e))?;
        tx.commit().map_err(|e| self.storage(e))?;

        debug!(store = self.role.as_str(), id = %id, "created record");
        Ok(record)
    }

    async fn read(&self, id: &str) -> Result<Item, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        self.load(&conn, id)
    }

    async fn update(&self, item: &Item) -> Result<Item, StoreError> {
        let id = require_id(item, self.role)?;

        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| self.storage(e))?;
        let changed = tx
            .execute(
                "UPDATE items SET url_string = ?2, is_archived = ?3, modification_date = ?4
                 WHERE id = ?1",
                params![
                    id,
                    item.url_string,
                    item.is_archived,
                    item.modification_date.timestamp_millis(),
                ],
            )
            .map_err(|e| self.storage(e))?;
        if changed == 0 {
            return Err(StoreError::not_found(self.role, id));
        }
        if self.role == StoreRole::Local {
            if let Some(remote_id) = &item.remote_id {
                tx.execute(
                    "UPDATE items SET linked_id = ?2 WHERE id = ?1",
                    params![id, remote_id],
                )
                .map_err(|e| self.storage(e))?;
            }
        }
        write_tags(&tx, id, &item.tags).map_err(|e| self.storage(e))?;
        tx.commit().map_err(|e| self.storage(e))?;

        self.load(&conn, id)
    }

    async fn link(&self, local_id: &str, remote_id: &str) -> Result<Item, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let changed = conn
            .execute(
                "UPDATE items SET linked_id = ?2 WHERE id = ?1",
                params![local_id, remote_id],
            )
            .map_err(|e| self.storage(e))?;
        if changed == 0 {
            return Err(StoreError::not_found(self.role, local_id));
        }
        self.load(&conn, local_id)
    }

    async fn delete(&self, item: &Item) -> Result<(), StoreError> {
        let id = require_id(item, self.role)?;
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let removed = conn
            .execute("DELETE FROM items WHERE id = ?1", params![id])
            .map_err(|e| self.storage(e))?;
        if removed == 0 {
            return Err(StoreError::not_found(self.role, id));
        }
        debug!(store = self.role.as_str(), id = %id, "deleted record");
        Ok(())
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<String>, StoreError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if query.filter.archived == hipsta_core::ArchiveFilter::Unarchived {
            clauses.push("i.is_archived = 0");
        }
        if let Some(needle) = query.filter.search_needle() {
            clauses.push(
                "(instr(fold_case(i.url_string), ?) > 0 OR instr(fold_case(COALESCE(e.page_title, '')), ?) > 0)",
            );
            args.push(Value::Text(needle.clone()));
            args.push(Value::Text(needle));
        }
        if let Some(tag) = &query.filter.tag {
            clauses.push(
                "EXISTS (SELECT 1 FROM item_tags it WHERE it.item_id = i.id AND it.tag_key = ?)",
            );
            args.push(Value::Text(tag.as_str().to_string()));
        }

        let mut sql = String::from("SELECT i.id FROM items i LEFT JOIN extras e ON e.item_id = i.id");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push(' ');
        sql.push_str(&order_clause(query));

        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(&sql).map_err(|e| self.storage(e))?;
        let ids = stmt
            .query_map(params_from_iter(args), |row| row.get::<_, String>(0))
            .map_err(|e| self.storage(e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.storage(e))?;
        Ok(ids)
    }

    async fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn
            .prepare("SELECT key, display_name FROM tags")
            .map_err(|e| self.storage(e))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| self.storage(e))?;

        let mut tags = Vec::new();
        for row in rows {
            let (key, display_name) = row.map_err(|e| self.storage(e))?;
            tags.push(Tag::from_parts(TagKey::normalize(&key)?, display_name));
        }
        sort_tags(&mut tags);
        Ok(tags)
    }

    async fn ensure_tag(&self, name: &str) -> Result<Tag, StoreError> {
        let tag = Tag::new(name)?;
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT OR IGNORE INTO tags (key, display_name) VALUES (?1, ?2)",
            params![tag.key.as_str(), tag.display_name],
        )
        .map_err(|e| self.storage(e))?;
        let display_name: String = conn
            .query_row(
                "SELECT display_name FROM tags WHERE key = ?1",
                params![tag.key.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| self.storage(e))?;
        Ok(Tag::from_parts(tag.key, display_name))
    }

    async fn delete_tag(&self, key: &TagKey) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let removed = conn
            .execute("DELETE FROM tags WHERE key = ?1", params![key.as_str()])
            .map_err(|e| self.storage(e))?;
        if removed == 0 {
            return Err(StoreError::not_found(self.role, key.as_str()));
        }
        Ok(())
    }
}
