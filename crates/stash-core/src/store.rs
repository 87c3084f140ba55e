//! SQLite store
//!
//! Provides the credential store, item store and revoked-token table using
//! SQLx and SQLite. Each repository method is a single statement, so every
//! operation is atomic at the storage layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;

use crate::{
    Item, ItemChanges, ItemId, NewItem, ProfileChanges, Result, StashError, User, UserId,
};

/// SQLite-backed store shared by all request handlers
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to the database (creating the file if needed) and run migrations
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StashError::Config(format!("Invalid DATABASE_URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StashError::Database(format!("SQLite connection failed: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database, migrated and ready
    ///
    /// Every SQLite connection to `:memory:` opens its own database, so the
    /// pool is pinned to one connection that is never recycled.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StashError::Config(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StashError::Database(format!("SQLite connection failed: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create from an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StashError::Database(format!("Migration failed: {e}")))
    }

    /// Round-trip to the database (readiness probe)
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StashError::Database(format!("Ping failed: {e}")))?;
        Ok(())
    }
}

fn db_error(context: &str, e: sqlx::Error) -> StashError {
    StashError::Database(format!("{context}: {e}"))
}

/// Like [`db_error`], but a UNIQUE violation becomes a conflict
fn write_error(context: &str, e: sqlx::Error) -> StashError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StashError::Conflict("email already exists".to_string());
        }
    }
    db_error(context, e)
}

/// An item insert whose owner row is gone names a missing user
fn item_write_error(context: &str, e: sqlx::Error) -> StashError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_foreign_key_violation() {
            return StashError::NotFound("User".to_string());
        }
    }
    db_error(context, e)
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::new(row.id),
            email: row.email,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

/// Item row from database
#[derive(Debug, FromRow)]
struct ItemRow {
    id: i64,
    name: String,
    description: String,
    user_id: i64,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: ItemId::new(row.id),
            name: row.name,
            description: row.description,
            owner: UserId::new(row.user_id),
        }
    }
}

/// Credential store operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; a taken email yields [`StashError::Conflict`]
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User>;

    /// Look up a user by exact (case-sensitive) email
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Look up a user by id
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>>;

    /// Whether `email` belongs to a user other than `excluding`
    async fn email_taken_by_other(&self, email: &str, excluding: UserId) -> Result<bool>;

    /// Apply profile changes, returning the updated user or `None` if absent
    async fn update_user(&self, id: UserId, changes: &ProfileChanges) -> Result<Option<User>>;
}

/// Item store operations
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// All items owned by `owner`, oldest first
    async fn list_items(&self, owner: UserId) -> Result<Vec<Item>>;

    /// Insert an item
    async fn create_item(&self, item: &NewItem) -> Result<Item>;

    /// Look up an item by id regardless of owner
    async fn get_item(&self, id: ItemId) -> Result<Option<Item>>;

    /// Apply item changes, returning the updated item or `None` if absent
    async fn update_item(&self, id: ItemId, changes: &ItemChanges) -> Result<Option<Item>>;

    /// Delete an item, returning whether a row was removed
    async fn delete_item(&self, id: ItemId) -> Result<bool>;
}

/// Durable revoked-token table
#[async_trait]
pub trait RevocationRepository: Send + Sync {
    /// Record a revoked token id; re-inserting the same id is a no-op
    async fn insert_revoked(&self, jti: &str, expires_at: i64) -> Result<()>;

    /// Whether a token id has been revoked
    async fn is_revoked(&self, jti: &str) -> Result<bool>;

    /// Drop entries whose token expired before `now` (unix seconds)
    async fn delete_expired_revocations(&self, now: i64) -> Result<u64>;
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let created_at = Utc::now();

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (email, password_hash, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(email)
        .bind(password_hash)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error("Failed to create user", e))?;

        Ok(User {
            id: UserId::new(id),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch user", e))?;

        Ok(row.map(User::from))
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, password_hash, created_at FROM users WHERE id = ?",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch user", e))?;

        Ok(row.map(User::from))
    }

    async fn email_taken_by_other(&self, email: &str, excluding: UserId) -> Result<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? AND id != ?)",
        )
        .bind(email)
        .bind(excluding.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to check email", e))?;

        Ok(taken)
    }

    async fn update_user(&self, id: UserId, changes: &ProfileChanges) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            UPDATE users SET
                email = COALESCE(?, email),
                password_hash = COALESCE(?, password_hash)
            WHERE id = ?
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(changes.email.as_deref())
        .bind(changes.password_hash.as_deref())
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_error("Failed to update user", e))?;

        Ok(row.map(User::from))
    }
}

#[async_trait]
impl ItemRepository for SqliteStore {
    async fn list_items(&self, owner: UserId) -> Result<Vec<Item>> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT id, name, description, user_id FROM items WHERE user_id = ? ORDER BY id",
        )
        .bind(owner.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list items", e))?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn create_item(&self, item: &NewItem) -> Result<Item> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO items (name, description, user_id) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.owner.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| item_write_error("Failed to create item", e))?;

        Ok(Item {
            id: ItemId::new(id),
            name: item.name.clone(),
            description: item.description.clone(),
            owner: item.owner,
        })
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>> {
        let row: Option<ItemRow> =
            sqlx::query_as("SELECT id, name, description, user_id FROM items WHERE id = ?")
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to fetch item", e))?;

        Ok(row.map(Item::from))
    }

    async fn update_item(&self, id: ItemId, changes: &ItemChanges) -> Result<Option<Item>> {
        let row: Option<ItemRow> = sqlx::query_as(
            r#"
            UPDATE items SET
                name = COALESCE(?, name),
                description = COALESCE(?, description)
            WHERE id = ?
            RETURNING id, name, description, user_id
            "#,
        )
        .bind(changes.name.as_deref())
        .bind(changes.description.as_deref())
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update item", e))?;

        Ok(row.map(Item::from))
    }

    async fn delete_item(&self, id: ItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete item", e))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RevocationRepository for SqliteStore {
    async fn insert_revoked(&self, jti: &str, expires_at: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO revoked_tokens (jti, expires_at, revoked_at) VALUES (?, ?, ?) \
             ON CONFLICT (jti) DO NOTHING",
        )
        .bind(jti)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to revoke token", e))?;

        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let revoked: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE jti = ?)")
                .bind(jti)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("Failed to check revocation", e))?;

        Ok(revoked)
    }

    async fn delete_expired_revocations(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to purge revocations", e))?;

        Ok(result.rows_affected())
    }
}
