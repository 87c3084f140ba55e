//! Stash Core - Domain models, storage and shared types
//!
//! This crate defines the core abstractions used by the stash API server:
//! - Strongly typed identifiers (users, items)
//! - User and item models
//! - Ownership checks for user-owned resources
//! - Common error types
//! - Configuration management
//! - SQLite storage (credentials, items, revoked tokens)

pub mod config;
pub mod store;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, ItemsConfig, LoggingConfig,
    PasswordParams, RevocationBackend, ServerConfig,
};
pub use store::{ItemRepository, RevocationRepository, SqliteStore, UserRepository};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for stash operations
#[derive(Error, Debug)]
pub enum StashError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Access denied: {reason}")]
    Forbidden { reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(#[from] ParseIdError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StashError>;

/// Failure to turn an external string into a typed identifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{input}' is not a valid {kind} id")]
pub struct ParseIdError {
    pub kind: &'static str,
    pub input: String,
}

// ============================================================================
// Identifiers
// ============================================================================

fn parse_positive_id(kind: &'static str, s: &str) -> std::result::Result<i64, ParseIdError> {
    // Only plain decimal digits: no sign, no whitespace, no leading '+'.
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseIdError {
            kind,
            input: s.to_string(),
        });
    }
    match s.parse::<i64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ParseIdError {
            kind,
            input: s.to_string(),
        }),
    }
}

/// User identifier
///
/// Travels as its decimal string form in token subjects and is parsed back
/// with [`FromStr`] before any storage access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        parse_positive_id("user", s).map(Self)
    }
}

/// Item identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(i64);

impl ItemId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        parse_positive_id("item", s).map(Self)
    }
}

// ============================================================================
// Models
// ============================================================================

/// Stored user account
///
/// `password_hash` is a PHC string; the plaintext is never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Fields of a profile update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.password_hash.is_none()
    }
}

/// User-owned item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub owner: UserId,
}

/// Item to be inserted; the owner is always the authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub owner: UserId,
}

/// Fields of an item update; `None` leaves the column unchanged
///
/// Ownership is fixed at creation, so there is no owner field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

// ============================================================================
// Ownership
// ============================================================================

/// How a foreign-owned resource is reported to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipPolicy {
    /// Existence is checked before ownership: a foreign item yields `Forbidden`
    #[default]
    RevealForbidden,
    /// A foreign item is indistinguishable from a missing one
    ConcealAsNotFound,
}

/// Check that `caller` owns the looked-up item
///
/// Existence is checked first (`NotFound`), then ownership (`Forbidden`, or
/// `NotFound` under [`OwnershipPolicy::ConcealAsNotFound`]).
pub fn ensure_owner(item: Option<Item>, caller: UserId, policy: OwnershipPolicy) -> Result<Item> {
    let item = item.ok_or_else(|| StashError::NotFound("Item".to_string()))?;

    if item.owner == caller {
        return Ok(item);
    }

    match policy {
        OwnershipPolicy::RevealForbidden => Err(StashError::Forbidden {
            reason: format!("item {} is not owned by user {}", item.id, caller),
        }),
        OwnershipPolicy::ConcealAsNotFound => Err(StashError::NotFound("Item".to_string())),
    }
}
