//! Queries, grouped by the entity they are about.
//!
//! Storages and their scan lifecycle live in [`storage`]; tree items and the
//! datasets they point at live in [`tree_item`]. Both extend the same
//! [`Repository`].

mod storage;
mod tree_item;

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{Storage, StorageId};
use exn::ResultExt;
use sqlx::SqlitePool;

/// Outcome of [`Repository::create_storage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCreation {
    Created(Storage),
    /// A storage with the same protocol and parameters already existed.
    Existing(Storage),
}

impl StorageCreation {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn into_inner(self) -> Storage {
        match self {
            Self::Created(storage) | Self::Existing(storage) => storage,
        }
    }
}

/// Repository for storages, tree items and datasets.
///
/// # Relationships
///
/// - A storage owns its tree items and datasets; deleting it cascades
/// - Tree items belong to exactly one scan of their storage
/// - Many tree items (one per scan) can reference the same dataset
/// - Pruning tree items never touches datasets
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl Repository {
    /// Explain why a conditional scan transition matched no row.
    async fn reject<T>(&self, id: StorageId, transition: &str) -> Result<T> {
        let status: Option<String> = sqlx::query_scalar(include_str!("../../queries/get_scan_status.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        match status {
            None => exn::bail!(ErrorKind::NotFound(format!("storage {id}"))),
            Some(status) => exn::bail!(ErrorKind::Conflict(format!("cannot {transition}: storage {id} is {status}"))),
        }
    }
}
