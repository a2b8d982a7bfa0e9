//! SQLite persistence for the crawler.
//!
//! # Architecture
//! The database holds three entity types:
//! - **Storages**: a remote tree and its connection parameters, plus the scan
//!   lifecycle (`idle` → `pending` → `processing` → `idle`). Every lifecycle
//!   transition is a single conditional `UPDATE ... RETURNING`, so two
//!   workers can never both claim the same scan.
//! - **Tree items**: every file and directory seen by one scan, tagged with
//!   that scan's id. A successful scan prunes the items of every other scan
//!   (snapshot swap), a failed one leaves the previous snapshot alone.
//! - **Datasets**: one per distinct fingerprint ever seen on a storage. They
//!   cache the computed metadata so unchanged files are never re-analyzed.

mod db;
pub mod error;
pub mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::{
    DataFormat, Dataset, ErrorRecord, FailureKind, NewTreeItem, ScanId, ScanProgress, ScanResult, ScanState,
    ScanStatus, ScanStep, Storage, StorageId, TreeItem,
};
pub use crate::repo::{Repository, StorageCreation};
