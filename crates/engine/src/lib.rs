//! Crawling remote trees for geospatial rasters.
//!
//! A storage is a remote FTP, SFTP or HTTP directory tree. Scanning one
//! lists the whole tree, stores every entry, and has each raster file
//! analyzed by an external [`MetadataAnalyzer`](analyze::MetadataAnalyzer),
//! unless an earlier scan already analyzed the same version of it.
//!
//! - [`catalog`] registers storages and queues scans.
//! - [`worker`] claims queued scans and runs them, one at a time.
//! - [`download`] serves (ranges of) files of a storage's last good scan.

pub mod analyze;
pub mod catalog;
mod context;
pub mod download;
pub mod error;
pub mod scan;
#[cfg(test)]
mod testing;
pub mod tree;
pub mod worker;

pub use crate::context::{Context, Settings};
pub use crate::download::{Download, download};
