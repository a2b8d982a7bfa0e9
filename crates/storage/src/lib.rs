pub mod backend;
mod consts;
pub mod error;
pub mod models;
pub mod path;
mod pool;
pub mod range;

pub use crate::backend::{AdapterHandle, AdapterOptions, IndexPolicy, StorageAdapter};
pub use crate::models::{ByteStream, ModifiedMarker, NodeKind, Protocol, Remote, RemoteFile, RemoteStat, TreeNode};
pub use crate::pool::AdapterPool;
pub use crate::range::{ByteRange, RangeError, parse_range};
