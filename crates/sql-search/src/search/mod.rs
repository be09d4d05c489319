//! Execution of compiled searches.
//!
//! [`SqlSearchService`] drives a search end to end. The database and the
//! object store are reached through the [`SqlCommandExecutor`] and
//! [`RawResourceStore`] traits so that any client (or a test double) can be
//! plugged in.

mod executor;
mod raw_resource;
mod service;
mod store;

pub use executor::{SqlCommandExecutor, SqlRow, SqlValue};
pub use raw_resource::{decode_raw_resource, encode_raw_resource};
pub use service::SqlSearchService;
pub use store::{ObjectStoreError, RawResourceStore};
