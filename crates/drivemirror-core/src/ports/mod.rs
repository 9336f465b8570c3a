//! Port definitions (hexagonal architecture interfaces)
//!
//! - [`IRemoteStorage`] - Listing, folder get-or-create and copy submission
//!   against one hierarchical storage service

pub mod remote_storage;

pub use remote_storage::{ChildMap, IRemoteStorage};
