//! Domain entities
//!
//! - Newtypes for drive and item identifiers and logical paths
//! - Remote items as returned by a listing
//! - Units of recursive work and copy submissions
//! - Run-wide statistics
//! - Error taxonomy shared by the engine and its adapters

pub mod errors;
pub mod item;
pub mod newtypes;
pub mod stats;
pub mod task;

pub use errors::{DomainError, MirrorError, RequestFailureKind};
pub use item::{ItemKind, RemoteItem};
pub use newtypes::*;
pub use stats::{RunStatistics, StatsSnapshot};
pub use task::{CopyRequest, DirectoryMirrorTask, FolderResolution};
