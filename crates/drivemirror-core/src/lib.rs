//! DriveMirror Core - Domain types, ports and configuration
//!
//! This crate contains the adapter-independent half of DriveMirror:
//! - **Domain types** - `DriveId`, `ItemId`, `RemoteItem`, `DirectoryMirrorTask`,
//!   `CopyRequest`, `RunStatistics`, and the `MirrorError` taxonomy
//! - **Port definitions** - `IRemoteStorage`, the only way the replication
//!   engine reaches a remote drive
//! - **Configuration** - YAML-backed settings with validation
//!
//! # Architecture
//!
//! Ports and adapters: the domain module has no I/O, the `IRemoteStorage`
//! port is implemented by `drivemirror-graph`, and `drivemirror-sync` drives
//! the port without knowing which adapter is behind it.

pub mod config;
pub mod domain;
pub mod ports;
