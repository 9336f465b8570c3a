//! Remote item snapshot returned by a listing

use serde::{Deserialize, Serialize};

use super::newtypes::ItemId;

/// What kind of entry a [`RemoteItem`] is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Regular file, replicated by copy
    File,
    /// Folder, replicated by get-or-create and descent
    Folder,
    /// Neither facet present (packages, notebooks); never copied nor descended
    Other,
}

/// One entry of a remote container, as of the listing that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: ItemId,
    pub name: String,
    pub kind: ItemKind,
}

impl RemoteItem {
    pub fn new(id: ItemId, name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == ItemKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }
}
