//! In-memory remote storage for engine tests
//!
//! Source and target trees live in one [`FakeStorage`]; folders are keyed by
//! id and ids are unique across both drives. A submitted copy only shows up
//! in listings after `copy_delay`, mimicking the service's asynchronous copy
//! behavior. All timing uses tokio's clock, so tests run with
//! `start_paused = true`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use drivemirror_core::domain::{
    CopyRequest, DirectoryMirrorTask, DriveId, FolderResolution, ItemId, ItemKind, LogicalPath,
    MirrorError, RemoteItem, RunStatistics,
};
use drivemirror_core::ports::{ChildMap, IRemoteStorage};
use drivemirror_sync::{MirrorEngine, MirrorOptions};

pub const SOURCE_ROOT: &str = "src-root";
pub const TARGET_ROOT: &str = "dst-root";

struct Entry {
    item: RemoteItem,
    visible_at: Instant,
}

#[derive(Default)]
struct State {
    folders: HashMap<String, HashMap<String, Entry>>,
    next_id: u64,
    listing_failures: HashMap<String, u32>,
    rejected_names: HashSet<String>,
    ensure_failures: HashSet<String>,
    auth_failure_on_copy: bool,
    ensure_calls: Vec<String>,
    copy_calls: Vec<String>,
    cancel_on_copy: Option<CancellationToken>,
}

impl State {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

pub struct FakeStorage {
    state: Mutex<State>,
    copy_delay: Duration,
    copy_latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeStorage {
    /// Empty source and target roots; copies become visible after `copy_delay`
    pub fn new(copy_delay: Duration) -> Self {
        let mut state = State::default();
        state.folders.insert(SOURCE_ROOT.into(), HashMap::new());
        state.folders.insert(TARGET_ROOT.into(), HashMap::new());
        Self {
            state: Mutex::new(state),
            copy_delay,
            copy_latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Each copy submission takes `latency` before it is answered
    pub fn with_copy_latency(mut self, latency: Duration) -> Self {
        self.copy_latency = latency;
        self
    }

    fn insert(&self, parent: &str, name: &str, kind: ItemKind) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.fresh_id(if kind == ItemKind::Folder { "folder" } else { "file" });
        if kind == ItemKind::Folder {
            state.folders.insert(id.clone(), HashMap::new());
        }
        state.folders.get_mut(parent).expect("parent folder").insert(
            name.to_string(),
            Entry {
                item: RemoteItem::new(ItemId::new(id.clone()).unwrap(), name, kind),
                visible_at: Instant::now(),
            },
        );
        id
    }

    pub fn add_file(&self, parent: &str, name: &str) -> String {
        self.insert(parent, name, ItemKind::File)
    }

    pub fn add_folder(&self, parent: &str, name: &str) -> String {
        self.insert(parent, name, ItemKind::Folder)
    }

    pub fn add_other(&self, parent: &str, name: &str) -> String {
        self.insert(parent, name, ItemKind::Other)
    }

    /// The next `times` listings of `folder` fail
    pub fn fail_listing(&self, folder: &str, times: u32) {
        self.state
            .lock()
            .unwrap()
            .listing_failures
            .insert(folder.to_string(), times);
    }

    /// Copies of files named `name` are always rejected
    pub fn reject_copies_of(&self, name: &str) {
        self.state.lock().unwrap().rejected_names.insert(name.into());
    }

    /// Get-or-create of folders named `name` always fails
    pub fn fail_ensure_of(&self, name: &str) {
        self.state.lock().unwrap().ensure_failures.insert(name.into());
    }

    pub fn fail_auth_on_copy(&self) {
        self.state.lock().unwrap().auth_failure_on_copy = true;
    }

    /// Cancels `token` as soon as the first copy is submitted
    pub fn cancel_on_first_copy(&self, token: CancellationToken) {
        self.state.lock().unwrap().cancel_on_copy = Some(token);
    }

    /// Names passed to `ensure_folder`, in call order
    pub fn ensure_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().ensure_calls.clone()
    }

    /// Desired names of copy submissions, in call order
    pub fn copy_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().copy_calls.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Names currently visible under `folder`
    pub fn visible_names(&self, folder: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let now = Instant::now();
        let mut names: Vec<String> = state.folders[folder]
            .iter()
            .filter(|(_, e)| e.visible_at <= now)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Id of the child named `name` under `folder`, visible or not
    pub fn child_id(&self, folder: &str, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.folders[folder]
            .get(name)
            .map(|e| e.item.id.as_str().to_string())
    }
}

#[async_trait::async_trait]
impl IRemoteStorage for FakeStorage {
    async fn list_children(
        &self,
        _drive: &DriveId,
        folder: &ItemId,
    ) -> Result<ChildMap, MirrorError> {
        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.listing_failures.get_mut(folder.as_str()) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MirrorError::ListingFailure(format!(
                    "injected failure for {folder}"
                )));
            }
        }
        let now = Instant::now();
        let children = state
            .folders
            .get(folder.as_str())
            .ok_or_else(|| MirrorError::ListingFailure(format!("no folder {folder}")))?;
        Ok(children
            .iter()
            .filter(|(_, e)| e.visible_at <= now)
            .map(|(name, e)| (name.clone(), e.item.clone()))
            .collect())
    }

    async fn ensure_folder(
        &self,
        _drive: &DriveId,
        parent: &ItemId,
        name: &str,
    ) -> Result<FolderResolution, MirrorError> {
        let mut state = self.state.lock().unwrap();
        state.ensure_calls.push(name.to_string());

        if state.ensure_failures.contains(name) {
            return Err(MirrorError::FolderResolution {
                name: name.into(),
                reason: "injected failure".into(),
            });
        }

        if let Some(existing) = state
            .folders
            .get(parent.as_str())
            .and_then(|children| children.get(name))
        {
            return if existing.item.is_folder() {
                Ok(FolderResolution {
                    id: existing.item.id.clone(),
                    was_created: false,
                })
            } else {
                Err(MirrorError::FolderResolution {
                    name: name.into(),
                    reason: "a file has this name".into(),
                })
            };
        }

        let id = state.fresh_id("folder");
        state.folders.insert(id.clone(), HashMap::new());
        let item_id = ItemId::new(id).unwrap();
        state
            .folders
            .get_mut(parent.as_str())
            .ok_or_else(|| MirrorError::FolderResolution {
                name: name.into(),
                reason: "parent does not exist".into(),
            })?
            .insert(
                name.to_string(),
                Entry {
                    item: RemoteItem::new(item_id.clone(), name, ItemKind::Folder),
                    visible_at: Instant::now(),
                },
            );
        Ok(FolderResolution {
            id: item_id,
            was_created: true,
        })
    }

    async fn copy_item(&self, request: &CopyRequest) -> Result<(), MirrorError> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let (rejected, auth_failure) = {
            let mut state = self.state.lock().unwrap();
            state.copy_calls.push(request.desired_name.clone());
            if let Some(token) = state.cancel_on_copy.take() {
                token.cancel();
            }
            (
                state.rejected_names.contains(&request.desired_name),
                state.auth_failure_on_copy,
            )
        };

        if !self.copy_latency.is_zero() {
            tokio::time::sleep(self.copy_latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if auth_failure {
            return Err(MirrorError::AuthFailure("token endpoint unreachable".into()));
        }
        if rejected {
            return Err(MirrorError::CopyRejected {
                name: request.desired_name.clone(),
                reason: "status 400".into(),
            });
        }

        let mut state = self.state.lock().unwrap();
        let id = state.fresh_id("copy");
        let visible_at = Instant::now() + self.copy_delay;
        let target = state
            .folders
            .get_mut(request.target_folder.as_str())
            .ok_or_else(|| MirrorError::CopyRejected {
                name: request.desired_name.clone(),
                reason: "no target folder".into(),
            })?;
        // an earlier submission of the same name keeps its visibility time
        target
            .entry(request.desired_name.clone())
            .or_insert_with(|| Entry {
                item: RemoteItem::new(
                    ItemId::new(id).unwrap(),
                    request.desired_name.clone(),
                    ItemKind::File,
                ),
                visible_at,
            });
        Ok(())
    }
}

/// Options with the default waits and `max_workers` concurrent copies
pub fn options(max_workers: usize) -> MirrorOptions {
    MirrorOptions {
        max_workers,
        ..MirrorOptions::default()
    }
}

pub fn root_task() -> DirectoryMirrorTask {
    DirectoryMirrorTask::new(
        DriveId::new("src").unwrap(),
        ItemId::new(SOURCE_ROOT).unwrap(),
        DriveId::new("dst").unwrap(),
        ItemId::new(TARGET_ROOT).unwrap(),
        LogicalPath::root(),
    )
}

/// Engine over `storage` with fresh statistics
pub fn engine(storage: &Arc<FakeStorage>, options: MirrorOptions) -> MirrorEngine {
    MirrorEngine::new(
        Arc::clone(storage) as Arc<dyn IRemoteStorage>,
        options,
        Arc::new(RunStatistics::new()),
    )
}

pub fn path(p: &str) -> LogicalPath {
    LogicalPath::new(p).unwrap()
}
