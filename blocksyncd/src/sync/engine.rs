use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use blocksync_core::{
    CollectionStatus, ConfigDocument, DocumentError, DocumentLocation, RemoteDocumentStore,
    WebdavError, compare_version,
};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use super::notifier::{Notice, Notifier};
use super::profile::ScriptProfile;
use super::state::{SyncState, WebdavSettings};
use crate::storage::{StateStore, StoreError};

pub const BOOTSTRAP_REASON: &str = "初始化同步";
pub const FORCE_UPGRADE_REASON: &str = "强制版本升级";
pub const MANUAL_SYNC_REASON: &str = "手动同步";
pub const MANUAL_EDIT_REASON: &str = "手动修改";

/// Epoch milliseconds.
pub type Clock = fn() -> i64;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("webdav error: {0}")]
    Webdav(#[from] WebdavError),
    #[error("document error: {0}")]
    Document(#[from] DocumentError),
    #[error("webdav url is not configured")]
    MissingUrl,
    #[error("remote folder could not be created (status {0})")]
    Collection(u16),
    #[error("upload rejected with status {0}")]
    Upload(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    Disabled,
    Bootstrapped { pushed: bool },
    Downloaded { upgraded: bool },
    ForcedUpgrade { pushed: bool },
    UpToDate { remote_newer: bool },
    Failed { status: u16 },
    StoreFailed,
}

impl PullOutcome {
    /// Whether remote lists were written into local state.
    pub fn merged(&self) -> bool {
        matches!(self, PullOutcome::Downloaded { .. })
    }
}

impl fmt::Display for PullOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullOutcome::Disabled => write!(f, "sync disabled"),
            PullOutcome::Bootstrapped { pushed: true } => write!(f, "remote initialized"),
            PullOutcome::Bootstrapped { pushed: false } => {
                write!(f, "remote missing and initialization failed")
            }
            PullOutcome::Downloaded { upgraded: true } => {
                write!(f, "downloaded remote lists and re-stamped them")
            }
            PullOutcome::Downloaded { upgraded: false } => write!(f, "downloaded remote lists"),
            PullOutcome::ForcedUpgrade { pushed: true } => {
                write!(f, "replaced outdated remote document")
            }
            PullOutcome::ForcedUpgrade { pushed: false } => {
                write!(f, "outdated remote document could not be replaced")
            }
            PullOutcome::UpToDate { remote_newer: true } => {
                write!(f, "up to date; remote written by a newer script version")
            }
            PullOutcome::UpToDate { remote_newer: false } => write!(f, "up to date"),
            PullOutcome::Failed { status } => write!(f, "pull failed (status {status})"),
            PullOutcome::StoreFailed => write!(f, "local state could not be saved"),
        }
    }
}

pub fn system_clock() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

/// Reconciles one script's local state against its remote document.
///
/// Every operation takes `&mut self`, so a single engine never runs two
/// operations at once. Separate engines (tabs, devices) writing the same
/// document race with last-write-wins: PUT carries no precondition.
pub struct SyncEngine<S, N> {
    remote: S,
    store: StateStore,
    profile: ScriptProfile,
    state: SyncState,
    notifier: N,
    clock: Clock,
}

impl<S: RemoteDocumentStore, N: Notifier> SyncEngine<S, N> {
    pub async fn load(
        remote: S,
        store: StateStore,
        profile: ScriptProfile,
        notifier: N,
    ) -> Result<Self, StoreError> {
        let state = SyncState::load(&store, &profile).await?;
        Ok(Self {
            remote,
            store,
            profile,
            state,
            notifier,
            clock: system_clock,
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn profile(&self) -> &ScriptProfile {
        &self.profile
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Applies user edits to the connection settings. The `lastSync`
    /// watermark is not editable here.
    pub async fn update_settings<F>(&mut self, edit: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut WebdavSettings),
    {
        let mut next = self.state.clone();
        edit(&mut next.webdav);
        next.webdav.last_sync = self.state.webdav.last_sync;
        next.persist_settings(&self.store, &self.profile).await?;
        self.state = next;
        Ok(())
    }

    /// Replaces the remote document with the current local lists.
    pub async fn push(&mut self, reason: &str) -> bool {
        match self.try_push(reason).await {
            Ok(document) => {
                info!(
                    reason,
                    last_modified = document.last_modified,
                    "pushed config document"
                );
                self.notifier.notify(Notice::Pushed {
                    reason: reason.to_string(),
                });
                true
            }
            Err(err) => {
                warn!(reason, error = %err, "push failed");
                self.notifier.notify(Notice::PushFailed {
                    reason: reason.to_string(),
                });
                false
            }
        }
    }

    async fn try_push(&mut self, reason: &str) -> Result<ConfigDocument, EngineError> {
        let location = self.location()?;
        let credentials = self.state.webdav.credentials();

        match self
            .remote
            .ensure_collection(&location.folder, &credentials)
            .await
        {
            CollectionStatus::CreateFailed(status) => return Err(EngineError::Collection(status)),
            CollectionStatus::Unverified(status) => {
                warn!(status, folder = %location.folder, "could not verify remote folder, uploading anyway");
            }
            CollectionStatus::Present | CollectionStatus::Created => {}
        }

        let now = (self.clock)();
        let last_modified = now.max(self.state.webdav.last_sync.saturating_add(1));
        let lists: BTreeMap<String, Vec<String>> = self
            .profile
            .list_names
            .iter()
            .map(|name| (name.clone(), self.state.list(name).to_vec()))
            .collect();
        let document = ConfigDocument::new(lists, last_modified, now, reason, &self.profile.version)?;
        let body = document.encode()?;

        let response = self.remote.put(&location.file, &credentials, body).await;
        if !response.is_success() {
            return Err(EngineError::Upload(response.status));
        }

        let mut next = self.state.clone();
        next.webdav.last_sync = document.last_modified;
        next.persist_settings(&self.store, &self.profile).await?;
        self.state = next;
        Ok(document)
    }

    /// Fetches the remote document and decides between download, forced
    /// upgrade, bootstrap and no-op.
    pub async fn pull(&mut self) -> PullOutcome {
        if !self.state.webdav.enabled {
            debug!("webdav sync disabled, skipping pull");
            return PullOutcome::Disabled;
        }
        let location = match self.location() {
            Ok(location) => location,
            Err(err) => {
                warn!(error = %err, "cannot pull");
                self.notifier.notify(Notice::PullFailed { status: 0 });
                return PullOutcome::Failed { status: 0 };
            }
        };

        let response = self
            .remote
            .get(&location.file, &self.state.webdav.credentials())
            .await;
        match response.status {
            200 => self.reconcile(response.body.as_deref().unwrap_or_default()).await,
            404 => {
                info!(file = %location.file, "remote document missing, initializing it");
                let pushed = self.push(BOOTSTRAP_REASON).await;
                PullOutcome::Bootstrapped { pushed }
            }
            status => {
                warn!(status, file = %location.file, "pull failed");
                self.notifier.notify(Notice::PullFailed { status });
                PullOutcome::Failed { status }
            }
        }
    }

    async fn reconcile(&mut self, body: &str) -> PullOutcome {
        let document = match ConfigDocument::decode(body) {
            Ok(document) => document,
            Err(err) => {
                warn!(error = %err, "remote document is malformed, treating it as empty");
                ConfigDocument::default()
            }
        };

        let remote_ts = document.last_modified;
        let local_ts = self.state.webdav.last_sync;
        let order = document
            .script_version
            .as_deref()
            .map(|remote| compare_version(remote, &self.profile.version));
        debug!(remote_ts, local_ts, ?order, "reconciling remote document");

        if remote_ts > local_ts {
            if let Err(err) = self.apply_download(&document).await {
                error!(error = %err, "failed to save downloaded lists");
                return PullOutcome::StoreFailed;
            }
            self.notifier.notify(Notice::Downloaded);
            let upgraded = match order {
                Some(Ordering::Less) => self.push(FORCE_UPGRADE_REASON).await,
                Some(Ordering::Greater) => {
                    self.warn_upgrade(&document);
                    false
                }
                _ => false,
            };
            return PullOutcome::Downloaded { upgraded };
        }

        match order {
            Some(Ordering::Less) => {
                info!(
                    remote_version = document.script_version.as_deref(),
                    running_version = %self.profile.version,
                    "remote document written by an older release, replacing it"
                );
                let pushed = self.push(FORCE_UPGRADE_REASON).await;
                PullOutcome::ForcedUpgrade { pushed }
            }
            Some(Ordering::Greater) => {
                self.warn_upgrade(&document);
                PullOutcome::UpToDate { remote_newer: true }
            }
            _ => PullOutcome::UpToDate {
                remote_newer: false,
            },
        }
    }

    /// Whole-list replacement for every list this profile owns that the
    /// document carries; lists the document lacks are left alone.
    async fn apply_download(&mut self, document: &ConfigDocument) -> Result<(), StoreError> {
        let mut next = self.state.clone();
        for (name, entries) in &document.lists {
            if self.profile.has_list(name) {
                next.lists.insert(name.clone(), entries.clone());
            } else {
                debug!(list = %name, "ignoring list unknown to this script");
            }
        }
        next.webdav.last_sync = document.last_modified;
        next.persist(&self.store, &self.profile).await?;
        self.state = next;
        Ok(())
    }

    fn warn_upgrade(&self, document: &ConfigDocument) {
        let remote_version = document.script_version.clone().unwrap_or_default();
        warn!(
            remote_version = %remote_version,
            running_version = %self.profile.version,
            "remote document written by a newer release"
        );
        self.notifier.notify(Notice::UpgradeRequired {
            remote_version,
            running_version: self.profile.version.clone(),
        });
    }

    /// Stores new lists locally, then pushes them if sync is enabled.
    pub async fn save_and_sync(
        &mut self,
        new_lists: BTreeMap<String, Vec<String>>,
        reason: &str,
    ) -> bool {
        let mut next = self.state.clone();
        for (name, entries) in new_lists {
            if !self.profile.has_list(&name) {
                warn!(list = %name, "ignoring list unknown to this script");
                continue;
            }
            next.lists.insert(name, normalize_entries(entries));
        }
        if let Err(err) = next.persist(&self.store, &self.profile).await {
            error!(error = %err, "failed to save lists");
            return false;
        }
        self.state = next;

        if !self.state.webdav.enabled {
            debug!("webdav sync disabled, saved locally only");
            return true;
        }
        self.push(reason).await
    }

    pub async fn sync_on_startup(&mut self) -> PullOutcome {
        if !self.state.webdav.enabled {
            return PullOutcome::Disabled;
        }
        info!(profile = %self.profile.name, version = %self.profile.version, "startup sync");
        self.pull().await
    }

    fn location(&self) -> Result<DocumentLocation, EngineError> {
        if !self.state.webdav.has_url() {
            return Err(EngineError::MissingUrl);
        }
        Ok(self.profile.location(&self.state.webdav.url)?)
    }
}

fn normalize_entries(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
