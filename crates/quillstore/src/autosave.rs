//! # Autosave
//!
//! Debounced, per-document saving for an editing surface.
//!
//! ```text
//!            schedule / flush
//!   idle ───────────────────────▶ saving ──▶ saved
//!     ▲                             │  └────▶ error    (save failed, online)
//!     │ cancel                      └───────▶ offline  (save failed, offline)
//!     └──────────────────── saved / error / offline
//! ```
//!
//! ## Guarantees
//!
//! - **Coalescing**: [`Autosave::schedule`] replaces the pending content and
//!   restarts the debounce timer, so a burst of edits produces one save with
//!   the last content.
//! - **At most one save in flight per document**: a flush that arrives while
//!   a save is running is a no-op ([`FlushOutcome::Skipped`]). Content
//!   scheduled meanwhile is saved once the running save completes.
//! - **Bounded saves**: each attempt is wrapped in a timeout; expiry is an
//!   `error` transition and [`QuillError::SaveTimeout`].
//! - **No polling**: every transition is pushed to [`Autosave::on_state`]
//!   listeners, called synchronously and outside the internal lock.
//!
//! An in-flight save is never cancelled. [`Autosave::cancel`] only drops
//! pending timers and content.
//!
//! The save function is injected, so the pipeline does not know where
//! content goes; [`storage_saver`] is the one that writes through a
//! [`StorageManager`].

use crate::config::QuillConfig;
use crate::error::{QuillError, Result};
use crate::store::StorageManager;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveState {
    #[default]
    Idle,
    Saving,
    Saved,
    Offline,
    Error,
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaveState::Idle => "idle",
            SaveState::Saving => "saving",
            SaveState::Saved => "saved",
            SaveState::Offline => "offline",
            SaveState::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEvent {
    /// `None` for pipeline-wide transitions such as cancel.
    pub document_id: Option<String>,
    pub state: SaveState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Content was persisted; carries the checksum the save function returned.
    Saved(String),
    /// A save for this document was already running.
    Skipped,
    /// Nothing was pending.
    Nothing,
}

pub type SaveFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;

/// `(document_id, content) -> checksum`
pub type SaveFn = Arc<dyn Fn(String, String) -> SaveFuture + Send + Sync>;

pub type StateListener = Arc<dyn Fn(&SaveEvent) + Send + Sync>;

/// Wrap an async closure as a [`SaveFn`].
pub fn save_fn<F, Fut>(f: F) -> SaveFn
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    Arc::new(move |id, content| Box::pin(f(id, content)))
}

/// Hex SHA-256 of the content.
pub fn checksum_of(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// A save function that stores the content as a string value under
/// `key_for(document_id)` and returns [`checksum_of`] the content.
pub fn storage_saver<K>(manager: Arc<StorageManager>, key_for: K) -> SaveFn
where
    K: Fn(&str) -> String + Send + Sync + 'static,
{
    save_fn(move |document_id: String, content: String| {
        let manager = Arc::clone(&manager);
        let key = key_for(&document_id);
        async move {
            let checksum = checksum_of(&content);
            tokio::task::spawn_blocking(move || manager.put(&key, &Value::String(content)))
                .await
                .map_err(|e| QuillError::Save {
                    document_id,
                    message: e.to_string(),
                })??;
            Ok(checksum)
        }
    })
}

/// Whether saves can currently reach their destination.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity flag flipped by whoever watches the network.
#[derive(Debug)]
pub struct SharedConnectivity {
    online: AtomicBool,
}

impl SharedConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for SharedConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for SharedConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Lives from the first edit of a document until a save leaves nothing
/// pending for it.
#[derive(Default)]
struct DocTask {
    pending: Option<String>,
    timer: Option<JoinHandle<()>>,
    /// Set on every arm; a timer only fires if it is still current.
    generation: u64,
    in_flight: bool,
}

impl DocTask {
    fn is_idle(&self) -> bool {
        !self.in_flight && self.pending.is_none() && self.timer.is_none()
    }
}

#[derive(Default)]
struct Shared {
    state: SaveState,
    docs: HashMap<String, DocTask>,
    checksums: HashMap<String, String>,
    listeners: Vec<(u64, StateListener)>,
    next_listener: u64,
    /// Generations come from one counter so a re-created task never reuses
    /// the number of a stale timer.
    next_generation: u64,
    destroyed: bool,
}

impl Shared {
    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn release_if_idle(&mut self, document_id: &str) {
        if self.docs.get(document_id).is_some_and(DocTask::is_idle) {
            self.docs.remove(document_id);
        }
    }

    /// Record a transition and hand back what to notify once unlocked.
    fn transition(
        &mut self,
        document_id: Option<&str>,
        state: SaveState,
    ) -> (Vec<StateListener>, SaveEvent) {
        debug!(document = document_id.unwrap_or("*"), from = %self.state, to = %state, "autosave state");
        self.state = state;
        let listeners = self.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        let event = SaveEvent {
            document_id: document_id.map(str::to_string),
            state,
        };
        (listeners, event)
    }
}

fn emit((listeners, event): (Vec<StateListener>, SaveEvent)) {
    for listener in listeners {
        listener(&event);
    }
}

struct Inner {
    save: SaveFn,
    connectivity: Arc<dyn Connectivity>,
    debounce: Duration,
    timeout: Duration,
    handle: Handle,
    shared: Mutex<Shared>,
}

enum Source {
    Explicit(String),
    Pending,
    Timer(u64),
}

/// Debounced autosave pipeline. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Autosave {
    inner: Arc<Inner>,
}

/// Timing and connectivity for an [`Autosave`].
#[derive(Clone)]
pub struct AutosaveOptions {
    pub debounce: Duration,
    pub timeout: Duration,
    pub connectivity: Arc<dyn Connectivity>,
}

impl AutosaveOptions {
    pub fn from_config(config: &QuillConfig) -> Self {
        Self {
            debounce: config.autosave_debounce(),
            timeout: config.autosave_timeout(),
            connectivity: Arc::new(SharedConnectivity::default()),
        }
    }
}

impl Default for AutosaveOptions {
    fn default() -> Self {
        Self::from_config(&QuillConfig::default())
    }
}

impl Autosave {
    /// Must be called from within a tokio runtime; timers run on it.
    pub fn new(save: SaveFn) -> Result<Self> {
        Self::with_options(save, AutosaveOptions::default())
    }

    pub fn with_options(save: SaveFn, options: AutosaveOptions) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| QuillError::Runtime(format!("autosave needs a tokio runtime: {}", e)))?;
        Ok(Self {
            inner: Arc::new(Inner {
                save,
                connectivity: options.connectivity,
                debounce: options.debounce,
                timeout: options.timeout,
                handle,
                shared: Mutex::new(Shared::default()),
            }),
        })
    }

    /// Replace the pending content for a document and restart its timer.
    pub fn schedule(&self, document_id: &str, content: impl Into<String>) {
        let mut shared = self.inner.shared.lock();
        if shared.destroyed {
            debug!(document = document_id, "autosave destroyed; schedule ignored");
            return;
        }
        let generation = shared.next_generation();
        let task = shared.docs.entry(document_id.to_string()).or_default();
        task.pending = Some(content.into());
        if let Some(timer) = task.timer.take() {
            timer.abort();
        }
        self.arm(task, document_id, generation);
    }

    fn arm(&self, task: &mut DocTask, document_id: &str, generation: u64) {
        task.generation = generation;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let debounce = self.inner.debounce;
        let id = document_id.to_string();
        task.timer = Some(self.inner.handle.spawn(async move {
            tokio::time::sleep(debounce).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let autosave = Autosave { inner };
            if let Err(e) = autosave.run(&id, Source::Timer(generation)).await {
                warn!(document = %id, error = %e, "autosave failed");
            }
        }));
    }

    /// Save `content` now, bypassing the debounce timer.
    pub async fn flush(&self, document_id: &str, content: impl Into<String>) -> Result<FlushOutcome> {
        self.run(document_id, Source::Explicit(content.into())).await
    }

    /// Save whatever is pending for the document now.
    pub async fn flush_pending(&self, document_id: &str) -> Result<FlushOutcome> {
        self.run(document_id, Source::Pending).await
    }

    async fn run(&self, document_id: &str, source: Source) -> Result<FlushOutcome> {
        let from_pending = !matches!(source, Source::Explicit(_));
        let (content, notify) = {
            let mut shared = self.inner.shared.lock();
            let task = if from_pending {
                match shared.docs.get_mut(document_id) {
                    Some(task) => task,
                    None => return Ok(FlushOutcome::Nothing),
                }
            } else {
                shared.docs.entry(document_id.to_string()).or_default()
            };
            match source {
                Source::Timer(generation) => {
                    if task.generation != generation {
                        return Ok(FlushOutcome::Nothing);
                    }
                    task.timer = None;
                }
                _ => {
                    if let Some(timer) = task.timer.take() {
                        timer.abort();
                    }
                }
            }
            if task.in_flight {
                debug!(document = document_id, "save already in flight");
                return Ok(FlushOutcome::Skipped);
            }
            let content = match source {
                Source::Explicit(content) => Some(content),
                Source::Pending | Source::Timer(_) => task.pending.take(),
            };
            let Some(content) = content else {
                shared.release_if_idle(document_id);
                return Ok(FlushOutcome::Nothing);
            };
            task.pending = None;
            task.in_flight = true;
            (content, shared.transition(Some(document_id), SaveState::Saving))
        };
        emit(notify);
        // Content taken from the pending slot goes back there if the save fails.
        let retry = from_pending.then(|| content.clone());

        let attempt = tokio::time::timeout(
            self.inner.timeout,
            (self.inner.save)(document_id.to_string(), content),
        )
        .await;

        let (result, notify) = {
            let mut shared = self.inner.shared.lock();
            if let Some(task) = shared.docs.get_mut(document_id) {
                task.in_flight = false;
            }
            self.rearm_if_pending(&mut shared, document_id);
            if !matches!(attempt, Ok(Ok(_))) && !shared.destroyed {
                if let (Some(content), Some(task)) = (retry, shared.docs.get_mut(document_id)) {
                    // A newer edit already pending wins over the failed one.
                    if task.pending.is_none() {
                        task.pending = Some(content);
                    }
                }
            }
            shared.release_if_idle(document_id);

            match attempt {
                Ok(Ok(checksum)) => {
                    shared
                        .checksums
                        .insert(document_id.to_string(), checksum.clone());
                    let notify = shared.transition(Some(document_id), SaveState::Saved);
                    (Ok(FlushOutcome::Saved(checksum)), notify)
                }
                Ok(Err(e)) => {
                    let state = if self.inner.connectivity.is_online() {
                        SaveState::Error
                    } else {
                        SaveState::Offline
                    };
                    let notify = shared.transition(Some(document_id), state);
                    (Err(e), notify)
                }
                Err(_) => {
                    let notify = shared.transition(Some(document_id), SaveState::Error);
                    let err = QuillError::SaveTimeout {
                        document_id: document_id.to_string(),
                    };
                    (Err(err), notify)
                }
            }
        };
        emit(notify);
        result
    }

    /// Content scheduled during a save whose timer fired (and was skipped)
    /// while the save ran gets a fresh timer.
    fn rearm_if_pending(&self, shared: &mut Shared, document_id: &str) {
        if shared.destroyed {
            return;
        }
        let generation = shared.next_generation();
        if let Some(task) = shared.docs.get_mut(document_id) {
            if task.pending.is_some() && task.timer.is_none() {
                self.arm(task, document_id, generation);
            }
        }
    }

    pub fn is_pending(&self, document_id: &str) -> bool {
        self.inner
            .shared
            .lock()
            .docs
            .get(document_id)
            .is_some_and(|t| t.pending.is_some())
    }

    /// Last checksum persisted for the document.
    pub fn checksum(&self, document_id: &str) -> Option<String> {
        self.inner.shared.lock().checksums.get(document_id).cloned()
    }

    pub fn get_state(&self) -> SaveState {
        self.inner.shared.lock().state
    }

    pub fn on_state<F>(&self, listener: F) -> StateSubscription
    where
        F: Fn(&SaveEvent) + Send + Sync + 'static,
    {
        let mut shared = self.inner.shared.lock();
        let id = shared.next_listener;
        shared.next_listener += 1;
        shared.listeners.push((id, Arc::new(listener)));
        StateSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Drop every pending timer and its content without saving.
    pub fn cancel(&self) {
        let notify = {
            let mut shared = self.inner.shared.lock();
            let mut busy = false;
            for task in shared.docs.values_mut() {
                if let Some(timer) = task.timer.take() {
                    timer.abort();
                }
                task.pending = None;
                busy |= task.in_flight;
            }
            shared.docs.retain(|_, task| task.in_flight);
            (!busy).then(|| shared.transition(None, SaveState::Idle))
        };
        if let Some(notify) = notify {
            emit(notify);
        }
    }

    pub fn cancel_document(&self, document_id: &str) {
        let mut shared = self.inner.shared.lock();
        if let Some(task) = shared.docs.get_mut(document_id) {
            if let Some(timer) = task.timer.take() {
                timer.abort();
            }
            task.pending = None;
        }
        shared.release_if_idle(document_id);
    }

    /// Cancel, then release listeners and cached checksums. Later schedules
    /// are ignored.
    pub fn destroy(&self) {
        self.cancel();
        let mut shared = self.inner.shared.lock();
        shared.destroyed = true;
        shared.listeners.clear();
        shared.checksums.clear();
        shared.docs.retain(|_, task| task.in_flight);
    }
}

/// Handle returned by [`Autosave::on_state`].
pub struct StateSubscription {
    id: u64,
    inner: Weak<Inner>,
}

impl StateSubscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.shared.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
