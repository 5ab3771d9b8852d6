//! Live watcher over the log files of one session.
//!
//! Files are discovered and read through two independent trigger paths: OS
//! notifications via `notify-debouncer-full`, and a fixed-interval poll that
//! rescans the project directory and re-reads every tracked file. Both feed
//! the same per-file read path. Each tracked file has one reader task and a
//! gate that admits a single read at a time; a trigger that finds the gate
//! held is dropped, since the in-flight read picks up the new bytes anyway.
//!
//! Parsed records are fanned out on a `tokio::sync::broadcast` channel.
//! Records from one file arrive in file order; there is no ordering across
//! files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use futures_util::future::join_all;
use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::cursor::FileCursor;
use super::error::WatcherError;
use super::layout::{self, LogFileKind};
use super::parser::RecordParser;
use super::record::Record;
use crate::config::WatchConfig;

/// What to watch.
#[derive(Debug, Clone)]
pub enum WatchTarget {
    /// A session whose id is known up front.
    Session {
        project_dir: PathBuf,
        session_id: String,
    },
    /// Adopt log files created in `dir` at or after `since`, minus the
    /// configured creation grace.
    Directory { dir: PathBuf, since: SystemTime },
}

impl WatchTarget {
    /// Directory mode starting now.
    #[must_use]
    pub fn directory_from_now(dir: PathBuf) -> Self {
        Self::Directory {
            dir,
            since: SystemTime::now(),
        }
    }

    fn project_dir(&self) -> &Path {
        match self {
            Self::Session { project_dir, .. } => project_dir,
            Self::Directory { dir, .. } => dir,
        }
    }
}

/// Which file of the session a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Main,
    Agent(String),
}

/// A record emitted by the watcher.
#[derive(Debug, Clone)]
pub struct WatchedRecord {
    pub source: RecordSource,
    pub path: PathBuf,
    pub record: Record,
}

/// Whether a sub-agent file's records belong to the watched session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attribution {
    Pending,
    Accepted,
    Rejected,
}

struct ReadState {
    cursor: FileCursor,
    attribution: Attribution,
}

struct TrackedFile {
    path: PathBuf,
    source: RecordSource,
    /// Gate: at most one read in flight.
    state: tokio::sync::Mutex<ReadState>,
    wake: Notify,
}

impl TrackedFile {
    fn new(path: PathBuf, source: RecordSource) -> Self {
        let attribution = match source {
            RecordSource::Main => Attribution::Accepted,
            RecordSource::Agent(_) => Attribution::Pending,
        };
        Self {
            state: tokio::sync::Mutex::new(ReadState {
                cursor: FileCursor::new(path.clone()),
                attribution,
            }),
            path,
            source,
            wake: Notify::new(),
        }
    }
}

/// What a trigger does when the file's gate is held.
#[derive(Debug, Clone, Copy)]
enum Gate {
    Skip,
    Wait,
}

#[derive(Debug, Default)]
struct Identity {
    session_id: Option<String>,
    primary: Option<PathBuf>,
}

type PushWatcher = Debouncer<RecommendedWatcher, RecommendedCache>;

struct Shared {
    config: WatchConfig,
    parser: RecordParser,
    project_dir: PathBuf,
    /// Directory mode only.
    since: Option<SystemTime>,
    identity: RwLock<Identity>,
    files: Mutex<HashMap<PathBuf, Arc<TrackedFile>>>,
    records_tx: broadcast::Sender<Arc<WatchedRecord>>,
    errors_tx: mpsc::UnboundedSender<WatcherError>,
    push_tx: mpsc::UnboundedSender<DebounceEventResult>,
    push: Mutex<Option<PushWatcher>>,
    push_failed: AtomicBool,
    /// Held for reading while emitting; `stop` takes it for writing.
    emit_gate: RwLock<()>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

/// Watches the main file and sub-agent files of one session.
///
/// Subscribe before calling [`LogWatcher::start`] to see every record.
pub struct LogWatcher {
    shared: Arc<Shared>,
    errors_rx: Option<mpsc::UnboundedReceiver<WatcherError>>,
    push_rx: Option<mpsc::UnboundedReceiver<DebounceEventResult>>,
}

impl LogWatcher {
    /// Create a watcher. Nothing is read until [`LogWatcher::start`].
    #[must_use]
    pub fn new(target: WatchTarget, config: WatchConfig, parser: RecordParser) -> Self {
        let (records_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let (push_tx, push_rx) = mpsc::unbounded_channel();

        let project_dir = target.project_dir().to_path_buf();
        let (identity, since) = match target {
            WatchTarget::Session {
                project_dir,
                session_id,
            } => (
                Identity {
                    primary: Some(layout::session_file(&project_dir, &session_id)),
                    session_id: Some(session_id),
                },
                None,
            ),
            WatchTarget::Directory { since, .. } => (Identity::default(), Some(since)),
        };

        let shared = Arc::new(Shared {
            config,
            parser,
            project_dir,
            since,
            identity: RwLock::new(identity),
            files: Mutex::new(HashMap::new()),
            records_tx,
            errors_tx,
            push_tx,
            push: Mutex::new(None),
            push_failed: AtomicBool::new(false),
            emit_gate: RwLock::new(()),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        Self {
            shared,
            errors_rx: Some(errors_rx),
            push_rx: Some(push_rx),
        }
    }

    /// Start the notification and poll paths.
    ///
    /// Returns the out-of-band error channel. Errors reported there never
    /// stop monitoring.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher was already started or stopped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&mut self) -> Result<mpsc::UnboundedReceiver<WatcherError>, WatcherError> {
        if self.shared.cancel.is_cancelled() {
            return Err(WatcherError::Stopped);
        }
        let (Some(errors_rx), Some(push_rx)) = (self.errors_rx.take(), self.push_rx.take())
        else {
            return Err(WatcherError::AlreadyStarted);
        };

        tracing::info!(
            dir = %self.shared.project_dir.display(),
            session_id = ?self.session_id(),
            "Starting log watcher"
        );

        let shared = Arc::clone(&self.shared);
        self.shared
            .tasks
            .spawn(async move { shared.run_push(push_rx).await });

        let shared = Arc::clone(&self.shared);
        self.shared.tasks.spawn(async move { shared.run_poll().await });

        Ok(errors_rx)
    }

    /// Stop all trigger sources. Idempotent.
    ///
    /// No record is emitted after this returns. Reads already in flight may
    /// finish but their records are discarded. Subscribers are not closed.
    pub fn stop(&self) {
        if self.shared.cancel.is_cancelled() {
            return;
        }
        self.shared.cancel.cancel();
        // Wait out any emitter that passed its cancellation check.
        drop(
            self.shared
                .emit_gate
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        self.shared
            .push
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.shared.tasks.close();
        tracing::info!(dir = %self.shared.project_dir.display(), "Log watcher stopped");
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Subscribe to parsed records.
    ///
    /// A subscriber that falls more than the channel capacity behind gets
    /// `RecvError::Lagged` with the number of records it missed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<WatchedRecord>> {
        self.shared.records_tx.subscribe()
    }

    /// [`LogWatcher::subscribe`] as a `Stream`.
    #[must_use]
    pub fn stream(&self) -> BroadcastStream<Arc<WatchedRecord>> {
        BroadcastStream::new(self.subscribe())
    }

    /// Session id, once known.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.shared.session_id()
    }

    /// The adopted main file, once known.
    #[must_use]
    pub fn primary_file(&self) -> Option<PathBuf> {
        self.shared
            .identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .primary
            .clone()
    }

    /// Paths of all adopted files, sorted.
    #[must_use]
    pub fn tracked_files(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .shared
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Run one discovery scan and read every tracked file now.
    ///
    /// Unlike background triggers, this waits for a read already in flight
    /// on a file and then reads it again, so everything on disk when the
    /// call started has been emitted once it returns.
    pub async fn poll_now(&self) {
        if self.shared.cancel.is_cancelled() {
            return;
        }
        self.shared.scan().await;
        let files = self.shared.tracked();
        join_all(files.iter().map(|file| self.shared.drain(file, Gate::Wait))).await;
    }
}

impl Drop for LogWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn session_id(&self) -> Option<String> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session_id
            .clone()
    }

    fn tracked(&self) -> Vec<Arc<TrackedFile>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn report(&self, error: WatcherError) {
        tracing::debug!(error = %error, "Watcher error");
        // Nobody listening is fine.
        let _ = self.errors_tx.send(error);
    }

    async fn run_push(self: Arc<Self>, mut push_rx: mpsc::UnboundedReceiver<DebounceEventResult>) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                result = push_rx.recv() => match result {
                    Some(Ok(events)) => {
                        for event in &events {
                            self.handle_notify_event(event).await;
                        }
                    }
                    Some(Err(errors)) => {
                        for error in errors {
                            self.report(WatcherError::Notify(error));
                        }
                    }
                    None => break,
                },
            }
        }
    }

    async fn run_poll(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.poll_once().await,
            }
        }
    }

    async fn poll_once(self: &Arc<Self>) {
        let dir_present = tokio::fs::metadata(&self.project_dir)
            .await
            .is_ok_and(|m| m.is_dir());
        if dir_present {
            self.ensure_push_watch();
        } else {
            tracing::trace!(dir = %self.project_dir.display(), "Project directory not present yet");
        }
        self.scan().await;
        for file in self.tracked() {
            file.wake.notify_one();
        }
    }

    /// Attach the notification watcher once the directory exists. A failed
    /// attach is reported once and the poll path carries on alone.
    fn ensure_push_watch(&self) {
        if self.push_failed.load(Ordering::Relaxed) || self.cancel.is_cancelled() {
            return;
        }
        let mut push = self.push.lock().unwrap_or_else(PoisonError::into_inner);
        if push.is_some() {
            return;
        }

        let push_tx = self.push_tx.clone();
        let debouncer = new_debouncer(self.config.debounce(), None, move |result| {
            let _ = push_tx.send(result);
        });
        let mut debouncer = match debouncer {
            Ok(d) => d,
            Err(e) => {
                self.push_failed.store(true, Ordering::Relaxed);
                self.report(WatcherError::Notify(e));
                return;
            }
        };

        match debouncer.watch(&self.project_dir, RecursiveMode::Recursive) {
            Ok(()) => {
                tracing::debug!(dir = %self.project_dir.display(), "Attached file notifications");
                *push = Some(debouncer);
            }
            Err(source) => {
                self.push_failed.store(true, Ordering::Relaxed);
                self.report(WatcherError::WatchDirectory {
                    path: self.project_dir.clone(),
                    source,
                });
            }
        }
    }

    async fn handle_notify_event(self: &Arc<Self>, event: &DebouncedEvent) {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }
        for path in &event.paths {
            if path.extension().is_none_or(|ext| ext != layout::LOG_EXTENSION) {
                continue;
            }
            let existing = self
                .files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(path)
                .cloned();
            match existing {
                Some(file) => file.wake.notify_one(),
                None if self.is_candidate_location(path) => self.consider(path).await,
                None => {}
            }
        }
    }

    /// Flat project directory, or the nested sub-agent directory of the
    /// watched session.
    fn is_candidate_location(&self, path: &Path) -> bool {
        let Some(parent) = path.parent() else {
            return false;
        };
        if parent == self.project_dir {
            return true;
        }
        self.session_id()
            .is_some_and(|id| parent == layout::subagents_dir(&self.project_dir, &id))
    }

    /// Discover files not yet tracked.
    async fn scan(self: &Arc<Self>) {
        let expected_main = self
            .identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .primary
            .clone();
        if let (None, Some(main)) = (self.since, expected_main) {
            // Session mode tracks its main file before it exists.
            self.adopt(&main, RecordSource::Main);
        }

        let mut candidates = layout::jsonl_files(&self.project_dir).await;
        if let Some(session_id) = self.session_id() {
            candidates.extend(
                layout::jsonl_files(&layout::subagents_dir(&self.project_dir, &session_id)).await,
            );
        }

        for path in candidates {
            let known = self
                .files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&path);
            if !known {
                self.consider(&path).await;
            }
        }
    }

    /// Decide whether a newly seen file joins the session.
    async fn consider(self: &Arc<Self>, path: &Path) {
        let Some(kind) = layout::classify(path) else {
            return;
        };
        if !self.created_in_window(path).await {
            tracing::trace!(path = %path.display(), "Ignoring file created before watch start");
            return;
        }

        match kind {
            LogFileKind::Agent { agent_id } => self.adopt(path, RecordSource::Agent(agent_id)),
            LogFileKind::Main { session_id } => {
                if self.claim_primary(path, &session_id) {
                    self.adopt(path, RecordSource::Main);
                }
            }
        }
    }

    async fn created_in_window(&self, path: &Path) -> bool {
        let Some(since) = self.since else {
            return true;
        };
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            return false;
        };
        let Ok(created) = metadata.created().or_else(|_| metadata.modified()) else {
            return false;
        };
        since
            .checked_sub(self.config.creation_grace())
            .is_none_or(|floor| created >= floor)
    }

    /// The first main file claimed becomes the primary file. Returns whether
    /// `path` is the primary file.
    fn claim_primary(&self, path: &Path, stem: &str) -> bool {
        let mut identity = self
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(primary) = &identity.primary {
            return primary == path;
        }
        identity.primary = Some(path.to_path_buf());
        if identity.session_id.is_none() {
            identity.session_id = Some(stem.to_string());
        }
        tracing::info!(
            path = %path.display(),
            session_id = ?identity.session_id,
            "Adopted primary session file"
        );
        true
    }

    /// Track a file and spawn its reader. No-op if already tracked.
    fn adopt(self: &Arc<Self>, path: &Path, source: RecordSource) {
        if self.cancel.is_cancelled() {
            return;
        }
        let file = {
            let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
            if files.contains_key(path) {
                return;
            }
            let file = Arc::new(TrackedFile::new(path.to_path_buf(), source));
            files.insert(path.to_path_buf(), Arc::clone(&file));
            file
        };
        tracing::debug!(path = %path.display(), source = ?file.source, "Tracking log file");

        let shared = Arc::clone(self);
        let reader = Arc::clone(&file);
        self.tasks.spawn(async move { shared.run_reader(reader).await });
        file.wake.notify_one();
    }

    async fn run_reader(self: Arc<Self>, file: Arc<TrackedFile>) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = file.wake.notified() => self.drain(&file, Gate::Skip).await,
            }
        }
    }

    /// Read whatever is new in `file` and emit its records.
    async fn drain(&self, file: &TrackedFile, gate: Gate) {
        let mut state = match gate {
            Gate::Wait => file.state.lock().await,
            Gate::Skip => {
                let Ok(state) = file.state.try_lock() else {
                    tracing::trace!(path = %file.path.display(), "Read in flight, dropping trigger");
                    return;
                };
                state
            }
        };
        if self.cancel.is_cancelled() || state.attribution == Attribution::Rejected {
            return;
        }

        let expected_session = self.session_id();
        if state.attribution == Attribution::Pending && expected_session.is_none() {
            // Cannot attribute yet; leave the bytes for later.
            return;
        }

        let read = match state.cursor.read_new_lines().await {
            Ok(read) => read,
            Err(e) => {
                self.report(e);
                return;
            }
        };
        if read.reset {
            tracing::debug!(path = %file.path.display(), "Re-reading truncated file");
        }

        let mut records = Vec::new();
        for record in read.lines.iter().filter_map(|line| self.parser.parse(line)) {
            if state.attribution == Attribution::Pending {
                if record.session_id() == expected_session.as_deref() {
                    state.attribution = Attribution::Accepted;
                } else {
                    tracing::warn!(
                        path = %file.path.display(),
                        found = ?record.session_id(),
                        expected = ?expected_session,
                        "Sub-agent file belongs to another session, excluding it"
                    );
                    state.attribution = Attribution::Rejected;
                    return;
                }
            }
            records.push(record);
        }

        self.emit(file, records);
    }

    fn emit(&self, file: &TrackedFile, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        let _gate = self.emit_gate.read().unwrap_or_else(PoisonError::into_inner);
        if self.cancel.is_cancelled() {
            return;
        }
        for record in records {
            // Err only means there are no subscribers.
            let _ = self.records_tx.send(Arc::new(WatchedRecord {
                source: file.source.clone(),
                path: file.path.clone(),
                record,
            }));
        }
    }
}
