//! Filesystem watching (§4.10): wraps `notify` with the 200ms/50ms debounce
//! window the spec requires, drives [`crate::indexer::IncrementalIndexer`]
//! per batch, and exposes a small state machine for observability.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use canopy_ai::analysis::AnalysisProvider;
use canopy_ai::budget::Budget;
use canopy_ai::cache::AnalysisCache;
use canopy_core::path_utils::to_project_relative_posix;
use canopy_core::storage::{ComponentRepository, RelationshipRepository};
use canopy_core::{EngineConfig, IgnoreEngine};

use crate::indexer::{run_ai_analysis_pass, IncrementalIndexer, WatchApplyOutcome};

/// The state a [`WatcherService`] passes through over its lifetime (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Scanning,
    Indexed,
    Watching,
    Applying,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Changed,
    Removed,
}

/// Coalesces raw `notify` events for the same path into one debounced
/// `{changed, removed}` per [`EngineConfig::watcher_stability_window_ms`] of
/// quiet, polled every [`EngineConfig::watcher_poll_interval_ms`].
struct Debouncer {
    pending: HashMap<String, (RawKind, tokio::time::Instant)>,
    stability_window: Duration,
    poll_interval: Duration,
}

impl Debouncer {
    fn new(config: &EngineConfig) -> Self {
        Debouncer {
            pending: HashMap::new(),
            stability_window: Duration::from_millis(config.watcher_stability_window_ms),
            poll_interval: Duration::from_millis(config.watcher_poll_interval_ms),
        }
    }

    fn record(&mut self, path: String, kind: RawKind) {
        self.pending.insert(path, (kind, tokio::time::Instant::now()));
    }

    /// Drains every entry that has been quiet for at least the stability
    /// window. Callers loop this on a poll tick.
    fn drain_stable(&mut self) -> Vec<(String, RawKind)> {
        let now = tokio::time::Instant::now();
        let stable: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, (_, at))| now.duration_since(*at) >= self.stability_window)
            .map(|(path, _)| path.clone())
            .collect();
        stable.into_iter().filter_map(|path| self.pending.remove(&path).map(|(kind, _)| (path, kind))).collect()
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Thin wrapper around `notify`'s recommended watcher, translating its raw
/// events into project-relative POSIX paths and filtering through the
/// [`IgnoreEngine`].
struct FileWatcher {
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<(String, RawKind)>,
}

impl FileWatcher {
    fn start(root: PathBuf, ignore: Arc<IgnoreEngine>) -> Result<Self> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = raw_tx.send(event);
            }
            Err(e) => warn!("notify error: {e}"),
        })
        .context("failed to create filesystem watcher")?;
        watcher.watch(&root, RecursiveMode::Recursive).context("failed to watch workspace root")?;

        let (tx, rx) = mpsc::unbounded_channel();
        let root_for_task = root.clone();
        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                let kind = match event.kind {
                    EventKind::Remove(_) => RawKind::Removed,
                    EventKind::Create(_) | EventKind::Modify(_) => RawKind::Changed,
                    _ => continue,
                };
                for path in event.paths {
                    if IgnoreEngine::is_internal_state_path(&path) || ignore.should_ignore(&path) {
                        continue;
                    }
                    let relative = to_project_relative_posix(&root_for_task, &path);
                    if tx.send((relative, kind)).is_err() {
                        return;
                    }
                }
            }
        });

        Ok(FileWatcher { _watcher: watcher, events: rx })
    }
}

/// Orchestrates the initial full index, then the long-running debounced
/// watch loop, for a single workspace.
pub struct WatcherService<S> {
    workspace_root: PathBuf,
    config: EngineConfig,
    storage: Arc<S>,
    indexer: Arc<IncrementalIndexer>,
    ignore: Arc<IgnoreEngine>,
    ai_provider: Option<Arc<dyn AnalysisProvider>>,
    state_tx: watch::Sender<WatcherState>,
    state_rx: watch::Receiver<WatcherState>,
    cancelled: Arc<AtomicBool>,
}

impl<S> WatcherService<S>
where
    S: ComponentRepository + RelationshipRepository + 'static,
{
    pub fn new(workspace_root: PathBuf, config: EngineConfig, storage: Arc<S>) -> Self {
        let ignore = Arc::new(IgnoreEngine::build(&workspace_root, &config.exclude_extensions));
        let indexer = Arc::new(IncrementalIndexer::new(workspace_root.clone(), config.clone()));
        let (state_tx, state_rx) = watch::channel(WatcherState::Idle);
        WatcherService {
            workspace_root,
            config,
            storage,
            indexer,
            ignore,
            ai_provider: None,
            state_tx,
            state_rx,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_ai_provider(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.ai_provider = Some(provider);
        self
    }

    /// Observes the service's lifecycle state (`idle -> scanning -> indexed
    /// -> watching <-> applying`, terminal `closed`).
    pub fn state(&self) -> watch::Receiver<WatcherState> {
        self.state_rx.clone()
    }

    /// Signals the watch loop to stop after draining whatever batch is
    /// currently in flight, then release its filesystem handles and timers.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    fn set_state(&self, state: WatcherState) {
        let _ = self.state_tx.send(state);
    }

    /// Runs the initial full index (§4.10 step 1-4), leaving the service in
    /// `Indexed` state. Callers that only want a one-shot index (no ongoing
    /// watch) can stop here.
    pub fn run_initial_index(&self) -> Result<canopy_indexer::coordinator::IndexSummary> {
        self.set_state(WatcherState::Scanning);
        let summary = self.indexer.run_full_index(self.storage.as_ref(), self.storage.as_ref())?;
        self.set_state(WatcherState::Indexed);
        info!(
            files = summary.files_indexed,
            components = summary.components,
            relationships = summary.relationships,
            "initial index complete"
        );
        Ok(summary)
    }

    /// Runs the initial index, then watches `workspace_root` until
    /// cancelled. Blocks the calling task; intended to be spawned.
    pub async fn run(&self) -> Result<()> {
        if self.config.disable_watcher {
            self.run_initial_index()?;
            self.set_state(WatcherState::Closed);
            return Ok(());
        }
        self.run_initial_index()?;

        self.set_state(WatcherState::Watching);
        let mut watcher = FileWatcher::start(self.workspace_root.clone(), self.ignore.clone())?;
        let mut debouncer = Debouncer::new(&self.config);
        let mut poll = tokio::time::interval(debouncer.poll_interval);

        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                break;
            }
            tokio::select! {
                maybe_event = watcher.events.recv() => {
                    match maybe_event {
                        Some((path, kind)) => debouncer.record(path, kind),
                        None => break,
                    }
                }
                _ = poll.tick() => {
                    if debouncer.is_empty() {
                        continue;
                    }
                    let batch = debouncer.drain_stable();
                    if batch.is_empty() {
                        continue;
                    }
                    self.set_state(WatcherState::Applying);
                    for (path, kind) in batch {
                        if self.cancelled.load(Ordering::Relaxed) {
                            break;
                        }
                        match kind {
                            RawKind::Removed if self.workspace_root.join(&path).exists() => {
                                self.apply_one(&path).await;
                            }
                            RawKind::Removed => self.apply_removal(&path),
                            RawKind::Changed => self.apply_one(&path).await,
                        }
                    }
                    self.indexer.sweep_tombstones(self.storage.as_ref(), self.storage.as_ref());
                    self.set_state(WatcherState::Watching);
                }
            }
        }

        self.set_state(WatcherState::Closed);
        debug!("watcher closed for {}", self.workspace_root.display());
        Ok(())
    }

    async fn apply_one(&self, path: &str) {
        let outcome: WatchApplyOutcome = self.indexer.apply_change(path, self.storage.as_ref(), self.storage.as_ref());
        debug!(
            path,
            added = outcome.added,
            updated = outcome.updated,
            tombstoned = outcome.tombstoned,
            resolved = outcome.resolver_resolved,
            "applied change"
        );

        let Some(provider) = &self.ai_provider else { return };
        if !self.config.enable_ai_analysis {
            return;
        }
        let added = self.storage.get_by_file(path);
        let all = self.storage.get_all();
        let mut budget = Budget::new(self.config.ai_analysis_budget_tokens);
        let mut cache = AnalysisCache::new(Duration::from_secs(300));
        let count = run_ai_analysis_pass(
            provider.as_ref(),
            &mut budget,
            &mut cache,
            self.config.ai_analysis_confidence_threshold,
            path,
            &added,
            &all,
            self.storage.as_ref(),
        )
        .await;
        if count > 0 {
            debug!(path, count, "ai-analysis relationships accepted");
        }
    }

    fn apply_removal(&self, path: &str) {
        let outcome = self.indexer.apply_unlink(path, self.storage.as_ref(), self.storage.as_ref());
        debug!(
            path,
            removed = outcome.removed,
            reverted = outcome.relationships_reverted,
            deleted = outcome.relationships_deleted,
            "applied removal"
        );
    }
}

/// True when `path` looks like source the indexer should bother re-parsing —
/// a cheap pre-filter the watcher applies before handing a path to
/// [`IncrementalIndexer`], which still re-detects language on its own.
pub fn is_code_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|ext| {
        matches!(
            ext,
            "rs" | "ts"
                | "tsx"
                | "js"
                | "jsx"
                | "py"
                | "go"
                | "java"
                | "c"
                | "h"
                | "cpp"
                | "hpp"
                | "cc"
                | "php"
                | "html"
                | "css"
                | "md"
                | "sh"
                | "yaml"
                | "yml"
                | "toml"
                | "json"
                | "sql"
        )
    })
}
