//! The executive manager: reparse, debounce, run, write back.
//!
//! Owns the region map, the per-region execution states, the adapter set,
//! and the single edit-application path. A document change bumps the
//! code-only iteration token; a pass is scheduled behind a debounce
//! window, executes regions strictly in document order — one at a time,
//! later regions may depend on bindings from earlier ones — and flushes
//! each settled result into the document before starting the next region.
//!
//! Cancellation is cooperative: every suspension point re-checks the
//! pass's token against the live one and stops issuing writes on
//! mismatch. No kill signal is sent; an in-flight sandboxed call is
//! allowed to finish and its result is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::doc::{BlockKind, DispatchOutcome, DocumentSnapshot, InMemoryDocument, Transaction};
use crate::error::Result;
use crate::guard::guard_filter;
use crate::regions::{find_code_regions, RegionMap};
use crate::render::{self, Decoration, RenderSpan};
use crate::runtime::{ParsedBlock, ScriptRuntime};
use crate::state::{DocumentRuntimeState, LogOutput, RunError, RunValue, ScriptRuntimeState};

/// Timing knobs for the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Quiet window between the last code change and the start of a pass.
    pub debounce: Duration,
    /// Pause between regions, letting pending edits and UI interleave.
    pub yield_pause: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(400),
            yield_pause: Duration::from_millis(5),
        }
    }
}

/// State owned by the scheduler, behind one async lock.
struct SchedulerState {
    regions: RegionMap,
    /// Index-aligned: the adapter that owns each region.
    active_runtimes: Vec<Option<Arc<dyn ScriptRuntime>>>,
    /// Authoritative rendered spans per region, feeding both the persisted
    /// result text and the live decoration list.
    rendered: Vec<Option<Vec<RenderSpan>>>,
}

struct EngineInner {
    config: EngineConfig,
    document: RwLock<InMemoryDocument>,
    /// Append-only adapter set.
    runtimes: std::sync::RwLock<Vec<Arc<dyn ScriptRuntime>>>,
    scheduler: Mutex<SchedulerState>,
    /// Replaced wholesale on every transition; readable from sync contexts
    /// (the log sink).
    document_state: std::sync::RwLock<Arc<DocumentRuntimeState>>,
    /// Region currently executing, for log attribution.
    executing_index: std::sync::Mutex<Option<usize>>,
    /// Generation of the most recently scheduled pass.
    pass_seq: AtomicU64,
    /// The live code-only iteration token.
    live_token: AtomicU64,
}

/// Orchestrates the reparse → debounce → run → write-back cycle.
///
/// Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct ExecutiveManager {
    inner: Arc<EngineInner>,
}

impl ExecutiveManager {
    /// Wrap a document. The edit guard is installed as a transaction
    /// filter on the document before the engine takes ownership.
    pub fn new(document: InMemoryDocument) -> Self {
        Self::with_config(document, EngineConfig::default())
    }

    pub fn with_config(mut document: InMemoryDocument, config: EngineConfig) -> Self {
        document.add_filter(guard_filter());
        Self {
            inner: Arc::new(EngineInner {
                config,
                document: RwLock::new(document),
                runtimes: std::sync::RwLock::new(Vec::new()),
                scheduler: Mutex::new(SchedulerState {
                    regions: RegionMap::empty(),
                    active_runtimes: Vec::new(),
                    rendered: Vec::new(),
                }),
                document_state: std::sync::RwLock::new(Arc::new(DocumentRuntimeState::default())),
                executing_index: std::sync::Mutex::new(None),
                pass_seq: AtomicU64::new(0),
                live_token: AtomicU64::new(0),
            }),
        }
    }

    /// Register an execution backend and re-analyze the document.
    ///
    /// The set is append-only. The engine installs its log sink on the
    /// adapter; output arriving while a region executes is attributed to
    /// it, otherwise to the most recently known active region.
    pub async fn register_runtime(&self, runtime: Arc<dyn ScriptRuntime>) {
        let weak = Arc::downgrade(&self.inner);
        runtime.set_log_sink(Arc::new(move |output| {
            if let Some(inner) = weak.upgrade() {
                handle_log(&inner, output);
            }
        }));
        self.inner
            .runtimes
            .write()
            .expect("runtime set lock poisoned")
            .push(runtime);
        self.refresh(true).await;
    }

    /// The single edit-application path: user edits and engine write-backs
    /// both commit through here, serialized on the document lock.
    pub async fn dispatch(&self, tr: Transaction) -> Result<DispatchOutcome> {
        let had_steps = !tr.is_empty();
        let outcome = { self.inner.document.write().await.apply(&tr)? };
        if outcome == DispatchOutcome::Applied && had_steps {
            self.refresh(false).await;
        }
        Ok(outcome)
    }

    /// Undo the most recent user edit. Returns `false` when there is
    /// nothing to undo or the inverse was vetoed (the entry is kept).
    pub async fn undo(&self) -> Result<bool> {
        let Some(tr) = self.inner.document.write().await.pop_undo() else {
            return Ok(false);
        };
        let retry = tr.clone();
        match self.dispatch(tr).await? {
            DispatchOutcome::Applied => Ok(true),
            DispatchOutcome::Rejected => {
                self.inner.document.write().await.restore_undo(retry);
                Ok(false)
            }
        }
    }

    /// Force a full re-analysis and re-execution pass, as if every code
    /// block had changed.
    pub async fn rerun(&self) {
        self.refresh(true).await;
    }

    /// The current document runtime state. Consumers detect change by
    /// `Arc::ptr_eq`: every transition replaces the value wholesale.
    pub fn document_state(&self) -> Arc<DocumentRuntimeState> {
        self.inner
            .document_state
            .read()
            .expect("document state lock poisoned")
            .clone()
    }

    /// The current region map (regions plus iteration counters).
    pub async fn regions(&self) -> RegionMap {
        self.inner.scheduler.lock().await.regions.clone()
    }

    /// Snapshot of the underlying document.
    pub async fn snapshot(&self) -> DocumentSnapshot {
        self.inner.document.read().await.snapshot()
    }

    /// Count of applied doc-changing transactions.
    pub async fn document_version(&self) -> u64 {
        self.inner.document.read().await.version()
    }

    /// Live overlay decorations derived from the authoritative rendered
    /// spans, positioned inside each region's result node.
    pub async fn decorations(&self) -> Vec<Decoration> {
        let sched = self.inner.scheduler.lock().await;
        let mut out = Vec::new();
        for (index, region) in sched.regions.regions.iter().enumerate() {
            let Some(result) = region.result else {
                continue;
            };
            let Some(spans) = sched.rendered.get(index).and_then(Option::as_ref) else {
                continue;
            };
            out.extend(render::decorations(spans, result.pos + 1));
        }
        out
    }

    /// Recompute regions; when the code-only token advanced (or `force`),
    /// re-analyze and schedule a debounced pass.
    ///
    /// Returns an explicitly boxed `Send` future rather than an `async fn`'s
    /// opaque type. This severs the recursive `Send` inference cycle
    /// (run_pass -> flush -> dispatch -> refresh -> spawn(run_pass)): the
    /// declared `+ Send` return type lets `dispatch` await it without the
    /// compiler unfolding `refresh`'s hidden generator type. Behavior is
    /// identical to the equivalent `async fn`.
    fn refresh(
        &self,
        force: bool,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
        let snapshot = self.inner.document.read().await.snapshot();
        let mut sched = self.inner.scheduler.lock().await;

        let prev_token = sched.regions.code_only_iteration;
        sched.regions = find_code_regions(&snapshot, &sched.regions);
        let token = sched.regions.code_only_iteration;
        self.inner.live_token.store(token, Ordering::Release);

        if token == prev_token && !force {
            return;
        }

        self.reparse(&mut sched, &snapshot);
        drop(sched);

        let seq = self.inner.pass_seq.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(token, seq, "scheduling execution pass");
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_pass(seq, token).await;
        });
        })
    }

    /// A scheduled pass is current until a newer pass is scheduled or the
    /// code-only token moves.
    fn pass_is_current(&self, seq: u64, token: u64) -> bool {
        self.inner.pass_seq.load(Ordering::Acquire) == seq
            && self.inner.live_token.load(Ordering::Acquire) == token
    }

    /// Static analysis across all registered adapters: set every region's
    /// state to parsed or unknown, pick each region's owning adapter, and
    /// union declared variables.
    fn reparse(&self, sched: &mut SchedulerState, snapshot: &DocumentSnapshot) {
        *self
            .inner
            .executing_index
            .lock()
            .expect("executing index lock poisoned") = None;

        let runtimes: Vec<Arc<dyn ScriptRuntime>> = self
            .inner
            .runtimes
            .read()
            .expect("runtime set lock poisoned")
            .clone();

        let count = sched.regions.regions.len();
        let mut claimed: Vec<Option<ParsedBlock>> = vec![None; count];
        let mut active: Vec<Option<Arc<dyn ScriptRuntime>>> = vec![None; count];
        let mut globals: Vec<String> = Vec::new();

        for runtime in &runtimes {
            let parsed = runtime.parse(&sched.regions.regions, snapshot);
            for (index, block) in parsed.into_iter().enumerate() {
                if index >= count {
                    break;
                }
                let Some(block) = block else { continue };
                globals.extend(block.variables.iter().cloned());

                if claimed[index].is_some() {
                    // merging states from multiple adapters is deliberately
                    // not supported; first registration wins
                    let winner = active[index].as_ref().map(|r| r.name().to_string());
                    warn!(
                        region = index,
                        winner = winner.as_deref().unwrap_or("?"),
                        loser = runtime.name(),
                        "multiple adapters claimed one region; keeping the first"
                    );
                    continue;
                }
                claimed[index] = Some(block);
                active[index] = Some(runtime.clone());
            }
        }

        globals.sort();
        globals.dedup();

        let prev = self.document_state();
        let mut states: Vec<Option<ScriptRuntimeState>> = Vec::with_capacity(count);
        for (index, block) in claimed.into_iter().enumerate() {
            let prev_state = prev.code_block_states.get(index).and_then(Option::as_ref);
            let stale = prev_state.and_then(ScriptRuntimeState::to_stale);
            states.push(Some(match block {
                Some(block) => ScriptRuntimeState::Parsed {
                    variables: block.variables,
                    stale,
                },
                // no artifact: the region fails to unknown (its result
                // shows the placeholder) and the pass skips it
                None => ScriptRuntimeState::Unknown { stale },
            }));
        }

        self.replace_document_state(DocumentRuntimeState {
            code_block_states: states,
            global_variables: globals,
        });

        sched.active_runtimes = active;
        sched.rendered.resize(count, None);
    }

    /// One debounced pass: flush the analyzed states, then run each owned
    /// region in document order, flushing after every settle.
    async fn run_pass(&self, seq: u64, token: u64) {
        tokio::time::sleep(self.inner.config.debounce).await;
        if !self.pass_is_current(seq, token) {
            debug!(seq, "pass superseded during debounce");
            return;
        }

        if let Err(e) = self.flush_to_document().await {
            error!(error = %e, "failed to write runtime state back");
            return;
        }
        if !self.pass_is_current(seq, token) {
            return;
        }
        tokio::time::sleep(self.inner.config.yield_pause).await;

        let count = { self.inner.scheduler.lock().await.regions.regions.len() };
        for index in 0..count {
            if !self.pass_is_current(seq, token) {
                debug!(seq, index, "pass superseded; stopping before next region");
                return;
            }

            let runtime = {
                let sched = self.inner.scheduler.lock().await;
                sched.active_runtimes.get(index).cloned().flatten()
            };
            // regions with no artifact stay unknown; their result region
            // keeps the placeholder and the pass moves on
            let Some(runtime) = runtime else { continue };

            let started = Instant::now();
            self.set_block_state(index, |prev| ScriptRuntimeState::Executing {
                started,
                logs: Vec::new(),
                stale: prev.and_then(ScriptRuntimeState::to_stale),
            });
            *self
                .inner
                .executing_index
                .lock()
                .expect("executing index lock poisoned") = Some(index);

            if let Err(e) = self.flush_to_document().await {
                error!(error = %e, "failed to write runtime state back");
                break;
            }

            let outcome = runtime.run_code_block(index).await;

            if !self.pass_is_current(seq, token) {
                // a newer pass owns the executing index now; leave it alone
                debug!(seq, index, "document changed mid-run; discarding result");
                return;
            }

            let completed = Instant::now();
            self.settle_block(index, started, completed, outcome);

            if let Err(e) = self.flush_to_document().await {
                error!(error = %e, "failed to write runtime state back");
                break;
            }
            tokio::time::sleep(self.inner.config.yield_pause).await;
        }

        *self
            .inner
            .executing_index
            .lock()
            .expect("executing index lock poisoned") = None;
    }

    /// Move a region to succeeded or failed, keeping logs appended while
    /// it executed.
    fn settle_block(
        &self,
        index: usize,
        started: Instant,
        completed: Instant,
        outcome: std::result::Result<RunValue, RunError>,
    ) {
        self.set_block_state(index, |prev| {
            let logs = match prev {
                Some(ScriptRuntimeState::Executing { logs, .. }) => logs.clone(),
                _ => Vec::new(),
            };
            match outcome {
                Ok(result) => ScriptRuntimeState::Succeeded {
                    started,
                    completed,
                    logs,
                    result,
                },
                Err(error) => ScriptRuntimeState::Failed {
                    started,
                    completed,
                    logs,
                    error,
                },
            }
        });
    }

    /// Replace one region's state, rebuilding the document state
    /// wholesale.
    fn set_block_state(
        &self,
        index: usize,
        f: impl FnOnce(Option<&ScriptRuntimeState>) -> ScriptRuntimeState,
    ) {
        let mut guard = self
            .inner
            .document_state
            .write()
            .expect("document state lock poisoned");
        let mut next = (**guard).clone();
        if index >= next.code_block_states.len() {
            return;
        }
        let new_state = f(next.code_block_states[index].as_ref());
        next.code_block_states[index] = Some(new_state);
        *guard = Arc::new(next);
    }

    fn replace_document_state(&self, next: DocumentRuntimeState) {
        *self
            .inner
            .document_state
            .write()
            .expect("document state lock poisoned") = Arc::new(next);
    }

    /// Render every region's state and write the flattened text into its
    /// result node — creating the node when missing, skipping spans whose
    /// text is already current. Returns whether anything was written.
    async fn flush_to_document(&self) -> Result<bool> {
        let doc_state = self.document_state();
        let mut tr = Transaction::system();

        {
            let mut sched = self.inner.scheduler.lock().await;
            let snapshot = self.inner.document.read().await.snapshot();
            let count = sched.regions.regions.len();
            sched.rendered.resize(count, None);

            for index in 0..count {
                let Some(state) = doc_state.code_block_states.get(index).and_then(Option::as_ref)
                else {
                    sched.rendered[index] = None;
                    continue;
                };

                let spans = render::render(state);
                let text = render::flatten_text(&spans);
                let region = &sched.regions.regions[index];

                match region.result {
                    Some(result) => {
                        let existing = snapshot
                            .block_at(result.pos)
                            .map(|b| b.text.as_str())
                            .unwrap_or_default();
                        if existing != text {
                            let from = tr.map_pos(result.pos + 1);
                            let to = tr.map_pos(result.pos + result.size - 1);
                            tr.replace(from, to, text);
                        }
                    }
                    None => {
                        let at = tr.map_pos(region.code.end());
                        tr.insert_node(at, BlockKind::Result, text);
                    }
                }
                sched.rendered[index] = Some(spans);
            }
        }

        if tr.is_empty() {
            return Ok(false);
        }
        let outcome = self.dispatch(tr).await?;
        Ok(outcome == DispatchOutcome::Applied)
    }
}

/// Append a log line to the executing region, falling back to the most
/// recently known active region. Best-effort: attribution is ambiguous
/// when nothing is executing.
fn handle_log(inner: &EngineInner, output: LogOutput) {
    let executing = *inner
        .executing_index
        .lock()
        .expect("executing index lock poisoned");

    let mut guard = inner
        .document_state
        .write()
        .expect("document state lock poisoned");

    let target = executing.or_else(|| {
        guard
            .code_block_states
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, state)| state.as_ref().map(|_| index))
    });
    let Some(target) = target else {
        warn!("no region expects log output; dropping it");
        return;
    };

    let mut next = (**guard).clone();
    let appended = match next.code_block_states.get_mut(target).and_then(Option::as_mut) {
        Some(
            ScriptRuntimeState::Executing { logs, .. }
            | ScriptRuntimeState::Succeeded { logs, .. }
            | ScriptRuntimeState::Failed { logs, .. },
        ) => {
            logs.push(output);
            true
        }
        _ => false,
    };

    if appended {
        *guard = Arc::new(next);
    } else {
        warn!(region = target, "log output arrived for a region that keeps no logs");
    }
}
