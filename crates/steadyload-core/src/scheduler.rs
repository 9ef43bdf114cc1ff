use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{ConfigError, RunConfig};
use crate::invoker::{AttemptResult, Invoker};
use crate::pacing::Pacer;
use crate::template::{attempt_rng, materialize, materialize_with};
use crate::transport::Transport;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("result collector failed: {0}")]
    Collector(#[from] tokio::task::JoinError),
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunPhase {
    Idle = 0,
    Dispatching = 1,
    Draining = 2,
    Complete = 3,
}

impl RunPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunPhase::Dispatching,
            2 => RunPhase::Draining,
            3 => RunPhase::Complete,
            _ => RunPhase::Idle,
        }
    }
}

/// Progress counters shared with observers. Informational only; the
/// scheduler never reads them to make decisions.
#[derive(Debug)]
pub struct Progress {
    phase: AtomicU8,
    issued: AtomicU64,
    completed: AtomicU64,
    errors: AtomicU64,
    total: AtomicU64,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            phase: AtomicU8::new(RunPhase::Idle as u8),
            issued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }
}

impl Progress {
    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    fn reset(&self, total: u64) {
        self.issued.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        self.set_phase(RunPhase::Idle);
    }

    fn set_phase(&self, phase: RunPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn record(&self, result: &AttemptResult) {
        if result.status.is_error() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Append-only collection of the results of one run, in completion order.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    results: Vec<AttemptResult>,
    elapsed: Duration,
}

impl ResultSet {
    pub fn new(results: Vec<AttemptResult>, elapsed: Duration) -> Self {
        Self { results, elapsed }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttemptResult> {
        self.results.iter()
    }

    pub fn as_slice(&self) -> &[AttemptResult] {
        &self.results
    }

    /// Wall-clock time from the first issuance to the last completion.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Results ordered by issuance index.
    pub fn by_index(&self) -> Vec<&AttemptResult> {
        let mut sorted: Vec<&AttemptResult> = self.results.iter().collect();
        sorted.sort_by_key(|r| r.index);
        sorted
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a AttemptResult;
    type IntoIter = std::slice::Iter<'a, AttemptResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Aborts the wrapped task when dropped, on every exit path of a run.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Hand a finished attempt to the collector. Returns `false` if the collector
/// is gone and the result was dropped.
async fn deliver(result_tx: &mpsc::Sender<AttemptResult>, result: AttemptResult) -> bool {
    let index = result.index;
    if result_tx.send(result).await.is_err() {
        warn!(index, "result collector closed, result dropped");
        return false;
    }
    true
}

/// Rate-limited concurrent dispatcher.
pub struct Scheduler {
    transport: Arc<dyn Transport>,
    progress: Arc<Progress>,
    progress_every: Option<Duration>,
}

impl Scheduler {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            progress: Arc::new(Progress::default()),
            progress_every: None,
        }
    }

    /// Log a progress line at this interval while the run is active.
    pub fn with_progress_log(mut self, every: Duration) -> Self {
        self.progress_every = Some(every).filter(|d| !d.is_zero());
        self
    }

    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// Execute a run to completion.
    ///
    /// Attempts are issued in index order, one every `1 / rate_limit`
    /// seconds, with at most `rate_limit` unresolved at once. Returns once
    /// every issued attempt has produced its result.
    pub async fn run(&self, config: &RunConfig) -> Result<ResultSet, RunError> {
        let paths = Arc::new(config.validate()?);
        let invoker = Invoker::new(self.transport.clone(), paths);
        let total = config.total_requests;
        let ceiling = Arc::new(Semaphore::new(config.rate_limit as usize));
        let pacer = Pacer::new(config.rate_limit);

        self.progress.reset(total);

        let (result_tx, mut result_rx) = mpsc::channel::<AttemptResult>(config.rate_limit as usize);
        let collector = {
            let progress = self.progress.clone();
            let capacity = usize::try_from(total).unwrap_or(usize::MAX).min(1 << 20);
            tokio::spawn(async move {
                let mut results = Vec::with_capacity(capacity);
                while let Some(result) = result_rx.recv().await {
                    progress.record(&result);
                    results.push(result);
                }
                results
            })
        };

        let reporter = self.progress_every.map(|every| {
            let progress = self.progress.clone();
            AbortOnDrop(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(every);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    log_progress(&progress);
                }
            }))
        });

        info!(
            transport = self.transport.name(),
            targets = config.targets.len(),
            method = %config.method,
            rate_limit = config.rate_limit,
            total,
            interval_us = pacer.interval().as_micros() as u64,
            "dispatching"
        );
        self.progress.set_phase(RunPhase::Dispatching);
        let start = Instant::now();

        let mut tasks = JoinSet::new();
        for index in 0..total {
            let Ok(permit) = ceiling.clone().acquire_owned().await else {
                warn!(index, "concurrency ceiling closed, stopping dispatch");
                break;
            };

            let url = config.target_for(index).to_string();
            let method = config.method.clone();
            let body = config.body_template.as_ref().map(|t| match config.seed {
                Some(seed) => materialize_with(t, &mut attempt_rng(seed, index)),
                None => materialize(t),
            });
            let invoker = invoker.clone();
            let result_tx = result_tx.clone();

            self.progress.issued.fetch_add(1, Ordering::Relaxed);
            tasks.spawn(async move {
                let attempt = {
                    let invoker = invoker.clone();
                    let url = url.clone();
                    let method = method.clone();
                    tokio::spawn(async move {
                        invoker.invoke(index, &url, &method, body.as_ref()).await
                    })
                };
                let result = match attempt.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(index, url = %url, error = %e, "attempt task failed");
                        AttemptResult::lost(
                            index,
                            &url,
                            &method,
                            format!("attempt task failed: {e}"),
                            invoker.paths(),
                        )
                    }
                };
                deliver(&result_tx, result).await;
                drop(permit);
            });

            if index + 1 < total {
                pacer.wait().await;
            }
        }
        drop(result_tx);

        info!(in_flight = tasks.len(), "draining");
        self.progress.set_phase(RunPhase::Draining);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "attempt wrapper failed");
            }
        }

        let results = collector.await?;
        let elapsed = start.elapsed();
        drop(reporter);

        self.progress.set_phase(RunPhase::Complete);
        info!(
            completed = results.len(),
            errors = self.progress.errors(),
            elapsed_ms = elapsed.as_millis() as u64,
            "complete"
        );

        Ok(ResultSet::new(results, elapsed))
    }
}

fn log_progress(progress: &Progress) {
    info!(
        "Progress: issued={} completed={}/{} errors={}",
        progress.issued(),
        progress.completed(),
        progress.total(),
        progress.errors()
    );
}
