//! Background prefetching of samples for a single consumer.
//!
//! One worker thread pulls locations from a [`LocationSource`], runs them
//! through the [`RecordPipeline`] strictly in order and publishes the samples
//! on a bounded channel. The consumer pulls with [`PrefetchScheduler::next`],
//! which waits at most the configured poll timeout.
//!
//! Every location the worker claims stays pending until the consumer takes
//! its sample off the queue, so [`PrefetchScheduler::has_next`] turns false
//! as soon as the last sample is handed out.
//!
//! Every queued sample is tagged with the generation of the source it came
//! from. `reset` bumps the generation while holding the source lock, so a
//! sample the worker was still decoding for the old source is recognised and
//! discarded when dequeued.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};

use super::record::{RecordPipeline, Sample};
use super::source::LocationSource;
use crate::config::PipelineConfig;
use crate::error::{PrefetchError, SampleLoadError};

/// How long an idle worker sleeps before re-checking for work or shutdown.
const IDLE_WAIT: Duration = Duration::from_millis(20);

/// Lifecycle of a [`PrefetchScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, no worker yet
    Idle,
    /// Worker producing
    Running,
    /// Shut down; samples already queued can still be taken
    Draining,
    /// Shut down and drained
    Stopped,
}

struct Envelope {
    generation: u64,
    sample: Sample,
}

struct Shared {
    pipeline: Arc<RecordPipeline>,
    source: Mutex<LocationSource>,
    source_changed: Condvar,
    generation: AtomicU64,
    running: AtomicBool,
    /// Locations claimed from the source whose sample has not been taken
    /// off the queue or dropped yet.
    pending: AtomicUsize,
    worker_alive: AtomicBool,
    last_error: Mutex<Option<SampleLoadError>>,
}

impl Shared {
    fn source(&self) -> MutexGuard<'_, LocationSource> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_error(&self) -> MutexGuard<'_, Option<SampleLoadError>> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settle `n` claimed locations.
    fn settle(&self, n: usize) {
        let _ = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| {
                Some(p.saturating_sub(n))
            });
    }

    /// Record a failure and retire the worker in one step, so the consumer
    /// sees either a live worker or the error.
    fn fail(&self, error: SampleLoadError) {
        let mut slot = self.last_error();
        *slot = Some(error);
        self.worker_alive.store(false, Ordering::SeqCst);
        self.settle(1);
    }

    /// Pull the next location, counting it as pending before the source lock
    /// is released. Blocks up to [`IDLE_WAIT`] when the source is empty.
    fn claim_next(&self) -> Option<(u64, PathBuf)> {
        let mut source = self.source();
        if !source.has_next() {
            source = self
                .source_changed
                .wait_timeout(source, IDLE_WAIT)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        let location = source.next_location()?;
        self.pending.fetch_add(1, Ordering::SeqCst);
        Some((self.generation.load(Ordering::SeqCst), location))
    }
}

/// Single-producer, single-consumer prefetch pipeline.
pub struct PrefetchScheduler {
    shared: Arc<Shared>,
    config: PipelineConfig,
    state: SchedulerState,
    tx: Option<mpsc::Sender<Envelope>>,
    rx: Option<mpsc::Receiver<Envelope>>,
    worker: Option<JoinHandle<()>>,
}

impl PrefetchScheduler {
    pub fn new(pipeline: Arc<RecordPipeline>, config: &PipelineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                pipeline,
                source: Mutex::new(LocationSource::empty()),
                source_changed: Condvar::new(),
                generation: AtomicU64::new(0),
                running: AtomicBool::new(false),
                pending: AtomicUsize::new(0),
                worker_alive: AtomicBool::new(false),
                last_error: Mutex::new(None),
            }),
            config: config.clone(),
            state: SchedulerState::Idle,
            tx: None,
            rx: None,
            worker: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn pipeline(&self) -> &RecordPipeline {
        &self.shared.pipeline
    }

    /// Install `source` and spawn the worker. On a running scheduler this
    /// is a [`PrefetchScheduler::reset`].
    pub fn start(&mut self, source: LocationSource) -> Result<(), PrefetchError> {
        match self.state {
            SchedulerState::Idle => {}
            SchedulerState::Running => return self.reset(source),
            SchedulerState::Draining | SchedulerState::Stopped => {
                return Err(PrefetchError::ShutDown)
            }
        }
        // A full queue blocks the worker, capping decoded samples in memory.
        let (tx, rx) = mpsc::channel(self.config.buffer_size.max(1));
        *self.shared.source() = source;
        self.shared.running.store(true, Ordering::SeqCst);
        self.tx = Some(tx);
        self.rx = Some(rx);
        self.spawn_worker()?;
        self.state = SchedulerState::Running;
        tracing::debug!(buffer_size = self.config.buffer_size, "Prefetch started");
        Ok(())
    }

    /// Whether another sample may still arrive. Never blocks on decoding.
    ///
    /// A pending worker failure counts as "more", so the consumer reaches
    /// [`PrefetchScheduler::next`] and receives the error.
    pub fn has_next(&self) -> bool {
        let Some(rx) = &self.rx else {
            return false;
        };
        if self.state == SchedulerState::Stopped {
            return false;
        }
        // A location leaves the source and becomes pending under the source
        // lock, and stays pending until the consumer dequeues it. Work is
        // read before the failure slot, and a failing worker settles its
        // location only while holding that slot.
        let work =
            self.shared.source().has_next() || self.shared.pending.load(Ordering::SeqCst) > 0;
        let (failed, alive) = {
            let slot = self.shared.last_error();
            (slot.is_some(), self.shared.worker_alive.load(Ordering::SeqCst))
        };
        let producing = self.state == SchedulerState::Running && alive && work;
        producing || failed || !rx.is_empty()
    }

    /// Take the next sample, waiting up to the poll timeout.
    ///
    /// `Ok(None)` means nothing arrived in time; it is end of stream only
    /// when [`PrefetchScheduler::has_next`] is also false.
    pub async fn next(&mut self) -> Result<Option<Sample>, PrefetchError> {
        let rx = match (self.state, self.rx.as_mut()) {
            (SchedulerState::Idle, _) | (_, None) => return Err(PrefetchError::NotStarted),
            (SchedulerState::Stopped, _) => return Ok(None),
            (_, Some(rx)) => rx,
        };
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.poll_timeout_ms);

        loop {
            let generation = self.shared.generation.load(Ordering::SeqCst);
            let envelope = match rx.try_recv() {
                Ok(envelope) => Some(envelope),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => return Ok(None),
            };
            if let Some(envelope) = envelope {
                self.shared.settle(1);
                if envelope.generation == generation {
                    return Ok(Some(envelope.sample));
                }
                tracing::trace!(
                    path = %envelope.sample.path.display(),
                    "Discarded stale sample"
                );
                continue;
            }

            if let Some(error) = self.shared.last_error().take() {
                return Err(PrefetchError::WorkerFailed(error));
            }
            if self.state == SchedulerState::Draining {
                self.state = SchedulerState::Stopped;
                tracing::debug!("Prefetch drained");
                return Ok(None);
            }

            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(envelope)) if envelope.generation == generation => {
                    self.shared.settle(1);
                    return Ok(Some(envelope.sample));
                }
                Ok(Some(envelope)) => {
                    self.shared.settle(1);
                    tracing::trace!(
                        path = %envelope.sample.path.display(),
                        "Discarded stale sample"
                    );
                }
                Ok(None) => return Ok(None),
                Err(_) => {
                    return match self.shared.last_error().take() {
                        Some(error) => Err(PrefetchError::WorkerFailed(error)),
                        None => Ok(None),
                    };
                }
            }
        }
    }

    /// Restart iteration over `source`.
    ///
    /// Queued and in-flight samples of the previous source are dropped, a
    /// pending worker failure is cleared, and a dead worker is replaced.
    pub fn reset(&mut self, source: LocationSource) -> Result<(), PrefetchError> {
        match self.state {
            SchedulerState::Idle => return self.start(source),
            SchedulerState::Running => {}
            SchedulerState::Draining | SchedulerState::Stopped => {
                return Err(PrefetchError::ShutDown)
            }
        }
        {
            let mut slot = self.shared.source();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            if let Some(rx) = self.rx.as_mut() {
                let mut dropped = 0usize;
                while rx.try_recv().is_ok() {
                    dropped += 1;
                }
                self.shared.settle(dropped);
                tracing::debug!(dropped, "Prefetch queue cleared");
            }
            *slot = source;
            self.shared.last_error().take();
        }
        self.shared.source_changed.notify_all();

        if !self.shared.worker_alive.load(Ordering::SeqCst) {
            if let Some(handle) = self.worker.take() {
                if handle.join().is_err() {
                    tracing::error!("Prefetch worker panicked");
                }
            }
            tracing::info!("Respawning prefetch worker");
            self.spawn_worker()?;
        }
        Ok(())
    }

    /// Stop producing. Already queued samples can still be taken; the
    /// worker is not waited for.
    pub fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.source_changed.notify_all();
        self.state = match (&self.state, &self.rx) {
            (SchedulerState::Idle, _) | (_, None) => SchedulerState::Stopped,
            (_, Some(rx)) if rx.is_empty() => SchedulerState::Stopped,
            _ => SchedulerState::Draining,
        };
        tracing::debug!(state = ?self.state, "Prefetch shutdown requested");
    }

    /// Shut down, close the queue and wait for the worker to exit.
    pub fn join(mut self) {
        self.shutdown();
        self.rx.take();
        self.tx.take();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Prefetch worker panicked");
            }
        }
    }

    fn spawn_worker(&mut self) -> Result<(), PrefetchError> {
        let Some(tx) = self.tx.clone() else {
            return Err(PrefetchError::NotStarted);
        };
        let shared = Arc::clone(&self.shared);
        shared.worker_alive.store(true, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name("pixelfeed-prefetch".into())
            .spawn(move || run_worker(shared, tx))
            .map_err(|e| {
                self.shared.worker_alive.store(false, Ordering::SeqCst);
                PrefetchError::Spawn(e)
            })?;
        self.worker = Some(handle);
        Ok(())
    }
}

impl Drop for PrefetchScheduler {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.source_changed.notify_all();
    }
}

impl std::fmt::Debug for PrefetchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchScheduler")
            .field("state", &self.state)
            .field("buffer_size", &self.config.buffer_size)
            .finish_non_exhaustive()
    }
}

fn run_worker(shared: Arc<Shared>, tx: mpsc::Sender<Envelope>) {
    tracing::debug!("Prefetch worker started");
    produce(&shared, &tx);
    shared.pipeline.release_thread();
    tracing::debug!("Prefetch worker exited");
}

fn produce(shared: &Shared, tx: &mpsc::Sender<Envelope>) {
    while shared.running.load(Ordering::SeqCst) {
        let Some((generation, location)) = shared.claim_next() else {
            continue;
        };

        if location.is_dir() {
            tracing::warn!(path = %location.display(), "Skipping directory");
            shared.settle(1);
            continue;
        }

        let stale = || generation != shared.generation.load(Ordering::SeqCst);
        match shared.pipeline.load_sample(&location) {
            Ok(_) if stale() => shared.settle(1),
            Ok(sample) => {
                if tx.blocking_send(Envelope { generation, sample }).is_err() {
                    shared.settle(1);
                    break;
                }
            }
            Err(error) if stale() => {
                tracing::debug!(error = %error, "Ignoring failure of a reset source");
                shared.settle(1);
            }
            Err(error) => {
                tracing::error!(error = %error, "Prefetch worker stopped");
                shared.fail(error);
                return;
            }
        }
    }
    shared.worker_alive.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn scheduler(buffer_size: usize) -> PrefetchScheduler {
        let config = PipelineConfig {
            buffer_size,
            poll_timeout_ms: 200,
        };
        PrefetchScheduler::new(Arc::new(RecordPipeline::new(&Config::default())), &config)
    }

    #[tokio::test]
    async fn test_next_before_start() {
        let mut scheduler = scheduler(4);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(!scheduler.has_next());
        assert!(matches!(
            scheduler.next().await,
            Err(PrefetchError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_empty_source_exhausts() {
        let mut scheduler = scheduler(4);
        scheduler.start(LocationSource::empty()).unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert!(!scheduler.has_next());
        assert!(scheduler.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_surfaces_worker_failure() {
        let mut scheduler = scheduler(4);
        scheduler
            .start(LocationSource::new(vec![PathBuf::from("/nonexistent/a.png")]))
            .unwrap();

        let mut failure = None;
        while scheduler.has_next() {
            match scheduler.next().await {
                Err(e) => {
                    failure = Some(e);
                    break;
                }
                Ok(_) => {}
            }
        }
        match failure {
            Some(PrefetchError::WorkerFailed(e)) => {
                assert_eq!(e.path, PathBuf::from("/nonexistent/a.png"))
            }
            other => panic!("expected worker failure, got {other:?}"),
        }
        assert!(!scheduler.has_next());
    }

    #[tokio::test]
    async fn test_shutdown_states() {
        let mut scheduler = scheduler(4);
        scheduler.start(LocationSource::empty()).unwrap();
        scheduler.shutdown();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(matches!(
            scheduler.reset(LocationSource::empty()),
            Err(PrefetchError::ShutDown)
        ));
        scheduler.join();
    }
}
