//! Bounded worker pools that isolate pipeline stages from each other.
//!
//! A [`WorkerPool`] runs at most `workers` jobs at once and queues up to
//! `queue_capacity` more. When the queue is full the [`OverflowPolicy`]
//! decides: `CallerRuns` awaits the job on the submitting task, `Reject`
//! drops it with a warning.
//!
//! Shutdown stops intake and waits for running and queued jobs up to a grace
//! period. Jobs still running after that are abandoned, never aborted, so no
//! job is cut off halfway through a write.

use crate::config::{OverflowPolicy, PoolConfig};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

/// Counts outstanding units of work and wakes waiters when it drops to zero.
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Resolve once nothing is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one unit of work as outstanding until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    tracker: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

/// How a submitted job was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    RanOnCaller,
    Rejected,
}

#[derive(Debug)]
pub struct WorkerPool {
    name: &'static str,
    workers: Arc<Semaphore>,
    /// Running plus queued jobs; sized `workers + queue_capacity`.
    slots: Arc<Semaphore>,
    overflow: OverflowPolicy,
    in_flight: Arc<InFlight>,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new(name: &'static str, config: &PoolConfig) -> Self {
        let workers = config.workers.max(1);
        info!(
            pool = name,
            workers,
            queue_capacity = config.queue_capacity,
            overflow = ?config.overflow,
            "Worker pool created"
        );
        Self {
            name,
            workers: Arc::new(Semaphore::new(workers)),
            slots: Arc::new(Semaphore::new(workers + config.queue_capacity)),
            overflow: config.overflow,
            in_flight: Arc::new(InFlight::default()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Hand a job to the pool.
    ///
    /// Panics inside the job are caught and logged so one bad job cannot take
    /// down the caller or the pool.
    pub async fn submit<F>(&self, job: F) -> Submission
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            warn!(pool = self.name, "Pool is shut down; rejecting job");
            return Submission::Rejected;
        }

        let name = self.name;
        let guarded = async move {
            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                error!(pool = name, "Job panicked");
            }
        };

        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(slot) => {
                let guard = self.in_flight.enter();
                let workers = Arc::clone(&self.workers);
                tokio::spawn(async move {
                    let _slot = slot;
                    let _guard = guard;
                    let Ok(_permit) = workers.acquire_owned().await else {
                        return;
                    };
                    guarded.await;
                });
                debug!(pool = name, "Job queued");
                Submission::Queued
            }
            Err(_) => match self.overflow {
                OverflowPolicy::CallerRuns => {
                    debug!(pool = name, "Queue full; running job on caller");
                    let _guard = self.in_flight.enter();
                    guarded.await;
                    Submission::RanOnCaller
                }
                OverflowPolicy::Reject => {
                    warn!(pool = name, "Queue full; rejecting job");
                    Submission::Rejected
                }
            },
        }
    }

    /// Stop intake and wait up to `grace` for outstanding jobs.
    ///
    /// Returns `true` when everything finished inside the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.closed.store(true, Ordering::SeqCst);
        let outstanding = self.in_flight.count();
        match tokio::time::timeout(grace, self.in_flight.wait_idle()).await {
            Ok(()) => {
                info!(pool = self.name, drained = outstanding, "Worker pool drained");
                true
            }
            Err(_) => {
                warn!(
                    pool = self.name,
                    abandoned = self.in_flight.count(),
                    ?grace,
                    "Grace period elapsed; abandoning remaining jobs"
                );
                false
            }
        }
    }
}

/// The three stage pools, built once at startup and shared by handle.
#[derive(Debug)]
pub struct Pools {
    pub news: WorkerPool,
    pub quiz: WorkerPool,
    pub daily: WorkerPool,
}

impl Pools {
    pub fn new(config: &crate::config::PoolsConfig) -> Self {
        Self {
            news: WorkerPool::new("news-generation", &config.news),
            quiz: WorkerPool::new("quiz-generation", &config.quiz),
            daily: WorkerPool::new("daily-quiz", &config.daily),
        }
    }

    pub async fn shutdown(&self, grace: Duration) -> bool {
        let (news, quiz, daily) = tokio::join!(
            self.news.shutdown(grace),
            self.quiz.shutdown(grace),
            self.daily.shutdown(grace)
        );
        news && quiz && daily
    }
}
