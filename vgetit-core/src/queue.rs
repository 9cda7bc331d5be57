use crate::data::Database;
use crate::error::{CoreError, Result};
use crate::limiter::RateLimiter;
use crate::model::{Job, JobState};
use crate::orchestrator::{Settlement, settle};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use vgetit_scanner::FactExtractor;

/// Serializes scrape executions against the extractor.
///
/// All admission decisions are taken while holding the store lock, so at
/// most one job is ever `processing`. Extraction itself runs on a spawned
/// task with the lock released.
pub struct JobQueue {
    db: Arc<Mutex<Database>>,
    extractor: Arc<dyn FactExtractor>,
    limiter: RateLimiter,
    settled: Notify,
}

impl JobQueue {
    pub fn new(
        db: Arc<Mutex<Database>>,
        extractor: Arc<dyn FactExtractor>,
        limiter: RateLimiter,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            extractor,
            limiter,
            settled: Notify::new(),
        })
    }

    /// Put jobs left in flight by a previous process back in the queue.
    /// Call once, before anything is enqueued.
    pub async fn recover(&self) -> Result<usize> {
        let mut db = self.db.lock().await;
        let recovered = db.recover_in_flight()?;
        if recovered > 0 {
            warn!(recovered, "Requeued jobs interrupted by a previous run");
        }
        Ok(recovered)
    }

    /// Look up or create the job for `key` and start it if the rate limit
    /// allows, otherwise leave it for the sweep. Never waits on extraction.
    ///
    /// A `failed` job is requeued with its retry count kept. A `completed`
    /// job is requeued only when its target no longer holds scraped data.
    pub async fn enqueue(self: &Arc<Self>, key: &str) -> Result<JobState> {
        let admitted = {
            let mut db = self.db.lock().await;
            let (job, created) = db.get_or_create_job(key, self.limiter.now())?;
            if created {
                debug!(key, "Created job");
            }

            match job.state {
                JobState::Processing => {
                    debug!(key, "Job already in flight");
                    return Ok(JobState::Processing);
                }
                JobState::Completed => {
                    if db.get_target(key)?.is_some_and(|t| t.processed) {
                        debug!(key, "Job completed and target is live");
                        return Ok(JobState::Completed);
                    }
                    db.requeue_job(key, false)?;
                    info!(key, "Requeued completed job for a stale target");
                }
                JobState::Failed => {
                    let job = db.requeue_job(key, false)?;
                    info!(key, retry_count = job.retry_count, "Requeued failed job");
                }
                JobState::Pending => {}
            }

            self.try_admit(&mut db, key)?
        };

        if admitted {
            self.dispatch(key.to_string());
            Ok(JobState::Processing)
        } else {
            debug!(key, "Rate limited, job deferred");
            Ok(JobState::Pending)
        }
    }

    /// Operator retry: `failed -> pending` with the retry count reset.
    pub async fn retry(self: &Arc<Self>, key: &str) -> Result<JobState> {
        let admitted = {
            let mut db = self.db.lock().await;
            let job = db
                .get_job(key)?
                .ok_or_else(|| CoreError::UnknownJob(key.to_string()))?;
            if job.state != JobState::Failed {
                return Err(CoreError::IllegalTransition {
                    key: key.to_string(),
                    from: job.state,
                    to: JobState::Pending,
                });
            }

            db.requeue_job(key, true)?;
            info!(key, "Operator reset failed job");
            self.try_admit(&mut db, key)?
        };

        if admitted {
            self.dispatch(key.to_string());
            Ok(JobState::Processing)
        } else {
            Ok(JobState::Pending)
        }
    }

    /// Promote the oldest pending job if the rate limit allows. At most one
    /// job is promoted per call; returns its key.
    pub async fn sweep(self: &Arc<Self>) -> Result<Option<String>> {
        let key = {
            let mut db = self.db.lock().await;
            if !self.limiter.permits(&db)? {
                debug!("Sweep skipped, rate limited or busy");
                return Ok(None);
            }
            let Some(job) = db.next_pending_job()? else {
                debug!("Sweep found no pending jobs");
                return Ok(None);
            };
            db.admit_job(&job.key)?;
            job.key
        };

        info!(key = %key, "Sweep promoted job");
        self.dispatch(key.clone());
        Ok(Some(key))
    }

    /// Run `sweep` every `every` until the returned handle is aborted.
    /// A failing sweep is logged and the loop carries on.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = queue.sweep().await {
                    warn!(error = %e, "Sweep failed");
                }
            }
        })
    }

    /// Wait until the job for `key` reaches `completed` or `failed`.
    ///
    /// Deferred jobs only move when something sweeps, so a sweeper must be
    /// running for this to return.
    pub async fn wait_for(&self, key: &str) -> Result<Job> {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let db = self.db.lock().await;
                let job = db
                    .get_job(key)?
                    .ok_or_else(|| CoreError::UnknownJob(key.to_string()))?;
                if job.state.is_terminal() {
                    return Ok(job);
                }
            }

            notified.await;
        }
    }

    fn try_admit(&self, db: &mut Database, key: &str) -> Result<bool> {
        if !self.limiter.permits(db)? {
            return Ok(false);
        }
        db.admit_job(key)?;
        info!(key, "Admitted job");
        Ok(true)
    }

    fn dispatch(self: &Arc<Self>, key: String) {
        tokio::spawn(Arc::clone(self).execute(key));
    }

    // Boxed so the execute -> sweep -> dispatch -> execute chain has a
    // nameable future type.
    fn execute(self: Arc<Self>, key: String) -> BoxFuture<'static, ()> {
        async move {
            {
                let mut db = self.db.lock().await;
                if let Err(e) = db.record_execution(&key, self.limiter.now()) {
                    error!(key = %key, error = %e, "Could not record execution time");
                }
            }

            info!(key = %key, "Executing extraction");
            let result = self.extractor.extract(&key).await;

            let settlement = {
                let mut db = self.db.lock().await;
                settle(&mut db, &key, result)
            };
            match &settlement {
                Settlement::Applied => info!(key = %key, "Job completed"),
                Settlement::NoData => info!(key = %key, "Job completed without data"),
                Settlement::Failed(message) => warn!(key = %key, error = %message, "Job failed"),
            }
            self.settled.notify_waiters();

            // Drain: give the next pending job a chance without waiting for the sweeper.
            // Failed attempts hold no interval, so after a failure this starts it at once.
            if let Err(e) = self.sweep().await {
                warn!(error = %e, "Post-execution sweep failed");
            }
        }
        .boxed()
    }
}
