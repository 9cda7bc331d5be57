use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::data::Database;
use crate::error::Result;
use crate::keys::normalize_target_key;
use crate::limiter::RateLimiter;
use crate::model::{ApplyOutcome, Job, JobState, Rating, TargetDetails};
use crate::queue::JobQueue;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vgetit_scanner::{ExtractError, Extraction, FactExtractor};

/// Job note recorded when an extraction finds no company name.
pub const NO_DATA_NOTE: &str = "No company name found";

/// Answer to a scrape request, shaped for the web layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScrapeResponse {
    Exists {
        target: Box<TargetDetails>,
    },
    Processing {
        slug: String,
        job_state: Option<JobState>,
    },
    Error {
        message: String,
    },
}

/// How an execution ended, after its result reached the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Applied,
    NoData,
    Failed(String),
}

/// Front door of the scrape pipeline: looks targets up, creates
/// placeholders and hands new keys to the job queue.
pub struct Orchestrator {
    db: Arc<Mutex<Database>>,
    queue: Arc<JobQueue>,
    config: SchedulerConfig,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        extractor: Arc<dyn FactExtractor>,
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let db = Arc::new(Mutex::new(db));
        let limiter = RateLimiter::new(config.min_interval, clock);
        let queue = JobQueue::new(db.clone(), extractor, limiter);
        Self { db, queue, config }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn store(&self) -> &Arc<Mutex<Database>> {
        &self.db
    }

    /// Recover interrupted jobs and start the periodic sweep.
    pub async fn start(&self) -> Result<JoinHandle<()>> {
        self.queue.recover().await?;
        info!(
            min_interval_secs = self.config.min_interval.as_secs_f64(),
            sweep_every_secs = self.config.sweep_every.as_secs_f64(),
            "Starting scrape scheduler"
        );
        Ok(self.queue.spawn_sweeper(self.config.sweep_every))
    }

    /// Return the target if it is already scraped, otherwise make sure a
    /// job exists for it. Internal failures are reported without detail.
    pub async fn request_scrape(&self, raw_key: &str) -> ScrapeResponse {
        let key = match normalize_target_key(raw_key) {
            Ok(key) => key,
            Err(_) => {
                return ScrapeResponse::Error {
                    message: "invalid target".to_string(),
                };
            }
        };

        match self.request_normalized(&key).await {
            Ok(response) => response,
            Err(e) => {
                error!(key = %key, error = %e, "Scrape request failed");
                ScrapeResponse::Error {
                    message: "scrape could not be started".to_string(),
                }
            }
        }
    }

    async fn request_normalized(&self, key: &str) -> Result<ScrapeResponse> {
        let (slug, job_state) = {
            let mut db = self.db.lock().await;
            match db.get_target(key)? {
                Some(target) if target.processed => {
                    if let Some(details) = db.target_details(key)? {
                        return Ok(ScrapeResponse::Exists {
                            target: Box::new(details),
                        });
                    }
                    (target.slug, None)
                }
                Some(target) => {
                    let state = db.get_job(key)?.map(|job| job.state);
                    (target.slug, state)
                }
                None => {
                    let target = db.create_placeholder_target(key)?;
                    (target.slug, None)
                }
            }
        };

        // A placeholder whose job is live needs no new work
        if let Some(state @ (JobState::Pending | JobState::Processing)) = job_state {
            return Ok(ScrapeResponse::Processing {
                slug,
                job_state: Some(state),
            });
        }

        let state = self.queue.enqueue(key).await?;
        Ok(ScrapeResponse::Processing {
            slug,
            job_state: Some(state),
        })
    }

    pub async fn get_status(&self, raw_key: &str) -> Result<Option<JobState>> {
        Ok(self.get_job(raw_key).await?.map(|job| job.state))
    }

    pub async fn get_job(&self, raw_key: &str) -> Result<Option<Job>> {
        let key = normalize_target_key(raw_key)?;
        self.db.lock().await.get_job(&key)
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.db.lock().await.list_jobs()
    }

    pub async fn target(&self, raw_key: &str) -> Result<Option<TargetDetails>> {
        let key = normalize_target_key(raw_key)?;
        self.db.lock().await.target_details(&key)
    }

    pub async fn target_by_slug(&self, slug: &str) -> Result<Option<TargetDetails>> {
        let db = self.db.lock().await;
        match db.get_target_by_slug(slug)? {
            Some(target) => db.target_details(&target.key),
            None => Ok(None),
        }
    }

    /// Operator retry of a failed job. Restores the placeholder the failure
    /// removed so status lookups keep working while it runs.
    pub async fn retry(&self, raw_key: &str) -> Result<JobState> {
        let key = normalize_target_key(raw_key)?;
        {
            let mut db = self.db.lock().await;
            if db.get_job(&key)?.is_some_and(|job| job.state == JobState::Failed) {
                db.create_placeholder_target(&key)?;
            }
        }
        self.queue.retry(&key).await
    }

    pub async fn submit_rating(
        &self,
        raw_key: &str,
        rater: &str,
        value: i64,
        note: &str,
    ) -> Result<Rating> {
        let key = normalize_target_key(raw_key)?;
        self.db
            .lock()
            .await
            .submit_rating(&key, rater, value, note)
    }

    pub async fn delete_rating(&self, raw_key: &str, rater: &str) -> Result<bool> {
        let key = normalize_target_key(raw_key)?;
        self.db.lock().await.delete_rating(&key, rater)
    }

    /// Wait for the job of `raw_key` to finish. Needs a running sweeper.
    pub async fn wait_for(&self, raw_key: &str) -> Result<Job> {
        let key = normalize_target_key(raw_key)?;
        self.queue.wait_for(&key).await
    }
}

/// Apply the result of one execution to the store and close its job.
///
/// Nothing here propagates: extraction and store errors become a `failed`
/// job and the partially created target is removed.
pub(crate) fn settle(
    db: &mut Database,
    key: &str,
    result: std::result::Result<Extraction, ExtractError>,
) -> Settlement {
    let failure = match result {
        Err(e) => e.to_string(),
        Ok(extraction) => match db.apply_extraction(key, &extraction) {
            Ok(ApplyOutcome::Applied { .. }) => {
                close(db.complete_job(key, None), key);
                return Settlement::Applied;
            }
            Ok(ApplyOutcome::NoData) => {
                close(db.complete_job(key, Some(NO_DATA_NOTE)), key);
                return Settlement::NoData;
            }
            Err(e) => e.to_string(),
        },
    };

    if let Err(e) = db.delete_target(key) {
        warn!(key, error = %e, "Could not discard target after failure");
    }
    close(db.fail_job(key, &failure), key);
    Settlement::Failed(failure)
}

fn close(result: Result<Job>, key: &str) {
    if let Err(e) = result {
        error!(key, error = %e, "Could not update job state");
    }
}
