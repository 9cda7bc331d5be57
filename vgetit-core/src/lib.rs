pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod jobs;
pub mod keys;
pub mod limiter;
pub mod model;
pub mod orchestrator;
pub mod phone;
pub mod queue;
pub mod scoring;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use data::Database;
pub use error::{CoreError, Result};
pub use limiter::RateLimiter;
pub use model::{ApplyOutcome, Job, JobState, Target, TargetDetails};
pub use orchestrator::{NO_DATA_NOTE, Orchestrator, ScrapeResponse, Settlement};
pub use queue::JobQueue;
