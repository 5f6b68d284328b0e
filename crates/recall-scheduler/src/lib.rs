//! Background job scheduler for the recall daemon.
//!
//! Async cron scheduling on `tokio-cron-scheduler` with timezone support
//! and graceful shutdown. With the `jobs` feature (default) the crate also
//! carries the memory-layer maintenance jobs.
//!
//! # Example
//!
//! ```ignore
//! use recall_scheduler::{register_maintenance_jobs, SchedulerConfig, SchedulerService};
//!
//! let mut scheduler = SchedulerService::new(SchedulerConfig::from(&settings.scheduler)).await?;
//! register_maintenance_jobs(&scheduler, &ctx, &settings.scheduler).await?;
//! scheduler.start().await?;
//! tokio::signal::ctrl_c().await?;
//! scheduler.shutdown().await?;
//! ```

mod config;
mod error;
mod scheduler;

#[cfg(feature = "jobs")]
pub mod jobs;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use scheduler::{validate_cron_expression, SchedulerService};

#[cfg(feature = "jobs")]
pub use jobs::register_maintenance_jobs;
