//! # synopsis-jobs
//!
//! Background execution for synopsis.
//!
//! This crate provides:
//! - [`JobScheduler`]: records jobs and runs their work on spawned tasks,
//!   trapping errors and panics into a `failed` status
//! - [`ClusteringEngine`]: seeded k-means over one embedding batch, with the
//!   labels written back atomically
//!
//! ## Example
//!
//! ```rust,ignore
//! use synopsis_jobs::{ClusteringEngine, JobScheduler, SchedulerConfig};
//!
//! let scheduler = JobScheduler::new(storage.jobs.clone(), SchedulerConfig::from_env());
//! let engine = ClusteringEngine::new(store);
//! engine.submit_clustering(&scheduler, "b1", 2, "job-1").await?;
//! ```

pub mod clustering;
pub mod scheduler;

pub use clustering::{ClusteringEngine, ClusteringReport};
pub use scheduler::{JobEvent, JobScheduler, SchedulerConfig};
