//! Background execution of processing cycles.
//!
//! - `scheduler`: one-off runs and the single recurring job

pub mod scheduler;

pub use scheduler::{CycleRunner, JOB_ID, JOB_NAME, ScheduleJob, Scheduler};
