//! Distributed minute-tick scheduler for Chime.
//!
//! Any number of processes run the same [`Scheduler`] loop against one
//! shared coordination store. Each wall-clock minute the fleet elects at
//! most one leader through the leader gate; the leader runs one
//! [`SchedulingPass`] under a distributed lock, selecting every task whose
//! `next_run` has passed and submitting each to the external execution
//! layer; then everyone sleeps to the next minute boundary.
//!
//! Task storage and task execution are collaborators behind the
//! [`TaskRepository`] and [`RepeatingTask`] traits; the scheduler owns no
//! persistent state of its own.

mod error;
mod pass;
mod scheduler;
mod task;

pub use error::{SelectError, SubmitError};
pub use pass::{PassOutcome, SchedulingPass};
pub use scheduler::{Scheduler, SchedulerConfig, next_minute_boundary, time_until_next_minute};
pub use task::{RepeatingTask, TaskRepository};
