//! # Cronflow: In-Process Cron-Style Job Scheduling for Rust
//!
//! Cronflow is a small recurring-job scheduler built on Tokio. Callers
//! register async callbacks under a cron expression and an identity token;
//! the scheduler compiles each expression into per-field bitmasks, computes
//! every job's next firing instant, keeps all pending jobs ordered by that
//! instant, and dispatches due jobs concurrently, rescheduling each one for
//! its next occurrence.
//!
//! ## Features
//!
//! - **Cron Expressions**: 5- or 6-field syntax with seconds, plus the
//!   `@yearly`/`@monthly`/`@weekly`/`@daily`/`@midnight`/`@hourly` macros
//! - **Second Resolution**: six-field expressions schedule down to the second
//! - **Time-Ordered Dispatch**: jobs sharing an instant fire from one bucket;
//!   the loop sleeps exactly until the next bucket is due
//! - **Pre-Start Buffering**: jobs added before `start` are held in order
//!   and scheduled the moment the scheduler starts
//! - **Identity-Keyed Removal**: remove a job by its expression and the
//!   identity token you registered it under, even mid-flight
//! - **Isolated Callbacks**: every firing runs as its own task; a failing or
//!   panicking callback never takes the dispatch loop down
//! - **Clean Shutdown**: `stop` blocks until the dispatch loop has exited
//!
//! ## Quick Start
//!
//! ```no_run
//! use cronflow::Scheduler;
//!
//! #[tokio::main]
//! async fn main() -> cronflow::Result<()> {
//!     let scheduler = Scheduler::new();
//!
//!     // every day at 03:30:00
//!     scheduler.add("0 30 3 * * *", "nightly-backup", || async {
//!         println!("running backup");
//!         Ok(())
//!     }).await?;
//!
//!     scheduler.start().await;
//!
//!     // ... do other work ...
//!     tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
//!
//!     scheduler.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Cron Expression Syntax
//!
//! Six fields: `second minute hour day month weekday`. The five-field form
//! omits seconds (they default to 0). Each field takes a comma-separated
//! list of `*`, single values, or `a-b` ranges, optionally with a `/n` step;
//! months and weekdays also accept lowercase three-letter names.
//!
//! - `* * * * * *`: every second
//! - `0 * * * * *`: every minute, on the second 0
//! - `*/10 * * * * *`: every ten seconds
//! - `0 0 12 * * mon-fri`: weekdays at noon
//! - `0 0 0 1 jan *`: every New Year at midnight
//!
//! One deliberate deviation from traditional cron: when both the day-of-month
//! and day-of-week fields are restricted, a date must satisfy **both** (cron
//! classically fires when either matches).

// Re-export the main components
pub use crate::errors::CronflowError;
pub use crate::expression::CronExpression;
pub use crate::scheduler::{Scheduler, SchedulerConfig, State};

// Main modules
pub mod errors;
pub mod expression;
pub mod scheduler;
mod bits;
mod job;
mod occurrence;
mod store;

/// Convenient result type alias for cronflow operations.
pub type Result<T> = std::result::Result<T, CronflowError>;

/// The version of the cronflow library, extracted from `Cargo.toml` at
/// compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
