use thiserror::Error;

/// Represents all possible errors that can occur in cronflow.
#[derive(Debug, Error)]
pub enum CronflowError {
    /// The cron expression text could not be compiled: malformed field,
    /// unsupported macro, or a field that matches no value at all.
    #[error("invalid cron expression: {0}")]
    InvalidExpression(String),

    /// No usable identity token was supplied for a job registration.
    #[error("unresolvable job identity: {0}")]
    UnresolvableIdentity(String),

    /// The scheduler has been stopped and no longer accepts operations.
    #[error("scheduler has been terminated")]
    Terminated,

    /// An internal bookkeeping invariant was broken. This signals a bug in
    /// the scheduler itself, not a recoverable caller error.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}
