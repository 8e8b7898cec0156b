//! Job construction and next-fire bookkeeping.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::CronflowError;
use crate::expression::CronExpression;
use crate::occurrence::next_occurrence;
use crate::Result;

/// Type alias for a job's asynchronous callback.
///
/// The callback is fire-and-forget: the dispatch loop spawns it and never
/// awaits its completion. A returned error is logged and isolated.
pub type JobFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Removal key for a registered job: the expression text paired with the
/// caller-chosen identity token. Two registrations of "the same" recurring
/// task compare equal through this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct JobKey {
    pub(crate) expression: String,
    pub(crate) identity: String,
}

impl JobKey {
    pub(crate) fn new(expression: impl Into<String>, identity: impl Into<String>) -> Self {
        JobKey {
            expression: expression.into(),
            identity: identity.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.expression, self.identity)
    }
}

/// A registered recurring job: its removal key, callback, compiled
/// expression, and current next-fire instant. Owned exclusively by the
/// scheduler once registered.
pub(crate) struct Job {
    pub(crate) key: JobKey,
    pub(crate) callback: JobFn,
    pub(crate) schedule: CronExpression,
    /// None until the job is first scheduled (pre-start buffer entries).
    pub(crate) next_fire: Option<DateTime<Utc>>,
}

impl Job {
    /// Compiles the expression and binds the callback.
    ///
    /// # Errors
    ///
    /// [`CronflowError::InvalidExpression`] on a parse failure,
    /// [`CronflowError::UnresolvableIdentity`] on a blank identity token.
    pub(crate) fn new<F, Fut>(expression: &str, identity: impl Into<String>, callback: F) -> Result<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let identity = identity.into();
        if identity.trim().is_empty() {
            return Err(CronflowError::UnresolvableIdentity(
                "identity token is empty".to_string(),
            ));
        }
        let schedule = CronExpression::parse(expression)?;

        Ok(Job {
            key: JobKey::new(expression, identity),
            callback: Arc::new(move || Box::pin(callback())),
            schedule,
            next_fire: None,
        })
    }

    /// Recomputes and stores the next fire instant strictly after
    /// `reference`, returning it for insertion into the store.
    pub(crate) fn recompute_next_fire(&mut self, reference: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let at = next_occurrence(&self.schedule, reference)?;
        self.next_fire = Some(at);
        Ok(at)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("key", &self.key)
            .field("schedule", &self.schedule)
            .field("next_fire", &self.next_fire)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_job_creation() {
        let job = Job::new("* * * * * *", "heartbeat", || async { Ok(()) }).unwrap();
        assert_eq!(job.key, JobKey::new("* * * * * *", "heartbeat"));
        assert!(job.next_fire.is_none());
    }

    #[test]
    fn test_job_rejects_invalid_expression() {
        let result = Job::new("not cron", "heartbeat", || async { Ok(()) });
        assert!(matches!(result, Err(CronflowError::InvalidExpression(_))));
    }

    #[test]
    fn test_job_rejects_blank_identity() {
        let result = Job::new("* * * * * *", "  ", || async { Ok(()) });
        assert!(matches!(result, Err(CronflowError::UnresolvableIdentity(_))));
    }

    #[test]
    fn test_recompute_next_fire() {
        let mut job = Job::new("0 0 12 * * *", "noon", || async { Ok(()) }).unwrap();
        let reference = Utc.with_ymd_and_hms(2023, 1, 1, 9, 0, 0).unwrap();

        let at = job.recompute_next_fire(reference).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap());
        assert_eq!(job.next_fire, Some(at));

        let later = job.recompute_next_fire(at).unwrap();
        assert_eq!(later, Utc.with_ymd_and_hms(2023, 1, 2, 12, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_callback_is_invocable_through_the_handle() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let job = Job::new("* * * * * *", "counter", move || {
            let counter = Arc::clone(&counter_clone);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        (job.callback)().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
