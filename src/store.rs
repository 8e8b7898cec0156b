//! Time-ordered job storage.
//!
//! Jobs are bucketed by their next-fire instant in a `BTreeMap`, so the
//! dispatch loop can read the minimum key in logarithmic time and jobs
//! sharing an instant land in the same bucket. A secondary identity index
//! maps each registered key to the instants currently holding its entries,
//! so removal is a direct lookup rather than a fresh next-fire computation
//! (which would silently miss once the scheduled instant has passed).
//!
//! Invariant: every present instant maps to a non-empty bucket, and the
//! index holds exactly one instant per stored job.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use log::trace;

use crate::errors::CronflowError;
use crate::job::{Job, JobKey};
use crate::Result;

#[derive(Debug, Default)]
pub(crate) struct JobStore {
    buckets: BTreeMap<DateTime<Utc>, Vec<Job>>,
    index: HashMap<JobKey, Vec<DateTime<Utc>>>,
}

impl JobStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends the job to the bucket at `at`, creating the bucket if absent.
    pub(crate) fn insert(&mut self, at: DateTime<Utc>, job: Job) {
        trace!("storing job {} at {}", job.key, at);
        self.index.entry(job.key.clone()).or_default().push(at);
        self.buckets.entry(at).or_default().push(job);
    }

    /// The earliest instant with pending jobs, if any.
    pub(crate) fn peek_min(&self) -> Option<DateTime<Utc>> {
        self.buckets.keys().next().copied()
    }

    /// The bucket at exactly `at`, if present.
    pub(crate) fn find_exact(&self, at: DateTime<Utc>) -> Option<&[Job]> {
        self.buckets.get(&at).map(Vec::as_slice)
    }

    /// Removes and returns the whole bucket at `at`, dropping its key and
    /// the index entries of every contained job.
    pub(crate) fn take_bucket(&mut self, at: DateTime<Utc>) -> Option<Vec<Job>> {
        let jobs = self.buckets.remove(&at)?;
        for job in &jobs {
            self.unindex(&job.key, at);
        }
        Some(jobs)
    }

    /// Removes one stored job matching `key` through the identity index.
    /// Returns `Ok(false)` when nothing matches; absence is not an error.
    pub(crate) fn remove_job(&mut self, key: &JobKey) -> Result<bool> {
        let Some(instants) = self.index.get_mut(key) else {
            return Ok(false);
        };
        let Some(at) = instants.pop() else {
            return Err(CronflowError::InvariantViolation(format!(
                "identity index holds an empty instant list for {}",
                key
            )));
        };
        if instants.is_empty() {
            self.index.remove(key);
        }

        let Some(bucket) = self.buckets.get_mut(&at) else {
            return Err(CronflowError::InvariantViolation(format!(
                "identity index points at missing bucket {} for {}",
                at, key
            )));
        };
        let Some(pos) = bucket.iter().position(|job| job.key == *key) else {
            return Err(CronflowError::InvariantViolation(format!(
                "bucket {} has no entry for indexed job {}",
                at, key
            )));
        };
        bucket.remove(pos);
        if bucket.is_empty() {
            self.buckets.remove(&at);
        }
        trace!("removed job {} from bucket {}", key, at);
        Ok(true)
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
        self.index.clear();
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn job_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn has_empty_bucket(&self) -> bool {
        self.buckets.values().any(Vec::is_empty)
    }

    fn unindex(&mut self, key: &JobKey, at: DateTime<Utc>) {
        if let Some(instants) = self.index.get_mut(key) {
            if let Some(pos) = instants.iter().position(|&i| i == at) {
                instants.swap_remove(pos);
            }
            if instants.is_empty() {
                self.index.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, second).unwrap()
    }

    fn job(identity: &str) -> Job {
        Job::new("* * * * * *", identity, || async { Ok(()) }).unwrap()
    }

    #[test]
    fn test_insert_and_peek_min_ordering() {
        let mut store = JobStore::new();
        store.insert(at(30), job("late"));
        store.insert(at(10), job("early"));
        store.insert(at(20), job("middle"));

        assert_eq!(store.peek_min(), Some(at(10)));
        assert_eq!(store.job_count(), 3);
    }

    #[test]
    fn test_same_instant_shares_a_bucket() {
        let mut store = JobStore::new();
        store.insert(at(10), job("a"));
        store.insert(at(10), job("b"));

        let bucket = store.find_exact(at(10)).unwrap();
        assert_eq!(bucket.len(), 2);
        assert!(store.find_exact(at(11)).is_none());
    }

    #[test]
    fn test_take_bucket_removes_key_and_index() {
        let mut store = JobStore::new();
        store.insert(at(10), job("a"));
        store.insert(at(10), job("b"));
        store.insert(at(20), job("c"));

        let jobs = store.take_bucket(at(10)).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(store.peek_min(), Some(at(20)));
        assert!(store.take_bucket(at(10)).is_none());

        // the index must no longer resolve the taken jobs
        assert!(!store.remove_job(&JobKey::new("* * * * * *", "a")).unwrap());
    }

    #[test]
    fn test_remove_job_through_index() {
        let mut store = JobStore::new();
        store.insert(at(10), job("a"));
        store.insert(at(10), job("b"));

        let removed = store.remove_job(&JobKey::new("* * * * * *", "a")).unwrap();
        assert!(removed);
        assert_eq!(store.job_count(), 1);

        // last entry in the bucket: removing it must drop the key too
        let removed = store.remove_job(&JobKey::new("* * * * * *", "b")).unwrap();
        assert!(removed);
        assert!(store.is_empty());
        assert!(store.peek_min().is_none());
    }

    #[test]
    fn test_remove_missing_job_is_not_an_error() {
        let mut store = JobStore::new();
        store.insert(at(10), job("a"));

        let removed = store
            .remove_job(&JobKey::new("* * * * * *", "missing"))
            .unwrap();
        assert!(!removed);
        assert_eq!(store.job_count(), 1);
    }

    #[test]
    fn test_duplicate_registrations_remove_one_at_a_time() {
        let mut store = JobStore::new();
        store.insert(at(10), job("dup"));
        store.insert(at(11), job("dup"));

        let key = JobKey::new("* * * * * *", "dup");
        assert!(store.remove_job(&key).unwrap());
        assert_eq!(store.job_count(), 1);
        assert!(store.remove_job(&key).unwrap());
        assert!(store.is_empty());
        assert!(!store.remove_job(&key).unwrap());
    }

    #[test]
    fn test_no_empty_buckets_after_mutations() {
        let mut store = JobStore::new();
        for i in 0..10 {
            store.insert(at(i % 3), job(&format!("job-{}", i)));
        }
        for i in 0..10 {
            store
                .remove_job(&JobKey::new("* * * * * *", format!("job-{}", i)))
                .unwrap();
            assert!(!store.has_empty_bucket());
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut store = JobStore::new();
        store.insert(at(10), job("a"));
        store.clear();
        assert!(store.is_empty());
        assert!(!store.remove_job(&JobKey::new("* * * * * *", "a")).unwrap());
    }
}
