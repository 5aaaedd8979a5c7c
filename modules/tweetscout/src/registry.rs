use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tweetscout_common::{Job, JobOutcome, TweetscoutError};

/// In-memory job bookkeeping shared by concurrently running jobs.
///
/// Ids come from an atomic counter, so concurrent `create_job` calls never
/// receive the same id. Records are never removed.
#[derive(Debug)]
pub struct JobRegistry {
    next_id: AtomicU64,
    jobs: RwLock<HashMap<u64, Job>>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// A panic while the lock was held cannot leave a record half-written
    /// (every mutation is a single insert or closure), so poisoning is ignored.
    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<u64, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<u64, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job under the next free generated id.
    pub fn create_job(&self, tracer_id: impl Into<String>) -> Result<Job, TweetscoutError> {
        let id = self
            .next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map_err(|_| TweetscoutError::Validation("job id space exhausted".into()))?;
        let job = Job::new(id, tracer_id);
        self.write_jobs().insert(id, job.clone());
        Ok(job)
    }

    /// Register a job under a caller-chosen id. Later generated ids skip past it.
    pub fn create_job_with_id(
        &self,
        id: u64,
        tracer_id: impl Into<String>,
    ) -> Result<Job, TweetscoutError> {
        let next = id
            .checked_add(1)
            .ok_or_else(|| TweetscoutError::Validation(format!("job id {id} is out of range")))?;
        let mut jobs = self.write_jobs();
        if jobs.contains_key(&id) {
            return Err(TweetscoutError::Validation(format!("job {id} already exists")));
        }
        self.next_id.fetch_max(next, Ordering::SeqCst);
        let job = Job::new(id, tracer_id);
        jobs.insert(id, job.clone());
        Ok(job)
    }

    pub fn get_job(&self, id: u64) -> Option<Job> {
        self.read_jobs().get(&id).cloned()
    }

    /// All jobs, oldest id first.
    pub fn list_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.read_jobs().values().cloned().collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    /// Apply `f` to a job and refresh its heartbeat. Returns false for an
    /// unknown id.
    pub fn update(&self, id: u64, f: impl FnOnce(&mut Job)) -> bool {
        match self.write_jobs().get_mut(&id) {
            Some(job) => {
                f(job);
                job.touch();
                true
            }
            None => false,
        }
    }

    pub fn record_outcome(&self, id: u64, outcome: &JobOutcome) -> bool {
        self.update(id, |job| job.apply_outcome(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tweetscout_common::JobState;

    #[test]
    fn ids_are_unique_under_concurrency() {
        let registry = Arc::new(JobRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| registry.create_job("t").unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 400);
        assert_eq!(registry.list_jobs().len(), 400);
    }

    #[test]
    fn explicit_ids_are_exclusive_and_bump_the_counter() {
        let registry = JobRegistry::new();
        registry.create_job_with_id(10, "t").unwrap();
        assert!(registry.create_job_with_id(10, "t").is_err());
        assert_eq!(registry.create_job("t").unwrap().id, 11);
    }

    #[test]
    fn outcome_is_copied_onto_the_record() {
        let registry = JobRegistry::new();
        let job = registry.create_job("trace").unwrap();
        let outcome = JobOutcome {
            job_id: job.id,
            tracer_id: "trace".into(),
            state: JobState::Finished,
            artifacts: vec![],
            messages: vec!["done".into()],
        };
        assert!(registry.record_outcome(job.id, &outcome));
        assert!(!registry.record_outcome(999, &outcome));

        let stored = registry.get_job(job.id).unwrap();
        assert_eq!(stored.state, JobState::Finished);
        assert_eq!(stored.messages, vec!["done"]);
        assert!(stored.heartbeat >= job.heartbeat);
    }

    #[test]
    fn largest_id_is_rejected_without_breaking_the_registry() {
        let registry = JobRegistry::new();
        assert!(matches!(
            registry.create_job_with_id(u64::MAX, "t"),
            Err(TweetscoutError::Validation(_))
        ));

        let job = registry.create_job("t").unwrap();
        assert_eq!(job.id, 1);
        assert!(registry.get_job(job.id).is_some());
        assert!(registry.update(job.id, |j| j.messages.push("ok".into())));
    }

    #[test]
    fn generated_ids_stop_at_the_end_of_the_range() {
        let registry = JobRegistry::new();
        registry.create_job_with_id(u64::MAX - 2, "t").unwrap();
        assert_eq!(registry.create_job("t").unwrap().id, u64::MAX - 1);
        assert!(registry.create_job("t").is_err());
        assert_eq!(registry.list_jobs().len(), 2);
    }

    #[test]
    fn poisoned_lock_still_records_jobs() {
        let registry = Arc::new(JobRegistry::new());
        let poisoner = registry.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.jobs.write().unwrap();
            panic!("poison the registry");
        })
        .join();
        assert!(registry.jobs.is_poisoned());

        let job = registry.create_job("t").unwrap();
        assert_eq!(registry.get_job(job.id).map(|j| j.id), Some(job.id));
        assert!(registry.update(job.id, |_| {}));
    }
}
