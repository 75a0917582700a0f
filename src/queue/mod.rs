//! Durable job queues on the key-value bus
//!
//! Each logical queue is three Redis structures: a FIFO `waiting` list of
//! job ids, a `processing` list of leased ids, and a `jobs` hash mapping id
//! to the serialized job record. The job id equals the deployment id, so a
//! cancel can address the job directly and a duplicate enqueue of the same
//! deployment is rejected.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fred::clients::RedisClient;
use fred::interfaces::{HashesInterface, ListInterface};
use fred::types::LMoveDirection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::CoreError;

/// Queue feeding the deployment pipeline.
pub const BUILD_QUEUE: &str = "build-queue";
/// Queue feeding the rollback variant of the pipeline.
pub const ROLLBACK_QUEUE: &str = "rollback-queue";

/// A job at rest in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    /// Opaque payload; workers deserialize it into their job type.
    pub payload: serde_json::Value,
    /// Queue-level delivery attempts so far.
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Handle to one logical queue.
#[derive(Clone)]
pub struct JobQueue {
    client: RedisClient,
    name: &'static str,
}

impl JobQueue {
    pub fn new(client: RedisClient, name: &'static str) -> Self {
        Self { client, name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn waiting_key(&self) -> String {
        format!("{}:waiting", self.name)
    }

    fn processing_key(&self) -> String {
        format!("{}:processing", self.name)
    }

    fn jobs_key(&self) -> String {
        format!("{}:jobs", self.name)
    }

    /// Enqueue a job. Fails with `Conflict` if the id is already present,
    /// whether waiting or leased.
    pub async fn enqueue<P: Serialize>(&self, job_id: &str, payload: &P) -> Result<(), CoreError> {
        let job = QueuedJob {
            payload: serde_json::to_value(payload)?,
            attempts: 0,
            enqueued_at: Utc::now(),
        };

        let created: bool = self
            .client
            .hsetnx(self.jobs_key(), job_id, serde_json::to_string(&job)?)
            .await?;
        if !created {
            return Err(CoreError::Conflict(format!(
                "job {job_id} already pending on {}",
                self.name
            )));
        }

        let _: i64 = self.client.rpush(self.waiting_key(), job_id).await?;
        debug!(queue = self.name, job_id, "Job enqueued");
        Ok(())
    }

    /// Fetch a job by id while it is still waiting. Leased or finished jobs
    /// return `None`.
    pub async fn get(&self, job_id: &str) -> Result<Option<QueuedJob>, CoreError> {
        let position: Option<i64> = self
            .client
            .lpos(self.waiting_key(), job_id, None, None, None)
            .await?;
        if position.is_none() {
            return Ok(None);
        }

        let raw: Option<String> = self.client.hget(self.jobs_key(), job_id).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Remove a job that is still waiting. Running jobs are not interrupted
    /// here; once leased the job can only finish.
    pub async fn remove(&self, job_id: &str) -> Result<(), CoreError> {
        let removed: i64 = self.client.lrem(self.waiting_key(), 1, job_id).await?;
        if removed == 0 {
            return Err(CoreError::NotFound(format!(
                "job {job_id} is not queued on {}",
                self.name
            )));
        }

        let _: i64 = self.client.hdel(self.jobs_key(), job_id).await?;
        debug!(queue = self.name, job_id, "Job removed while queued");
        Ok(())
    }

    /// Take an exclusive lease on the oldest waiting job, if any.
    pub async fn lease(&self) -> Result<Option<(String, QueuedJob)>, CoreError> {
        let job_id: Option<String> = self
            .client
            .lmove(
                self.waiting_key(),
                self.processing_key(),
                LMoveDirection::Left,
                LMoveDirection::Right,
            )
            .await?;

        let Some(job_id) = job_id else {
            return Ok(None);
        };

        let raw: Option<String> = self.client.hget(self.jobs_key(), job_id.as_str()).await?;
        match raw {
            Some(json) => Ok(Some((job_id, serde_json::from_str(&json)?))),
            None => {
                // Record vanished under us (removed concurrently); drop the lease.
                let _: i64 = self
                    .client
                    .lrem(self.processing_key(), 1, job_id.as_str())
                    .await?;
                Ok(None)
            }
        }
    }

    /// Acknowledge a leased job as complete, releasing all queue state.
    pub async fn ack(&self, job_id: &str) -> Result<(), CoreError> {
        let _: i64 = self.client.lrem(self.processing_key(), 1, job_id).await?;
        let _: i64 = self.client.hdel(self.jobs_key(), job_id).await?;
        Ok(())
    }

    /// Report a leased job as failed. Requeues it (at the tail) unless the
    /// attempt budget is exhausted; returns whether it will run again.
    pub async fn nack(&self, job_id: &str, max_attempts: u32) -> Result<bool, CoreError> {
        let _: i64 = self.client.lrem(self.processing_key(), 1, job_id).await?;

        let raw: Option<String> = self.client.hget(self.jobs_key(), job_id).await?;
        let Some(json) = raw else {
            return Ok(false);
        };

        let mut job: QueuedJob = serde_json::from_str(&json)?;
        job.attempts += 1;

        if job.attempts >= max_attempts {
            let _: i64 = self.client.hdel(self.jobs_key(), job_id).await?;
            debug!(queue = self.name, job_id, attempts = job.attempts, "Job attempts exhausted");
            return Ok(false);
        }

        let _: () = self
            .client
            .hset(self.jobs_key(), (job_id, serde_json::to_string(&job)?))
            .await?;
        let _: i64 = self.client.rpush(self.waiting_key(), job_id).await?;
        debug!(queue = self.name, job_id, attempts = job.attempts, "Job requeued");
        Ok(true)
    }
}

/// Exponential backoff before a retry: base 1 s, doubling per attempt,
/// capped at 30 s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 1u64 << attempt.min(5);
    Duration::from_secs(secs.min(30))
}

/// Rolling-window admission control: at most `capacity` admissions per
/// `window`, measured against real elapsed time.
#[derive(Debug)]
pub struct RateWindow {
    capacity: usize,
    window: Duration,
    admitted: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity,
            window,
            admitted: VecDeque::new(),
        }
    }

    /// Try to admit one unit of work at `now`.
    pub fn try_admit(&mut self, now: Instant) -> bool {
        self.evict(now);
        if self.admitted.len() < self.capacity {
            self.admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Time until the next admission becomes possible, `None` if admissible
    /// right now.
    pub fn next_slot(&mut self, now: Instant) -> Option<Duration> {
        self.evict(now);
        if self.admitted.len() < self.capacity {
            return None;
        }
        let oldest = *self.admitted.front()?;
        Some(self.window.saturating_sub(now.duration_since(oldest)))
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.admitted.front() {
            if now.duration_since(*front) >= self.window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
        assert_eq!(backoff_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn test_rate_window_admits_up_to_capacity() {
        let mut window = RateWindow::new(5, Duration::from_secs(60));
        let now = Instant::now();
        for _ in 0..5 {
            assert!(window.try_admit(now));
        }
        assert!(!window.try_admit(now));
    }

    #[test]
    fn test_rate_window_rolls_over() {
        let mut window = RateWindow::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(window.try_admit(start));
        assert!(window.try_admit(start + Duration::from_secs(30)));
        assert!(!window.try_admit(start + Duration::from_secs(45)));
        // The first admission ages out of the window.
        assert!(window.try_admit(start + Duration::from_secs(61)));
    }

    #[test]
    fn test_next_slot_reports_wait() {
        let mut window = RateWindow::new(1, Duration::from_secs(60));
        let start = Instant::now();
        assert!(window.next_slot(start).is_none());
        assert!(window.try_admit(start));
        let wait = window.next_slot(start + Duration::from_secs(20)).unwrap();
        assert_eq!(wait, Duration::from_secs(40));
    }
}
