//! Durable file-backed priority queue (spec §4.7) — the hardest component.
//!
//! One JSON document (`queue.json`) of the form `{ jobs: [...], updatedAt }`.
//! Every mutation runs inside the §4.2 file lock's critical section.

use oj_core::{InstanceId, Job, JobData, JobId, JobStatus};
use serde::{Deserialize, Serialize};

use crate::atomic::{read_json_opt, write_json};
use crate::error::{Result, StorageError};
use crate::lock::with_lock;
use crate::paths::DataRoot;

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueDocument {
    jobs: Vec<Job>,
    updated_at_ms: u64,
}

/// Per-status counts (spec §4.7 `getQueueStats`). `delayed` is derived:
/// waiting jobs whose `processAt` is still in the future.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub human_waiting: usize,
}

pub struct Queue {
    root: DataRoot,
}

impl Queue {
    pub fn new(root: DataRoot) -> Self {
        Self { root }
    }

    fn load(&self) -> Result<QueueDocument> {
        match read_json_opt(&self.root.queue_json())? {
            Some(doc) => Ok(doc),
            None => Ok(QueueDocument::default()),
        }
    }

    fn save(&self, doc: &QueueDocument) -> Result<()> {
        write_json(&self.root.queue_json(), doc)
    }

    fn lock_path(&self) -> std::path::PathBuf {
        self.root.queue_lock()
    }

    /// Idempotent enqueue: a job with this id (`instanceId:nodeId:attempt`)
    /// replaces any existing entry, so retries re-enqueueing the same
    /// tuple do not duplicate (spec §4.7 `enqueueNode`).
    pub fn enqueue_node(&self, data: JobData, priority: i32, delay_ms: u64, now_ms: u64) -> Result<JobId> {
        with_lock(self.lock_path(), || {
            let mut doc = self.load()?;
            let job = Job::new(data, priority, now_ms + delay_ms, now_ms);
            let id = job.id.clone();
            doc.jobs.retain(|j| j.id != id);
            doc.jobs.push(job);
            doc.updated_at_ms = now_ms;
            self.save(&doc)?;
            Ok(id)
        })
    }

    /// Batch variant: a single critical section for the whole list
    /// (spec §4.7 `enqueueNodes`).
    pub fn enqueue_nodes(&self, items: Vec<(JobData, i32, u64)>, now_ms: u64) -> Result<Vec<JobId>> {
        with_lock(self.lock_path(), || {
            let mut doc = self.load()?;
            let mut ids = Vec::with_capacity(items.len());
            for (data, priority, delay_ms) in items {
                let job = Job::new(data, priority, now_ms + delay_ms, now_ms);
                let id = job.id.clone();
                doc.jobs.retain(|j| j.id != id);
                doc.jobs.push(job);
                ids.push(id);
            }
            doc.updated_at_ms = now_ms;
            self.save(&doc)?;
            Ok(ids)
        })
    }

    /// Atomically pick the highest-priority ready job (optionally scoped to
    /// one instance), flip it to active, and return a copy (spec §4.7
    /// `getNextJob`). Ordering: higher priority first, ties by `createdAt`
    /// ascending (FIFO within a priority).
    pub fn get_next_job(&self, instance_id: Option<InstanceId>, now_ms: u64) -> Result<Option<Job>> {
        with_lock(self.lock_path(), || {
            let mut doc = self.load()?;
            let chosen = doc
                .jobs
                .iter()
                .filter(|j| j.is_ready(now_ms))
                .filter(|j| instance_id.map(|id| j.data.instance_id == id).unwrap_or(true))
                .min_by(|a, b| (-a.priority, a.created_at_ms).cmp(&(-b.priority, b.created_at_ms)))
                .map(|j| j.id.clone());

            let Some(chosen_id) = chosen else { return Ok(None) };
            let job = doc.jobs.iter_mut().find(|j| j.id == chosen_id).expect("just selected");
            job.status = JobStatus::Active;
            let result = job.clone();
            doc.updated_at_ms = now_ms;
            self.save(&doc)?;
            Ok(Some(result))
        })
    }

    pub fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let doc = self.load()?;
        Ok(doc.jobs.iter().find(|j| &j.id == id).cloned())
    }

    pub fn complete_job(&self, id: &JobId, now_ms: u64) -> Result<()> {
        self.mutate_job(id, now_ms, |job| {
            job.status = JobStatus::Completed;
            job.completed_at_ms = Some(now_ms);
        })
    }

    /// Retry if the budget allows, else a terminal failure (spec §4.7
    /// `failJob`): `processAt = now + 2^attempts * 1s`.
    pub fn fail_job(&self, id: &JobId, error: impl Into<String>, now_ms: u64) -> Result<()> {
        let error = error.into();
        with_lock(self.lock_path(), || {
            let mut doc = self.load()?;
            let job = doc
                .jobs
                .iter_mut()
                .find(|j| &j.id == id)
                .ok_or_else(|| StorageError::NotFound(format!("job {id}")))?;
            job.error = Some(error);
            if job.attempt + 1 < job.max_attempts {
                job.attempt += 1;
                job.status = JobStatus::Waiting;
                job.process_at_ms = now_ms + Job::backoff_ms(job.attempt);
            } else {
                job.status = JobStatus::Failed;
            }
            doc.updated_at_ms = now_ms;
            self.save(&doc)
        })
    }

    /// Unconditional terminal failure, bypassing the retry budget
    /// (spec §4.7 `markJobFailed`).
    pub fn mark_job_failed(&self, id: &JobId, error: impl Into<String>, now_ms: u64) -> Result<()> {
        let error = error.into();
        self.mutate_job(id, now_ms, move |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error);
        })
    }

    /// `active -> human_waiting`: the node requires approval
    /// (spec §4.7 `markJobWaiting`).
    pub fn mark_job_waiting(&self, id: &JobId, now_ms: u64) -> Result<()> {
        self.mutate_job(id, now_ms, |job| job.status = JobStatus::HumanWaiting)
    }

    /// `human_waiting -> completed`: approval granted, node is done
    /// (spec §4.7 `resumeWaitingJob`).
    pub fn resume_waiting_job(&self, id: &JobId, now_ms: u64) -> Result<()> {
        self.mutate_job(id, now_ms, |job| {
            job.status = JobStatus::Completed;
            job.completed_at_ms = Some(now_ms);
        })
    }

    /// Bulk variant used by pause-resume (spec §4.7).
    pub fn resume_waiting_jobs_for_instance(&self, instance_id: InstanceId, now_ms: u64) -> Result<usize> {
        with_lock(self.lock_path(), || {
            let mut doc = self.load()?;
            let mut count = 0;
            for job in doc.jobs.iter_mut() {
                if job.data.instance_id == instance_id && job.status == JobStatus::HumanWaiting {
                    job.status = JobStatus::Completed;
                    job.completed_at_ms = Some(now_ms);
                    count += 1;
                }
            }
            doc.updated_at_ms = now_ms;
            self.save(&doc)?;
            Ok(count)
        })
    }

    pub fn get_waiting_human_jobs(&self) -> Result<Vec<Job>> {
        let doc = self.load()?;
        Ok(doc.jobs.into_iter().filter(|j| j.status == JobStatus::HumanWaiting).collect())
    }

    /// Delete waiting/delayed jobs of an instance, used on stop
    /// (spec §4.7 `removeWorkflowJobs`).
    pub fn remove_workflow_jobs(&self, instance_id: InstanceId, now_ms: u64) -> Result<usize> {
        with_lock(self.lock_path(), || {
            let mut doc = self.load()?;
            let before = doc.jobs.len();
            doc.jobs.retain(|j| !(j.data.instance_id == instance_id && j.status == JobStatus::Waiting));
            let removed = before - doc.jobs.len();
            doc.updated_at_ms = now_ms;
            self.save(&doc)?;
            Ok(removed)
        })
    }

    /// Keep the `keep_count` most recent terminal jobs, discard older ones
    /// (spec §4.7 `cleanupOldJobs`).
    pub fn cleanup_old_jobs(&self, keep_count: usize, now_ms: u64) -> Result<usize> {
        with_lock(self.lock_path(), || {
            let mut doc = self.load()?;
            let mut terminal: Vec<usize> = doc
                .jobs
                .iter()
                .enumerate()
                .filter(|(_, j)| matches!(j.status, JobStatus::Completed | JobStatus::Failed))
                .map(|(idx, _)| idx)
                .collect();
            terminal.sort_by_key(|&idx| std::cmp::Reverse(doc.jobs[idx].created_at_ms));

            let drop: std::collections::HashSet<usize> = terminal.into_iter().skip(keep_count).collect();
            let before = doc.jobs.len();
            let mut kept = Vec::with_capacity(before);
            for (idx, job) in doc.jobs.into_iter().enumerate() {
                if !drop.contains(&idx) {
                    kept.push(job);
                }
            }
            let removed = before - kept.len();
            doc.jobs = kept;
            doc.updated_at_ms = now_ms;
            self.save(&doc)?;
            Ok(removed)
        })
    }

    pub fn get_queue_stats(&self, now_ms: u64) -> Result<QueueStats> {
        let doc = self.load()?;
        Ok(tally(doc.jobs.iter(), now_ms))
    }

    /// Per-instance breakdown of [`QueueStats`], used by status queries
    /// that need to know how one instance's jobs are distributed across
    /// the queue rather than the whole daemon's aggregate.
    pub fn get_instance_queue_stats(&self, instance_id: InstanceId, now_ms: u64) -> Result<QueueStats> {
        let doc = self.load()?;
        Ok(tally(doc.jobs.iter().filter(|j| j.data.instance_id == instance_id), now_ms))
    }

    /// Crash recovery support (spec §4.12): jobs stuck `active` whose owning
    /// process is gone. Does not itself probe liveness; callers pass the
    /// set of ids to release.
    pub fn release_active_jobs(&self, ids: &[JobId], now_ms: u64) -> Result<()> {
        with_lock(self.lock_path(), || {
            let mut doc = self.load()?;
            for job in doc.jobs.iter_mut() {
                if ids.contains(&job.id) && job.status == JobStatus::Active {
                    job.status = JobStatus::Waiting;
                }
            }
            doc.updated_at_ms = now_ms;
            self.save(&doc)
        })
    }

    /// Override a job's retry budget after enqueueing (spec §4.9 "retry
    /// budget = max(node.retry.maxAttempts, queue default) per node").
    pub fn set_job_max_attempts(&self, id: &JobId, max_attempts: u32, now_ms: u64) -> Result<()> {
        self.mutate_job(id, now_ms, |job| job.max_attempts = max_attempts.max(1))
    }

    pub fn active_job_ids(&self) -> Result<Vec<JobId>> {
        let doc = self.load()?;
        Ok(doc.jobs.iter().filter(|j| j.status == JobStatus::Active).map(|j| j.id.clone()).collect())
    }

    /// Active jobs owned by one instance — crash recovery scopes lease
    /// release to the orphaned instance rather than every active job
    /// process-wide (spec §4.12 step 2).
    pub fn active_job_ids_for_instance(&self, instance_id: InstanceId) -> Result<Vec<JobId>> {
        let doc = self.load()?;
        Ok(doc
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Active && j.data.instance_id == instance_id)
            .map(|j| j.id.clone())
            .collect())
    }

    fn mutate_job(&self, id: &JobId, now_ms: u64, patch: impl FnOnce(&mut Job)) -> Result<()> {
        with_lock(self.lock_path(), || {
            let mut doc = self.load()?;
            let job = doc
                .jobs
                .iter_mut()
                .find(|j| &j.id == id)
                .ok_or_else(|| StorageError::NotFound(format!("job {id}")))?;
            patch(job);
            doc.updated_at_ms = now_ms;
            self.save(&doc)
        })
    }
}

fn tally<'a>(jobs: impl Iterator<Item = &'a Job>, now_ms: u64) -> QueueStats {
    let mut stats = QueueStats::default();
    for job in jobs {
        match job.status {
            JobStatus::Waiting if job.process_at_ms > now_ms => stats.delayed += 1,
            JobStatus::Waiting => stats.waiting += 1,
            JobStatus::Active => stats.active += 1,
            JobStatus::Completed => stats.completed += 1,
            JobStatus::Failed => stats.failed += 1,
            JobStatus::Delayed => stats.delayed += 1,
            JobStatus::HumanWaiting => stats.human_waiting += 1,
        }
    }
    stats
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
