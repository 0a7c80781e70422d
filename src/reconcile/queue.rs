//! Pending reconciliation jobs.

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::model::Song;

/// One file waiting for tag extraction and reconciliation.
#[derive(Debug, Clone)]
pub struct Job {
    pub full_path: PathBuf,
    pub db_key: String,
    /// Path relative to the directory being processed, `/`-separated.
    pub relative_path: String,
    /// The record already stored for this file, if any.
    pub existing: Option<Song>,
}

/// FIFO of jobs with a soft limit.
///
/// The limit is advisory: producers check [`JobQueue::has_room`] before
/// pulling more candidates. Once closed, pushes are refused and the
/// remaining jobs can still be popped.
#[derive(Debug)]
pub struct JobQueue {
    jobs: VecDeque<Job>,
    limit: usize,
    high_water: usize,
    closed: bool,
}

impl JobQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            jobs: VecDeque::new(),
            limit: limit.max(1),
            high_water: 0,
            closed: false,
        }
    }

    /// Append a job. Returns `false`, dropping the job, once closed.
    pub fn push(&mut self, job: Job) -> bool {
        if self.closed {
            return false;
        }
        self.jobs.push_back(job);
        self.high_water = self.high_water.max(self.jobs.len());
        true
    }

    pub fn pop(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    pub fn has_room(&self) -> bool {
        !self.closed && self.jobs.len() < self.limit
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Deepest the queue has been.
    pub fn high_water(&self) -> usize {
        self.high_water
    }
}
