//! Cooperative idle-task queue
//!
//! Work that may lag behind the caller (index flushes, queued saves) is
//! scheduled here and drained when the owner goes idle or the oldest task
//! has waited past a deadline. Scheduling a task that is already pending is
//! a no-op, which is what coalesces bursts of mutations into one flush.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdleTask {
    FlushIndex,
    /// Persist the queued content of one conversation
    PersistChat(String),
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    pending: VecDeque<IdleTask>,
    oldest_since: Option<Instant>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the task was not already pending
    pub fn schedule(&mut self, task: IdleTask) -> bool {
        if self.pending.contains(&task) {
            return false;
        }
        if self.pending.is_empty() {
            self.oldest_since = Some(Instant::now());
        }
        self.pending.push_back(task);
        true
    }

    /// Take every pending task, oldest first
    pub fn drain(&mut self) -> Vec<IdleTask> {
        self.oldest_since = None;
        self.pending.drain(..).collect()
    }

    pub fn is_pending(&self, task: &IdleTask) -> bool {
        self.pending.contains(task)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True once the oldest pending task has waited at least `max_delay`
    pub fn is_overdue(&self, max_delay: Duration) -> bool {
        self.oldest_since
            .map(|since| since.elapsed() >= max_delay)
            .unwrap_or(false)
    }
}
