//! FIFO of agent tasks waiting to become jobs.
//!
//! The queue is ordered by `enqueued_at`. [`TaskQueue::drain_next`] pops
//! under the queue lock, so concurrent drainers each receive a different
//! task and a task is never handed out twice.

use std::collections::VecDeque;

use lookgen_core::task::{Task, TaskSummary};
use lookgen_core::types::Timestamp;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task in `enqueued_at` order. Returns the new queue depth.
    pub async fn enqueue(&self, task: Task) -> usize {
        let mut tasks = self.tasks.lock().await;
        // Almost always appends; only a task stamped before a concurrent
        // enqueue that won the lock has to be slotted in.
        let pos = tasks
            .iter()
            .rposition(|t| t.enqueued_at <= task.enqueued_at)
            .map_or(0, |i| i + 1);
        tasks.insert(pos, task);
        tasks.len()
    }

    /// Remove and return the oldest task, or `None` when empty.
    pub async fn drain_next(&self) -> Option<Task> {
        self.tasks.lock().await.pop_front()
    }

    /// Put back a task whose job could not be created, ahead of everything
    /// else so it keeps its place.
    pub async fn restore_front(&self, task: Task) {
        self.tasks.lock().await.push_front(task);
    }

    /// When the oldest queued task was enqueued.
    pub async fn oldest_enqueued_at(&self) -> Option<Timestamp> {
        self.tasks.lock().await.front().map(|t| t.enqueued_at)
    }

    pub async fn depth(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Summaries of the oldest `limit` queued tasks.
    pub async fn pending(&self, limit: usize) -> Vec<TaskSummary> {
        self.tasks
            .lock()
            .await
            .iter()
            .take(limit)
            .map(Task::summary)
            .collect()
    }
}
