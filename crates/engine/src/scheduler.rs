//! DAG scheduler: priority assignment for task attempts, and the queue the
//! resource-manager communicator drains asks from in priority order.

use am_common::ids::TaskAttemptId;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;

/// `priority = 2 * (distance_from_root + 1)`. Lower numeric priority is
/// considered first by the RM communicator; rescheduled attempts get
/// `base - 1`, one integer ahead of fresh attempts at the same distance.
pub fn base_priority(distance_from_root: u32) -> i32 {
    2 * (distance_from_root as i32 + 1)
}

/// Priority-ordered queue of pending container asks. `priority_queue`'s
/// `PriorityQueue` is a max-heap, so asks are keyed by `Reverse(priority)`
/// to make the lowest number pop first.
#[derive(Default)]
pub struct AskQueue {
    inner: PriorityQueue<TaskAttemptId, Reverse<i32>>,
}

impl AskQueue {
    pub fn new() -> Self {
        Self { inner: PriorityQueue::new() }
    }

    pub fn push(&mut self, attempt: TaskAttemptId, priority: i32) {
        self.inner.push(attempt, Reverse(priority));
    }

    pub fn pop(&mut self) -> Option<(TaskAttemptId, i32)> {
        self.inner.pop().map(|(attempt, Reverse(p))| (attempt, p))
    }

    pub fn remove(&mut self, attempt: &TaskAttemptId) -> bool {
        self.inner.remove(attempt).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
