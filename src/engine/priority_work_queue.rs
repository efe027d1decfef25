// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Priority queue of ready nodes.
//!
//! # Priority Ordering
//!
//! Tasks are ordered by:
//! 1. **Topological Rank** (lower = earlier; roots first)
//! 2. **Node ID** (lexicographic, so dispatch order is reproducible)
//!
//! # Examples
//!
//! ```rust
//! use petflow::engine::priority_work_queue::{PriorityWorkQueue, PrioritizedTask};
//!
//! let mut queue = PriorityWorkQueue::new();
//! queue.push(PrioritizedTask::new("pet_coreg.run".to_string(), 1));
//! queue.push(PrioritizedTask::new("pet_hmc.run".to_string(), 0));
//! queue.push(PrioritizedTask::new("anat_reference".to_string(), 0));
//!
//! assert_eq!(queue.pop(), Some("anat_reference".to_string()));
//! assert_eq!(queue.pop(), Some("pet_hmc.run".to_string()));
//! assert_eq!(queue.pop(), Some("pet_coreg.run".to_string()));
//! assert_eq!(queue.pop(), None);
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A node ready for dispatch.
#[derive(Debug, Clone)]
pub struct PrioritizedTask {
    pub node_id: String,
    pub topological_rank: usize,
}

impl PrioritizedTask {
    pub fn new(node_id: String, topological_rank: usize) -> Self {
        Self {
            node_id,
            topological_rank,
        }
    }
}

impl PartialEq for PrioritizedTask {
    /// Equality based solely on node ID for task identity.
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }
}

impl Eq for PrioritizedTask {}

impl PartialOrd for PrioritizedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedTask {
    /// `BinaryHeap` is a max-heap, so the comparison is reversed: the lowest
    /// rank, then the smallest id, compares greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .topological_rank
            .cmp(&self.topological_rank)
            .then_with(|| other.node_id.cmp(&self.node_id))
    }
}

#[derive(Debug, Default)]
pub struct PriorityWorkQueue {
    heap: BinaryHeap<PrioritizedTask>,
}

impl PriorityWorkQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, task: PrioritizedTask) {
        self.heap.push(task);
    }

    pub fn extend<I>(&mut self, tasks: I)
    where
        I: IntoIterator<Item = PrioritizedTask>,
    {
        self.heap.extend(tasks);
    }

    /// Removes and returns the highest-priority node id.
    pub fn pop(&mut self) -> Option<String> {
        self.heap.pop().map(|task| task.node_id)
    }

    pub fn peek(&self) -> Option<&PrioritizedTask> {
        self.heap.peek()
    }

    /// Empties the queue, returning the ids in priority order.
    pub fn drain_ordered(&mut self) -> Vec<String> {
        let mut ids = Vec::with_capacity(self.heap.len());
        while let Some(id) = self.pop() {
            ids.push(id);
        }
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
