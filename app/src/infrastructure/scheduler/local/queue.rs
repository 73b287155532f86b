use std::collections::{HashSet, VecDeque};

pub const QUEUE_UNLIMITED: &str = "unlimited";
pub const QUEUE_MULTI: &str = "multi";
pub const QUEUE_SINGLE: &str = "single";

/// One submission lane: FIFO pending list plus the set of jobs it has
/// running. `next_eligible` is the only way a job moves from pending to
/// running, which keeps the running count under the cap.
pub struct JobQueue {
    name: String,
    max_concurrent: Option<usize>,
    pending: VecDeque<String>,
    running: HashSet<String>,
}

impl JobQueue {
    pub fn new(name: impl Into<String>, max_concurrent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            max_concurrent,
            pending: VecDeque::new(),
            running: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_concurrent(&self) -> Option<usize> {
        self.max_concurrent
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn enqueue(&mut self, id: String) {
        self.pending.push_back(id);
    }

    /// Removes a job that has not started yet. False if it already left the
    /// pending list.
    pub fn remove_pending(&mut self, id: &str) -> bool {
        match self.pending.iter().position(|p| p == id) {
            Some(i) => {
                self.pending.remove(i);
                true
            }
            None => false,
        }
    }

    fn has_slot(&self) -> bool {
        self.max_concurrent.map_or(true, |max| self.running.len() < max)
    }

    /// Next job allowed to start, already accounted as running.
    pub fn next_eligible(&mut self) -> Option<String> {
        if !self.has_slot() {
            return None;
        }
        let id = self.pending.pop_front()?;
        self.running.insert(id.clone());
        Some(id)
    }

    /// Releases the slot a finished or killed job held.
    pub fn release(&mut self, id: &str) {
        self.running.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_jobs_fifo_within_the_cap() {
        let mut queue = JobQueue::new("multi", Some(2));
        for id in ["a", "b", "c"] {
            queue.enqueue(id.to_owned());
        }

        assert_eq!(queue.next_eligible().as_deref(), Some("a"));
        assert_eq!(queue.next_eligible().as_deref(), Some("b"));
        assert_eq!(queue.next_eligible(), None);
        assert_eq!(queue.running_count(), 2);

        queue.release("a");
        assert_eq!(queue.next_eligible().as_deref(), Some("c"));
    }

    #[test]
    fn unlimited_queue_never_blocks() {
        let mut queue = JobQueue::new("unlimited", None);
        for i in 0..100 {
            queue.enqueue(format!("job-{i}"));
        }
        for _ in 0..100 {
            assert!(queue.next_eligible().is_some());
        }
    }

    #[test]
    fn remove_pending_only_affects_unstarted_jobs() {
        let mut queue = JobQueue::new("single", Some(1));
        queue.enqueue("a".to_owned());
        queue.enqueue("b".to_owned());

        let started = queue.next_eligible().unwrap();
        assert!(!queue.remove_pending(&started));
        assert!(queue.remove_pending("b"));
        assert_eq!(queue.pending_count(), 0);
    }
}
