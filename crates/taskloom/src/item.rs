//! Schedulable unit ordered by (due time, sequence id)

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Zero-argument, run-once callback
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Entry in a runner's time-ordered heap
pub struct Item {
    /// When this item becomes runnable, on the owning runner's clock
    due_time: Duration,
    /// Post-order tie-break for equal due times
    sequence_id: u64,
    /// Callback to run
    task: Task,
}

impl Item {
    /// Create a new item
    pub fn new(due_time: Duration, sequence_id: u64, task: Task) -> Self {
        Self {
            due_time,
            sequence_id,
            task,
        }
    }

    /// When this item becomes runnable
    pub fn due_time(&self) -> Duration {
        self.due_time
    }

    /// Sequence number assigned at post time
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Whether the item is runnable at `now`
    pub fn is_due(&self, now: Duration) -> bool {
        self.due_time <= now
    }

    /// Consume the item, yielding its callback
    pub fn into_task(self) -> Task {
        self.task
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("due_time", &self.due_time)
            .field("sequence_id", &self.sequence_id)
            .finish_non_exhaustive()
    }
}

// Reverse ordering for min-heap (earliest due time, then lowest id, first)
impl Ord for Item {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due_time
            .cmp(&self.due_time)
            .then_with(|| other.sequence_id.cmp(&self.sequence_id))
    }
}

impl PartialOrd for Item {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.due_time == other.due_time && self.sequence_id == other.sequence_id
    }
}

impl Eq for Item {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn item(due_ms: u64, id: u64) -> Item {
        Item::new(Duration::from_millis(due_ms), id, Box::new(|| {}))
    }

    #[test]
    fn test_heap_pops_earliest_first() {
        let mut heap = BinaryHeap::new();
        heap.push(item(30, 0));
        heap.push(item(10, 1));
        heap.push(item(20, 2));

        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|i| i.due_time().as_millis())
            .collect();
        assert_eq!(order, vec![10, 20, 30]);
    }

    #[test]
    fn test_equal_due_time_breaks_ties_by_sequence() {
        let mut heap = BinaryHeap::new();
        for id in [4, 2, 0, 3, 1] {
            heap.push(item(5, id));
        }

        let ids: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|i| i.sequence_id())
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_is_due_boundary() {
        let i = item(100, 0);
        assert!(!i.is_due(Duration::from_millis(99)));
        assert!(i.is_due(Duration::from_millis(100)));
        assert!(i.is_due(Duration::from_millis(101)));
    }

    #[test]
    fn test_into_task_runs_move_only_payload() {
        let payload = String::from("moved");
        let (tx, rx) = crossbeam::channel::unbounded();
        let i = Item::new(Duration::ZERO, 0, Box::new(move || tx.send(payload).unwrap()));
        (i.into_task())();
        assert_eq!(rx.recv().unwrap(), "moved");
    }
}
