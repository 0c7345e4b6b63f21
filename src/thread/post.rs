/*!
 * Posted Work Queue
 * Priority-ordered queue of deferred callables
 */

use std::collections::VecDeque;
use std::fmt;

/// Deferred callable
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A callable posted for later execution, with its priority
pub struct WorkItem {
    priority: i32,
    job: Job,
}

impl WorkItem {
    pub fn new<F>(priority: i32, job: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            priority,
            job: Box::new(job),
        }
    }

    pub(crate) fn from_job(priority: i32, job: Job) -> Self {
        Self { priority, job }
    }

    #[inline]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Consume the item and run its callable
    pub fn run(self) {
        (self.job)()
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Queue ordered by descending priority, insertion order within a priority
///
/// Appending is the common case: when the tail's priority is at least the
/// new item's, the item goes to the back without searching. Otherwise it
/// is inserted after the last item of equal or higher priority.
#[derive(Debug, Default)]
pub struct PostQueue {
    items: VecDeque<WorkItem>,
}

impl PostQueue {
    pub const fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn enqueue(&mut self, item: WorkItem) {
        let append = self
            .items
            .back()
            .map_or(true, |last| last.priority >= item.priority);

        if append {
            self.items.push_back(item);
        } else {
            // Upper bound: first position whose priority is lower than ours
            let at = self.items.partition_point(|e| e.priority >= item.priority);
            self.items.insert(at, item);
        }
    }

    /// Remove the highest-priority, oldest item
    pub fn dequeue(&mut self) -> Option<WorkItem> {
        self.items.pop_front()
    }

    /// Return an item just taken with [`dequeue`](Self::dequeue) to the front
    pub(crate) fn requeue(&mut self, item: WorkItem) {
        self.items.push_front(item);
    }

    /// Priority of the next item, if any
    pub fn peek_priority(&self) -> Option<i32> {
        self.items.front().map(WorkItem::priority)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every queued item, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        dropped
    }
}
