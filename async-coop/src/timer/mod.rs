//! Ordered index of sleeping tasks
//!
//! Entries are keyed by task slot; each task has at most one entry. Both implementations order
//! entries by deadline (wrap-aware) and break ties in insertion order, so swapping one for the
//! other never changes which task wakes first.

use crate::time::{self, Ticks};

pub mod fast;
pub mod small;

/// A deadline-ordered set of task slots
pub trait TimerIndex {
    /// Adds an entry for `task`
    ///
    /// Returns `false` if `task` is already indexed or out of range
    fn insert(&mut self, task: usize, deadline: Ticks) -> bool;

    /// Removes the entry of `task`, if any
    fn remove(&mut self, task: usize) -> bool;

    /// The deadline `task` is indexed under, if any
    fn deadline(&self, task: usize) -> Option<Ticks>;

    /// The entry that expires next
    fn first(&self) -> Option<(usize, Ticks)>;

    /// Number of entries
    fn len(&self) -> usize;

    /// Visits every entry in expiry order
    fn for_each(&self, f: &mut dyn FnMut(usize, Ticks));

    /// Is there an entry for `task`?
    fn contains(&self, task: usize) -> bool {
        self.deadline(task).is_some()
    }

    /// Are there no entries?
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns the next entry if its deadline has been reached at `now`
    fn pop_due(&mut self, now: Ticks) -> Option<usize> {
        let (task, deadline) = self.first()?;
        if time::expired(deadline, now) {
            self.remove(task);
            Some(task)
        } else {
            None
        }
    }

    /// Removes every expired entry, earliest first, handing each task to `wake`
    fn run_due(&mut self, now: Ticks, wake: &mut dyn FnMut(usize)) -> usize {
        let mut n = 0;
        while let Some(task) = self.pop_due(now) {
            wake(task);
            n += 1;
        }
        n
    }

    /// Ticks until the next entry expires; `None` if there are no entries
    fn time_until_next(&self, now: Ticks) -> Option<Ticks> {
        self.first()
            .map(|(_, deadline)| time::remaining(deadline, now))
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::{fast, small, TimerIndex};

    fn drain(index: &mut dyn TimerIndex, now: u32) -> Vec<usize> {
        let mut woken = Vec::new();
        index.run_due(now, &mut |task| woken.push(task));
        woken
    }

    fn scenario(index: &mut dyn TimerIndex) -> Vec<usize> {
        assert!(index.insert(3, 300));
        assert!(index.insert(1, 250));
        assert!(index.insert(5, 250));
        assert!(index.insert(0, 1200));
        assert!(index.insert(2, 100));
        assert!(!index.insert(2, 50));
        assert!(index.remove(0));
        assert!(!index.remove(0));
        assert_eq!(index.time_until_next(40), Some(60));

        let mut woken = drain(index, 99);
        assert!(woken.is_empty());
        woken.extend(drain(index, 250));
        assert_eq!(index.time_until_next(250), Some(50));
        woken.extend(drain(index, 1000));
        assert_eq!(index.time_until_next(1000), None);
        woken
    }

    #[test]
    fn implementations_agree() {
        let mut tree = fast::Timers::<8>::new();
        let mut list = small::Timers::<8>::new();

        let a = scenario(&mut tree);
        let b = scenario(&mut list);
        assert_eq!(a, [2, 1, 5, 3]);
        assert_eq!(a, b);
    }

    #[test]
    fn expired_entries_report_zero_wait() {
        let mut tree = fast::Timers::<2>::new();
        tree.insert(0, 10);
        assert_eq!(tree.time_until_next(15), Some(0));
        assert_eq!(tree.pop_due(15), Some(0));
        assert!(tree.is_empty());
    }

    #[test]
    fn deadlines_across_the_wrap() {
        let mut tree = fast::Timers::<4>::new();
        let mut list = small::Timers::<4>::new();
        let now = u32::MAX - 10;

        for index in [&mut tree as &mut dyn TimerIndex, &mut list] {
            index.insert(0, now.wrapping_add(20));
            index.insert(1, now.wrapping_add(5));
            index.insert(2, now.wrapping_add(15));
            assert_eq!(drain(index, now.wrapping_add(20)), [1, 2, 0]);
        }
    }

    #[test]
    fn iteration_is_ordered() {
        let mut list = small::Timers::<4>::new();
        list.insert(0, 30);
        list.insert(1, 10);
        list.insert(2, 20);

        let mut seen = Vec::new();
        list.for_each(&mut |task, deadline| seen.push((task, deadline)));
        assert_eq!(seen, [(1, 10), (2, 20), (0, 30)]);
    }

    #[test]
    fn deadline_of_an_entry() {
        let mut tree = fast::Timers::<4>::new();
        let mut list = small::Timers::<4>::new();

        for index in [&mut tree as &mut dyn TimerIndex, &mut list] {
            index.insert(1, 40);
            assert_eq!(index.deadline(1), Some(40));
            assert!(index.contains(1));
            assert_eq!(index.deadline(0), None);
            assert_eq!(index.deadline(9), None);
            index.remove(1);
            assert_eq!(index.deadline(1), None);
        }
    }
}
