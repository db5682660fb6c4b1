//! Sorted list timer index
//!
//! Linear insertion, O(1) removal. Smallest code and memory footprint; fine for a handful of
//! sleeping tasks.

use core::cmp::Ordering;

use super::TimerIndex;
use crate::time::{self, Ticks};

#[derive(Clone, Copy)]
struct Node {
    prev: Option<u16>,
    next: Option<u16>,
    linked: bool,
    deadline: Ticks,
}

impl Node {
    const FREE: Node = Node {
        prev: None,
        next: None,
        linked: false,
        deadline: 0,
    };
}

/// Sorted list over `N` task slots
pub struct Timers<const N: usize> {
    nodes: [Node; N],
    first: Option<u16>,
    last: Option<u16>,
    len: usize,
}

impl<const N: usize> Default for Timers<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Timers<N> {
    /// Creates an empty index
    pub const fn new() -> Self {
        Self {
            nodes: [Node::FREE; N],
            first: None,
            last: None,
            len: 0,
        }
    }
}

impl<const N: usize> TimerIndex for Timers<N> {
    fn insert(&mut self, task: usize, deadline: Ticks) -> bool {
        if task >= N || self.nodes[task].linked {
            return false;
        }

        // skip every entry due no later than `deadline`; equal deadlines stay FIFO
        let mut before = self.first;
        while let Some(b) = before {
            let node = &self.nodes[usize::from(b)];
            if time::deadline_cmp(node.deadline, deadline) == Ordering::Greater {
                break;
            }
            before = node.next;
        }

        let id = task as u16;
        let prev = match before {
            Some(b) => self.nodes[usize::from(b)].prev,
            None => self.last,
        };
        self.nodes[task] = Node {
            prev,
            next: before,
            linked: true,
            deadline,
        };
        match prev {
            Some(p) => self.nodes[usize::from(p)].next = Some(id),
            None => self.first = Some(id),
        }
        match before {
            Some(b) => self.nodes[usize::from(b)].prev = Some(id),
            None => self.last = Some(id),
        }
        self.len += 1;
        true
    }

    fn remove(&mut self, task: usize) -> bool {
        if task >= N || !self.nodes[task].linked {
            return false;
        }

        let node = self.nodes[task];
        match node.prev {
            Some(p) => self.nodes[usize::from(p)].next = node.next,
            None => self.first = node.next,
        }
        match node.next {
            Some(n) => self.nodes[usize::from(n)].prev = node.prev,
            None => self.last = node.prev,
        }
        self.nodes[task] = Node::FREE;
        self.len -= 1;
        true
    }

    fn deadline(&self, task: usize) -> Option<Ticks> {
        self.nodes
            .get(task)
            .filter(|node| node.linked)
            .map(|node| node.deadline)
    }

    fn first(&self) -> Option<(usize, Ticks)> {
        let first = usize::from(self.first?);
        Some((first, self.nodes[first].deadline))
    }

    fn len(&self) -> usize {
        self.len
    }

    fn for_each(&self, f: &mut dyn FnMut(usize, Ticks)) {
        let mut cursor = self.first;
        while let Some(x) = cursor {
            let node = &self.nodes[usize::from(x)];
            f(usize::from(x), node.deadline);
            cursor = node.next;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;

    #[test]
    fn remove_keeps_links_consistent() {
        let mut timers = Timers::<4>::new();
        timers.insert(0, 5);
        timers.insert(1, 10);
        timers.insert(2, 15);

        assert!(timers.remove(1));
        assert!(timers.remove(2));
        assert!(timers.insert(3, 1));
        assert!(timers.insert(2, 7));

        let mut order = Vec::new();
        timers.for_each(&mut |task, _| order.push(task));
        assert_eq!(order, [3, 0, 2]);
        assert_eq!(timers.len(), 3);
    }
}
