//! Red-black tree timer index
//!
//! O(log n) insertion and removal; nodes live in an arena indexed by task slot. The key is
//! `(deadline, seq)` where `seq` is taken from a counter at insertion, which makes equal
//! deadlines expire in insertion order.

use core::cmp::Ordering;

use super::TimerIndex;
use crate::time::{self, Ticks};

#[derive(Clone, Copy)]
struct Node {
    parent: Option<u16>,
    left: Option<u16>,
    right: Option<u16>,
    red: bool,
    linked: bool,
    deadline: Ticks,
    seq: u32,
}

impl Node {
    const FREE: Node = Node {
        parent: None,
        left: None,
        right: None,
        red: false,
        linked: false,
        deadline: 0,
        seq: 0,
    };
}

/// Red-black tree over `N` task slots
pub struct Timers<const N: usize> {
    nodes: [Node; N],
    root: Option<u16>,
    len: usize,
    seq: u32,
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
            root: None,
            len: 0,
            seq: 0,
        }
    }

    fn parent(&self, x: usize) -> Option<usize> {
        self.nodes[x].parent.map(usize::from)
    }

    fn left(&self, x: usize) -> Option<usize> {
        self.nodes[x].left.map(usize::from)
    }

    fn right(&self, x: usize) -> Option<usize> {
        self.nodes[x].right.map(usize::from)
    }

    fn set_parent(&mut self, x: Option<usize>, parent: Option<usize>) {
        if let Some(x) = x {
            self.nodes[x].parent = parent.map(|p| p as u16);
        }
    }

    fn set_left(&mut self, x: usize, left: Option<usize>) {
        self.nodes[x].left = left.map(|l| l as u16);
    }

    fn set_right(&mut self, x: usize, right: Option<usize>) {
        self.nodes[x].right = right.map(|r| r as u16);
    }

    fn is_red(&self, x: Option<usize>) -> bool {
        x.map_or(false, |x| self.nodes[x].red)
    }

    fn set_red(&mut self, x: Option<usize>, red: bool) {
        if let Some(x) = x {
            self.nodes[x].red = red;
        }
    }

    fn cmp(&self, a: usize, b: usize) -> Ordering {
        let (a, b) = (&self.nodes[a], &self.nodes[b]);
        time::deadline_cmp(a.deadline, b.deadline)
            .then_with(|| (a.seq.wrapping_sub(b.seq) as i32).cmp(&0))
    }

    fn minimum(&self, mut x: usize) -> usize {
        while let Some(left) = self.left(x) {
            x = left;
        }
        x
    }

    fn successor(&self, x: usize) -> Option<usize> {
        if let Some(right) = self.right(x) {
            return Some(self.minimum(right));
        }
        let mut x = x;
        let mut parent = self.parent(x);
        while let Some(p) = parent {
            if self.right(p) != Some(x) {
                break;
            }
            x = p;
            parent = self.parent(p);
        }
        parent
    }

    /// Puts `new` where `old` was, as seen from `old`'s parent
    fn replace_child(&mut self, old: usize, new: Option<usize>) {
        let parent = self.parent(old);
        match parent {
            None => self.root = new.map(|n| n as u16),
            Some(p) => {
                if self.left(p) == Some(old) {
                    self.set_left(p, new)
                } else {
                    self.set_right(p, new)
                }
            }
        }
        self.set_parent(new, parent);
    }

    fn rotate_left(&mut self, x: usize) {
        let Some(y) = self.right(x) else { return };
        let inner = self.left(y);
        self.set_right(x, inner);
        self.set_parent(inner, Some(x));
        self.replace_child(x, Some(y));
        self.set_left(y, Some(x));
        self.set_parent(Some(x), Some(y));
    }

    fn rotate_right(&mut self, x: usize) {
        let Some(y) = self.left(x) else { return };
        let inner = self.right(y);
        self.set_left(x, inner);
        self.set_parent(inner, Some(x));
        self.replace_child(x, Some(y));
        self.set_right(y, Some(x));
        self.set_parent(Some(x), Some(y));
    }

    fn insert_fixup(&mut self, mut z: usize) {
        loop {
            let Some(p) = self.parent(z) else { break };
            if !self.is_red(Some(p)) {
                break;
            }
            // a red node is never the root, so `p` has a parent
            let Some(g) = self.parent(p) else { break };

            if self.left(g) == Some(p) {
                let uncle = self.right(g);
                if self.is_red(uncle) {
                    self.set_red(Some(p), false);
                    self.set_red(uncle, false);
                    self.set_red(Some(g), true);
                    z = g;
                } else {
                    if self.right(p) == Some(z) {
                        z = p;
                        self.rotate_left(z);
                    }
                    let p = self.parent(z);
                    let g = p.and_then(|p| self.parent(p));
                    self.set_red(p, false);
                    self.set_red(g, true);
                    if let Some(g) = g {
                        self.rotate_right(g);
                    }
                }
            } else {
                let uncle = self.left(g);
                if self.is_red(uncle) {
                    self.set_red(Some(p), false);
                    self.set_red(uncle, false);
                    self.set_red(Some(g), true);
                    z = g;
                } else {
                    if self.left(p) == Some(z) {
                        z = p;
                        self.rotate_right(z);
                    }
                    let p = self.parent(z);
                    let g = p.and_then(|p| self.parent(p));
                    self.set_red(p, false);
                    self.set_red(g, true);
                    if let Some(g) = g {
                        self.rotate_left(g);
                    }
                }
            }
        }
        let root = self.root.map(usize::from);
        self.set_red(root, false);
    }

    fn delete(&mut self, z: usize) {
        let x;
        let x_parent;
        let removed_red;

        match (self.left(z), self.right(z)) {
            (None, right) => {
                removed_red = self.nodes[z].red;
                x = right;
                x_parent = self.parent(z);
                self.replace_child(z, right);
            }
            (left @ Some(_), None) => {
                removed_red = self.nodes[z].red;
                x = left;
                x_parent = self.parent(z);
                self.replace_child(z, left);
            }
            (Some(left), Some(right)) => {
                // splice out the successor `y` and move it into `z`'s position
                let y = self.minimum(right);
                removed_red = self.nodes[y].red;
                x = self.right(y);
                if self.parent(y) == Some(z) {
                    x_parent = Some(y);
                } else {
                    x_parent = self.parent(y);
                    self.replace_child(y, x);
                    self.set_right(y, Some(right));
                    self.set_parent(Some(right), Some(y));
                }
                self.replace_child(z, Some(y));
                self.set_left(y, Some(left));
                self.set_parent(Some(left), Some(y));
                self.nodes[y].red = self.nodes[z].red;
            }
        }

        if !removed_red {
            self.delete_fixup(x, x_parent);
        }
        self.nodes[z] = Node::FREE;
    }

    fn delete_fixup(&mut self, mut x: Option<usize>, mut parent: Option<usize>) {
        while x.map(|x| x as u16) != self.root && !self.is_red(x) {
            let Some(p) = parent else { break };

            if self.left(p) == x {
                let Some(mut w) = self.right(p) else { break };
                if self.is_red(Some(w)) {
                    self.set_red(Some(w), false);
                    self.set_red(Some(p), true);
                    self.rotate_left(p);
                    let Some(sibling) = self.right(p) else { break };
                    w = sibling;
                }
                if !self.is_red(self.left(w)) && !self.is_red(self.right(w)) {
                    self.set_red(Some(w), true);
                    x = Some(p);
                    parent = self.parent(p);
                } else {
                    if !self.is_red(self.right(w)) {
                        self.set_red(self.left(w), false);
                        self.set_red(Some(w), true);
                        self.rotate_right(w);
                        let Some(sibling) = self.right(p) else { break };
                        w = sibling;
                    }
                    self.nodes[w].red = self.nodes[p].red;
                    self.set_red(Some(p), false);
                    self.set_red(self.right(w), false);
                    self.rotate_left(p);
                    x = self.root.map(usize::from);
                    parent = None;
                }
            } else {
                let Some(mut w) = self.left(p) else { break };
                if self.is_red(Some(w)) {
                    self.set_red(Some(w), false);
                    self.set_red(Some(p), true);
                    self.rotate_right(p);
                    let Some(sibling) = self.left(p) else { break };
                    w = sibling;
                }
                if !self.is_red(self.left(w)) && !self.is_red(self.right(w)) {
                    self.set_red(Some(w), true);
                    x = Some(p);
                    parent = self.parent(p);
                } else {
                    if !self.is_red(self.left(w)) {
                        self.set_red(self.right(w), false);
                        self.set_red(Some(w), true);
                        self.rotate_left(w);
                        let Some(sibling) = self.left(p) else { break };
                        w = sibling;
                    }
                    self.nodes[w].red = self.nodes[p].red;
                    self.set_red(Some(p), false);
                    self.set_red(self.left(w), false);
                    self.rotate_right(p);
                    x = self.root.map(usize::from);
                    parent = None;
                }
            }
        }
        self.set_red(x, false);
    }
}

impl<const N: usize> TimerIndex for Timers<N> {
    fn insert(&mut self, task: usize, deadline: Ticks) -> bool {
        if task >= N || self.nodes[task].linked {
            return false;
        }

        let seq = self.seq;
        self.nodes[task] = Node {
            deadline,
            seq,
            red: true,
            linked: true,
            ..Node::FREE
        };

        let mut parent = None;
        let mut cursor = self.root.map(usize::from);
        let mut go_left = false;
        while let Some(c) = cursor {
            parent = Some(c);
            match self.cmp(task, c) {
                Ordering::Less => {
                    go_left = true;
                    cursor = self.left(c);
                }
                Ordering::Greater => {
                    go_left = false;
                    cursor = self.right(c);
                }
                Ordering::Equal => {
                    // same deadline and same sequence number
                    self.nodes[task] = Node::FREE;
                    return false;
                }
            }
        }

        self.set_parent(Some(task), parent);
        match parent {
            None => self.root = Some(task as u16),
            Some(p) if go_left => self.set_left(p, Some(task)),
            Some(p) => self.set_right(p, Some(task)),
        }

        self.seq = seq.wrapping_add(1);
        self.len += 1;
        self.insert_fixup(task);
        true
    }

    fn remove(&mut self, task: usize) -> bool {
        if task >= N || !self.nodes[task].linked {
            return false;
        }
        self.delete(task);
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
        let first = self.minimum(usize::from(self.root?));
        Some((first, self.nodes[first].deadline))
    }

    fn len(&self) -> usize {
        self.len
    }

    fn for_each(&self, f: &mut dyn FnMut(usize, Ticks)) {
        let mut cursor = self.root.map(|root| self.minimum(usize::from(root)));
        while let Some(x) = cursor {
            f(x, self.nodes[x].deadline);
            cursor = self.successor(x);
        }
    }
}
