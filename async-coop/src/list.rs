//! Intrusive doubly linked lists over the task arena
//!
//! Every task owns exactly one link node, so a task can be a member of at most one list at a
//! time. Nodes are addressed by task slot index and remember which list holds them, which
//! makes `detach` O(1) without knowing the list in advance.
//!
//! There is one ready queue and a pool of wait list heads. A wait list head is taken from the
//! pool when the first task blocks on a primitive and returned as soon as the list empties;
//! since every member of a non-empty list is a distinct blocked task, `N` heads are always
//! enough. Primitives refer to their head through a `WaitList` handle whose key carries the
//! stamp the head was allocated with. Stamps come from one 64-bit counter and are never
//! handed out twice, so a recycled head is never mistaken for the old one.

use core::cell::Cell;

/// Handle to a wait list head in the scheduler arena
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct WaitKey {
    slot: u16,
    stamp: u64,
}

/// The list a node belongs to
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ListId {
    Ready,
    Wait(WaitKey),
}

#[derive(Clone, Copy)]
struct Node {
    prev: Option<u16>,
    next: Option<u16>,
    owner: Option<ListId>,
}

impl Node {
    const UNLINKED: Node = Node {
        prev: None,
        next: None,
        owner: None,
    };
}

#[derive(Clone, Copy)]
struct Head {
    first: Option<u16>,
    last: Option<u16>,
    len: u16,
    stamp: u64,
    in_use: bool,
}

impl Head {
    const EMPTY: Head = Head {
        first: None,
        last: None,
        len: 0,
        stamp: 0,
        in_use: false,
    };
}

/// Link nodes for `N` tasks, the ready queue and `N` wait list heads
pub(crate) struct Lists<const N: usize> {
    nodes: [Node; N],
    waits: [Head; N],
    ready: Head,
    // last stamp handed out
    stamp: u64,
}

impl<const N: usize> Lists<N> {
    pub(crate) const fn new() -> Self {
        Self {
            nodes: [Node::UNLINKED; N],
            waits: [Head::EMPTY; N],
            ready: Head {
                in_use: true,
                ..Head::EMPTY
            },
            stamp: 0,
        }
    }

    fn head(&self, list: ListId) -> Option<&Head> {
        match list {
            ListId::Ready => Some(&self.ready),
            ListId::Wait(key) => self
                .waits
                .get(usize::from(key.slot))
                .filter(|head| head.in_use && head.stamp == key.stamp),
        }
    }

    fn head_mut(&mut self, list: ListId) -> Option<&mut Head> {
        match list {
            ListId::Ready => Some(&mut self.ready),
            ListId::Wait(key) => self
                .waits
                .get_mut(usize::from(key.slot))
                .filter(|head| head.in_use && head.stamp == key.stamp),
        }
    }

    /// Takes an unused wait list head from the pool
    pub(crate) fn alloc(&mut self) -> Option<WaitKey> {
        let stamp = self.stamp.checked_add(1)?;
        let (slot, head) = self
            .waits
            .iter_mut()
            .enumerate()
            .find(|(_, head)| !head.in_use)?;
        head.in_use = true;
        head.stamp = stamp;
        self.stamp = stamp;
        Some(WaitKey {
            slot: slot as u16,
            stamp,
        })
    }

    /// Does `key` still name a live wait list?
    pub(crate) fn is_live(&self, key: WaitKey) -> bool {
        self.head(ListId::Wait(key)).is_some()
    }

    /// Appends `task` at the far end of `list`, unlinking it from its current list first
    ///
    /// Returns `false` if `list` is a stale wait list
    pub(crate) fn attach(&mut self, list: ListId, task: usize) -> bool {
        if self.head(list).is_none() || task >= N {
            return false;
        }
        self.detach(task);

        let id = task as u16;
        let Some(head) = self.head_mut(list) else {
            // `detach` released the very list we are about to attach to
            return false;
        };
        let last = head.last;
        head.last = Some(id);
        if head.first.is_none() {
            head.first = Some(id);
        }
        head.len += 1;

        if let Some(last) = last {
            self.nodes[usize::from(last)].next = Some(id);
        }
        self.nodes[task] = Node {
            prev: last,
            next: None,
            owner: Some(list),
        };
        true
    }

    /// Unlinks `task` from whatever list holds it
    pub(crate) fn detach(&mut self, task: usize) -> Option<ListId> {
        let node = *self.nodes.get(task)?;
        let owner = node.owner?;

        if let Some(prev) = node.prev {
            self.nodes[usize::from(prev)].next = node.next;
        }
        if let Some(next) = node.next {
            self.nodes[usize::from(next)].prev = node.prev;
        }
        self.nodes[task] = Node::UNLINKED;

        if let Some(head) = self.head_mut(owner) {
            if node.prev.is_none() {
                head.first = node.next;
            }
            if node.next.is_none() {
                head.last = node.prev;
            }
            head.len -= 1;

            if head.len == 0 {
                if let ListId::Wait(_) = owner {
                    // return the head to the pool; outstanding keys go stale
                    head.in_use = false;
                }
            }
        }

        Some(owner)
    }

    /// Detaches the task at the near end of `list`
    pub(crate) fn pop_front(&mut self, list: ListId) -> Option<usize> {
        let first = self.front(list)?;
        self.detach(first);
        Some(first)
    }

    pub(crate) fn front(&self, list: ListId) -> Option<usize> {
        self.head(list)?.first.map(usize::from)
    }

    pub(crate) fn len(&self, list: ListId) -> usize {
        self.head(list).map_or(0, |head| usize::from(head.len))
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self, list: ListId) -> bool {
        self.len(list) == 0
    }

    /// The list `task` is linked into, if any
    pub(crate) fn owner(&self, task: usize) -> Option<ListId> {
        self.nodes.get(task)?.owner
    }

    /// Keys of every wait list that currently has members
    pub(crate) fn live_waits(&self) -> impl Iterator<Item = WaitKey> + '_ {
        self.waits
            .iter()
            .enumerate()
            .filter(|(_, head)| head.in_use)
            .map(|(slot, head)| WaitKey {
                slot: slot as u16,
                stamp: head.stamp,
            })
    }

    /// Members of `list` from the near to the far end
    #[cfg(test)]
    pub(crate) fn iter(&self, list: ListId) -> Iter<'_, N> {
        Iter {
            lists: self,
            next: self.front(list),
        }
    }
}

#[cfg(test)]
pub(crate) struct Iter<'a, const N: usize> {
    lists: &'a Lists<N>,
    next: Option<usize>,
}

#[cfg(test)]
impl<const N: usize> Iterator for Iter<'_, N> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.next?;
        self.next = self.lists.nodes[current].next.map(usize::from);
        Some(current)
    }
}

/// The list of tasks blocked on one synchronization object
///
/// The handle is cheap (a single `Cell`) and `const`-constructible. It only names a list head
/// stored in the scheduler; the head exists while at least one task is waiting.
pub struct WaitList {
    key: Cell<Option<WaitKey>>,
}

impl WaitList {
    /// Creates a handle for an empty wait list
    pub const fn new() -> Self {
        Self {
            key: Cell::new(None),
        }
    }

    pub(crate) fn key(&self) -> Option<WaitKey> {
        self.key.get()
    }

    pub(crate) fn set_key(&self, key: WaitKey) {
        self.key.set(Some(key))
    }
}

impl Default for WaitList {
    fn default() -> Self {
        Self::new()
    }
}
