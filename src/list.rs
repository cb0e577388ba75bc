//! A singly-linked, concurrent FIFO/LIFO list.
//!
//! Mutations take an exclusive lock; reads take a shared lock. `len` is O(1)
//! from a maintained counter; `push_left`/`push_right` are amortized O(1).

use std::ptr::NonNull;
use std::sync::RwLock;

use bytes::Bytes;

struct Node {
    value: Bytes,
    next: Option<Box<Node>>,
}

/// The list's internal state. A raw pointer to the tail node gives O(1)
/// `push_right` without fighting the borrow checker over a doubly-owned
/// tail; all accesses to it happen under the outer `RwLock`, so it never
/// aliases a live `&mut` reference.
struct Inner {
    head: Option<Box<Node>>,
    tail: Option<NonNull<Node>>,
    size: usize,
}

// SAFETY: `tail` only ever points at a node owned by `head`'s ownership
// chain, and every access to `Inner` happens while holding `ConcurrentList`'s
// `RwLock`, so `Inner` can be safely shared/sent across threads.
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

impl Inner {
    fn new() -> Self {
        Inner {
            head: None,
            tail: None,
            size: 0,
        }
    }

    fn push_left(&mut self, value: Bytes) {
        let mut new_node = Box::new(Node {
            value,
            next: self.head.take(),
        });
        if self.tail.is_none() {
            self.tail = NonNull::new(new_node.as_mut() as *mut Node);
        }
        self.head = Some(new_node);
        self.size += 1;
    }

    fn push_right(&mut self, value: Bytes) {
        let mut new_node = Box::new(Node { value, next: None });
        let raw: *mut Node = new_node.as_mut();
        match self.tail {
            Some(tail) => {
                // SAFETY: `tail` points at the last node in `head`'s chain,
                // which is still alive because nothing removes nodes.
                unsafe { (*tail.as_ptr()).next = Some(new_node) };
            }
            None => self.head = Some(new_node),
        }
        self.tail = NonNull::new(raw);
        self.size += 1;
    }

    fn snapshot(&self) -> Vec<Bytes> {
        let mut out = Vec::with_capacity(self.size);
        let mut cur = self.head.as_deref();
        while let Some(node) = cur {
            out.push(node.value.clone());
            cur = node.next.as_deref();
        }
        out
    }
}

pub struct ConcurrentList {
    inner: RwLock<Inner>,
}

impl ConcurrentList {
    pub fn new() -> Self {
        ConcurrentList {
            inner: RwLock::new(Inner::new()),
        }
    }

    pub fn from_values(values: impl IntoIterator<Item = Bytes>) -> Self {
        let list = ConcurrentList::new();
        for value in values {
            list.push_right(value);
        }
        list
    }

    pub fn push_left(&self, value: Bytes) -> usize {
        let mut inner = self.inner.write().expect("list lock poisoned");
        inner.push_left(value);
        inner.size
    }

    pub fn push_right(&self, value: Bytes) -> usize {
        let mut inner = self.inner.write().expect("list lock poisoned");
        inner.push_right(value);
        inner.size
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("list lock poisoned").size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A consistent copy of every element, in head-to-tail order, taken
    /// under a single shared lock acquisition.
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.inner.read().expect("list lock poisoned").snapshot()
    }
}

impl Default for ConcurrentList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn push_left_reverses_order() {
        let list = ConcurrentList::new();
        for v in ["1", "2", "3", "4", "5"] {
            list.push_left(b(v));
        }
        assert_eq!(
            list.snapshot(),
            vec![b("5"), b("4"), b("3"), b("2"), b("1")]
        );
    }

    #[test]
    fn push_right_preserves_order() {
        let list = ConcurrentList::new();
        for v in ["1", "2", "3", "4", "5"] {
            list.push_right(b(v));
        }
        assert_eq!(
            list.snapshot(),
            vec![b("1"), b("2"), b("3"), b("4"), b("5")]
        );
    }

    #[test]
    fn empty_list_has_zero_length() {
        let list = ConcurrentList::new();
        assert_eq!(list.len(), 0);
        assert!(list.snapshot().is_empty());
    }

    #[test]
    fn concurrent_push_right_length_matches_total_pushes() {
        let list = Arc::new(ConcurrentList::new());
        const WORKERS: usize = 50;
        const PER_WORKER: usize = 100;

        let handles: Vec<_> = (0..WORKERS)
            .map(|i| {
                let list = Arc::clone(&list);
                thread::spawn(move || {
                    for j in 0..PER_WORKER {
                        list.push_right(Bytes::from(format!("{i}-{j}")));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(list.len(), WORKERS * PER_WORKER);
        assert_eq!(list.snapshot().len(), WORKERS * PER_WORKER);
    }

    #[test]
    fn concurrent_push_left_length_matches_total_pushes() {
        let list = Arc::new(ConcurrentList::new());
        const WORKERS: usize = 50;
        const PER_WORKER: usize = 100;

        let handles: Vec<_> = (0..WORKERS)
            .map(|i| {
                let list = Arc::clone(&list);
                thread::spawn(move || {
                    for j in 0..PER_WORKER {
                        list.push_left(Bytes::from(format!("{i}-{j}")));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(list.len(), WORKERS * PER_WORKER);
    }

    #[test]
    fn tail_stays_correct_after_interleaved_pushes() {
        let list = ConcurrentList::new();
        list.push_right(b("a"));
        list.push_left(b("z"));
        list.push_right(b("b"));
        assert_eq!(list.snapshot(), vec![b("z"), b("a"), b("b")]);
    }
}
