//! Bounded FIFO of pages with head reclamation.
//!
//! Grounded on `segmented_stream.rs`'s page/cursor shape (pages linked in append order, each
//! carrying a pin count) and the original Go server's `BufferQueue` (`buffer.go`), which this
//! queue's `start_cursor` and `truncate_head_if_oversize` methods mirror step for step. Unlike
//! `segmented_stream.rs`, this queue holds its pages in a `Mutex`-guarded `VecDeque` rather
//! than an unsafe raw-pointer linked list: a mount's queue is bounded to a few dozen pages, so
//! the O(n) scans this costs in `next`/`start_cursor` are negligible, and the simplification
//! removes an entire class of unsafe aliasing bugs that the multi-writer, crossbeam-epoch
//! version of this structure exists to manage. One writer appends; reclamation only ever
//! touches the head; nothing here needs to be lock-free to keep up.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::page::Page;
use super::pool::PagePool;

/// Snapshot of a queue's current shape, used for mount status reporting.
#[derive(Debug, Clone)]
pub struct QueueInfo {
    /// Number of pages currently queued.
    pub size: usize,
    /// Total bytes represented by all queued pages.
    pub size_bytes: usize,
    /// One character per page, head to tail: `'1'` if pinned, `'0'` otherwise.
    pub graph: String,
    /// Count of currently pinned pages.
    pub in_use: usize,
}

struct QueueInner {
    pages: VecDeque<Page>,
}

/// A mount's live audio history: a bounded, append-at-tail, reclaim-at-head page queue.
pub struct PageQueue {
    pool: Arc<PagePool>,
    inner: Mutex<QueueInner>,
    page_size: usize,
    min_size: usize,
    max_size: usize,
}

impl PageQueue {
    /// Creates an empty queue backed by `pool`.
    ///
    /// `page_size` is the nominal allocation size requested from the pool on each append
    /// (actual pages may be smaller or larger, per the bytes actually appended). `min_size`
    /// and `max_size` bound how many pages are kept: truncation never drops the queue below
    /// `min_size` pages, and only begins once the queue reaches `max_size`.
    pub fn new(pool: Arc<PagePool>, page_size: usize, min_size: usize, max_size: usize) -> Self {
        Self {
            pool,
            inner: Mutex::new(QueueInner {
                pages: VecDeque::new(),
            }),
            page_size,
            min_size: min_size.max(1),
            max_size: max_size.max(min_size.max(1)),
        }
    }

    /// Appends `data` as a new page at the tail, then truncates the head if the queue has
    /// grown past its configured maximum.
    pub fn append(&self, data: &[u8]) -> Page {
        let mut buf = self.pool.acquire(self.page_size.max(data.len()));
        buf.clear();
        buf.extend_from_slice(data);
        let page = Page::new(buf, self.pool.clone());
        {
            let mut inner = self.inner.lock();
            inner.pages.push_back(page.clone());
        }
        self.truncate_head_if_oversize();
        page
    }

    /// The oldest queued page, if any.
    pub fn first(&self) -> Option<Page> {
        self.inner.lock().pages.front().cloned()
    }

    /// The newest queued page, if any.
    pub fn last(&self) -> Option<Page> {
        self.inner.lock().pages.back().cloned()
    }

    /// Number of pages currently queued.
    pub fn size(&self) -> usize {
        self.inner.lock().pages.len()
    }

    /// Finds the page immediately after `page` in append order, if `page` is still queued
    /// and is not the tail.
    pub fn next(&self, page: &Page) -> Option<Page> {
        let inner = self.inner.lock();
        let pos = inner.pages.iter().position(|p| p.ptr_eq(page))?;
        inner.pages.get(pos + 1).cloned()
    }

    /// Pins `page` against reclamation. Equivalent to calling [`Page::pin`] directly; kept as
    /// a queue method so callers can reason about pinning purely in terms of the queue's API.
    pub fn pin(&self, page: &Page) {
        page.pin();
    }

    /// Unpins `page`, allowing it to be reclaimed once it reaches the head.
    pub fn unpin(&self, page: &Page) {
        page.unpin();
    }

    /// Walks backward from the tail, accumulating page lengths, and returns the earliest page
    /// a newly attached listener should start delivery from so that at most `burst_bytes` of
    /// backlog is sent before catching up to live.
    ///
    /// Mirrors `BufferQueue.Start` in the original server: starting at the tail, keep
    /// stepping toward the head while there is a previous page and the accumulated burst is
    /// still under budget; stop (without ever mixing the returned page's own length into the
    /// budget check) the moment either bound is hit.
    pub fn start_cursor(&self, burst_bytes: usize) -> Option<Page> {
        let inner = self.inner.lock();
        if inner.pages.is_empty() {
            return None;
        }
        let mut idx = inner.pages.len() - 1;
        let mut burst = 0usize;
        loop {
            if idx == 0 || burst >= burst_bytes {
                break;
            }
            burst += inner.pages[idx].len();
            idx -= 1;
        }
        inner.pages.get(idx).cloned()
    }

    /// Drops unpinned pages from the head while the queue is at or above `max_size`, stopping
    /// at the first pinned page, or once only `min_size` pages remain.
    pub fn truncate_head_if_oversize(&self) {
        let mut inner = self.inner.lock();
        if inner.pages.len() < self.max_size {
            return;
        }
        loop {
            if inner.pages.len() <= 1 {
                break;
            }
            match inner.pages.front() {
                Some(front) if front.is_pinned() => break,
                Some(_) => {}
                None => break,
            }
            if inner.pages.len() <= self.min_size {
                break;
            }
            inner.pages.pop_front();
        }
    }

    /// A point-in-time snapshot of this queue's shape.
    pub fn info(&self) -> QueueInfo {
        let inner = self.inner.lock();
        let mut size_bytes = 0usize;
        let mut in_use = 0usize;
        let mut graph = String::with_capacity(inner.pages.len());
        for page in inner.pages.iter() {
            size_bytes += page.len();
            if page.is_pinned() {
                graph.push('1');
                in_use += 1;
            } else {
                graph.push('0');
            }
        }
        QueueInfo {
            size: inner.pages.len(),
            size_bytes,
            graph,
            in_use,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(min_size: usize, max_size: usize) -> PageQueue {
        PageQueue::new(Arc::new(PagePool::new()), 8, min_size, max_size)
    }

    #[test]
    fn append_grows_queue_and_links_in_order() {
        let q = queue(2, 8);
        q.append(b"one");
        q.append(b"two");
        q.append(b"three");
        assert_eq!(q.size(), 3);
        assert_eq!(q.first().unwrap().bytes(), b"one");
        assert_eq!(q.last().unwrap().bytes(), b"three");
    }

    #[test]
    fn next_walks_append_order() {
        let q = queue(2, 8);
        let a = q.append(b"a");
        let b = q.append(b"b");
        let c = q.append(b"c");
        assert!(q.next(&a).unwrap().ptr_eq(&b));
        assert!(q.next(&b).unwrap().ptr_eq(&c));
        assert!(q.next(&c).is_none());
    }

    #[test]
    fn start_cursor_single_page_returns_it_regardless_of_burst() {
        let q = queue(1, 8);
        let a = q.append(b"only");
        assert!(q.start_cursor(0).unwrap().ptr_eq(&a));
    }

    #[test]
    fn start_cursor_stops_once_burst_budget_is_spent() {
        let q = queue(1, 100);
        q.append(&[0u8; 10]); // oldest
        let b = q.append(&[0u8; 10]);
        let c = q.append(&[0u8; 10]); // tail
        // burst budget of 10: first step adds c's length (10) >= 10, stop at b.
        let cursor = q.start_cursor(10).unwrap();
        assert!(cursor.ptr_eq(&b));
        let _ = c;
    }

    #[test]
    fn start_cursor_large_budget_walks_to_head() {
        let q = queue(1, 100);
        let a = q.append(&[0u8; 10]);
        q.append(&[0u8; 10]);
        q.append(&[0u8; 10]);
        let cursor = q.start_cursor(10_000).unwrap();
        assert!(cursor.ptr_eq(&a));
    }

    #[test]
    fn truncate_stops_at_pinned_page() {
        let q = queue(1, 3);
        let a = q.append(b"a");
        a.pin();
        q.append(b"b");
        q.append(b"c"); // triggers truncate at max_size=3, but head is pinned
        assert_eq!(q.size(), 3);
        assert!(q.first().unwrap().ptr_eq(&a));
        a.unpin();
    }

    #[test]
    fn truncate_never_drops_below_min_size() {
        let q = queue(2, 3);
        q.append(b"a");
        q.append(b"b");
        q.append(b"c");
        q.append(b"d");
        assert_eq!(q.size(), 2);
        assert_eq!(q.first().unwrap().bytes(), b"c");
    }

    #[test]
    fn info_reports_pin_graph() {
        let q = queue(1, 8);
        let a = q.append(b"a");
        q.append(b"b");
        a.pin();
        let info = q.info();
        assert_eq!(info.size, 2);
        assert_eq!(info.in_use, 1);
        assert_eq!(info.graph, "10");
        a.unpin();
    }
}
