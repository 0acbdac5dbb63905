//! A single immutable chunk of queued audio, pinned by listeners mid-read.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::pool::PagePool;

struct PageInner {
    data: Vec<u8>,
    pins: AtomicUsize,
    pool: Option<Arc<PagePool>>,
}

impl Drop for PageInner {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            let data = std::mem::take(&mut self.data);
            pool.release(data);
        }
    }
}

/// A handle to one page of queued audio.
///
/// Cloning a `Page` is cheap (an `Arc` bump) and is how a listener task holds a reference to
/// the page it is currently delivering. The page's bytes never change after construction; the
/// only mutable state is the pin counter, which gates reclamation in [`super::PageQueue`].
#[derive(Clone)]
pub struct Page(Arc<PageInner>);

impl Page {
    pub(crate) fn new(data: Vec<u8>, pool: Arc<PagePool>) -> Self {
        Self(Arc::new(PageInner {
            data,
            pins: AtomicUsize::new(0),
            pool: Some(pool),
        }))
    }

    /// The page's audio bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.0.data
    }

    /// Number of bytes in this page.
    pub fn len(&self) -> usize {
        self.0.data.len()
    }

    /// Whether this page carries any bytes.
    pub fn is_empty(&self) -> bool {
        self.0.data.is_empty()
    }

    /// Marks this page as in use by one more reader. Must be paired with [`Page::unpin`].
    pub fn pin(&self) {
        self.0.pins.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases one reader's hold on this page.
    pub fn unpin(&self) {
        self.0.pins.fetch_sub(1, Ordering::AcqRel);
    }

    /// Whether any reader currently holds this page pinned.
    pub fn is_pinned(&self) -> bool {
        self.0.pins.load(Ordering::Acquire) > 0
    }

    pub(crate) fn ptr_eq(&self, other: &Page) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// RAII guard that unpins a page when dropped, so every exit path out of a listener's
/// delivery loop (including early returns on write errors) releases the pin.
pub struct PinGuard(Page);

impl PinGuard {
    /// Pins `page` and returns a guard that will unpin it on drop.
    pub fn new(page: Page) -> Self {
        page.pin();
        Self(page)
    }

    /// The pinned page.
    pub fn page(&self) -> &Page {
        &self.0
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.0.unpin();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_unpin_tracks_depth() {
        let pool = Arc::new(PagePool::new());
        let page = Page::new(vec![1, 2, 3], pool);
        assert!(!page.is_pinned());
        page.pin();
        page.pin();
        assert!(page.is_pinned());
        page.unpin();
        assert!(page.is_pinned());
        page.unpin();
        assert!(!page.is_pinned());
    }

    #[test]
    fn pin_guard_unpins_on_drop() {
        let pool = Arc::new(PagePool::new());
        let page = Page::new(vec![1], pool);
        {
            let _guard = PinGuard::new(page.clone());
            assert!(page.is_pinned());
        }
        assert!(!page.is_pinned());
    }

    #[test]
    fn drop_returns_buffer_to_pool() {
        let pool = Arc::new(PagePool::new());
        let page = Page::new(vec![0u8; 16], pool.clone());
        let cap = page.bytes().len();
        drop(page);
        assert_eq!(pool.retired_count(cap), 1);
    }
}
