//! Free lists for objects that are expensive to create and get created and dropped
//! at a high rate, such as contact constraints.

use parking_lot::Mutex;

/// Objects that can be put back into a pool and come out again as if newly created.
pub trait Recycle {
    /// Restore the freshly constructed state, dropping everything left over from previous use.
    /// Allocated capacity may be kept.
    fn reset(&mut self);
}

/// A pool of reusable objects, assuming exclusive access.
#[derive(Debug)]
pub struct Pool<T> {
    free: Vec<T>,
    create: fn() -> T,
}

impl<T: Recycle> Pool<T> {
    /// Create a pool that calls `create` when it runs out of recycled objects.
    pub fn new(create: fn() -> T) -> Self {
        Self {
            free: Vec::new(),
            create,
        }
    }

    /// Create a pool with `count` objects already constructed.
    pub fn with_preallocated(create: fn() -> T, count: usize) -> Self {
        Self {
            free: (0..count).map(|_| create()).collect(),
            create,
        }
    }

    /// Take an object out of the pool, creating a new one if none are free.
    #[inline]
    pub fn acquire(&mut self) -> T {
        self.free.pop().unwrap_or_else(self.create)
    }

    /// Return an object to the pool. It's reset immediately.
    #[inline]
    pub fn release(&mut self, mut item: T) {
        item.reset();
        self.free.push(item);
    }

    /// Number of objects waiting to be reused.
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Drop all pooled objects.
    pub fn clear(&mut self) {
        self.free.clear();
    }
}

/// A pool of reusable objects that can be shared between threads.
#[derive(Debug)]
pub struct LockingPool<T> {
    inner: Mutex<Pool<T>>,
}

impl<T: Recycle> LockingPool<T> {
    pub fn new(create: fn() -> T) -> Self {
        Self {
            inner: Mutex::new(Pool::new(create)),
        }
    }

    #[inline]
    pub fn acquire(&self) -> T {
        self.inner.lock().acquire()
    }

    /// Return an object to the pool. The reset happens outside the lock.
    pub fn release(&self, mut item: T) {
        item.reset();
        self.inner.lock().free.push(item);
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.inner.lock().free_count()
    }

    /// Unwrap the inner pool, for when exclusive access is available again.
    pub fn into_inner(self) -> Pool<T> {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Scratch {
        values: Vec<u32>,
        uses: u32,
    }

    impl Recycle for Scratch {
        fn reset(&mut self) {
            self.values.clear();
            self.uses = 0;
        }
    }

    #[test]
    fn released_items_come_back_fresh() {
        let mut pool = Pool::new(Scratch::default);
        let mut item = pool.acquire();
        item.values.extend([1, 2, 3]);
        item.uses = 5;
        pool.release(item);
        assert_eq!(pool.free_count(), 1);

        let item = pool.acquire();
        assert!(item.values.is_empty());
        // capacity survives the reset
        assert!(item.values.capacity() >= 3);
        assert_eq!(item.uses, 0);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn locking_pool_from_many_threads() {
        let pool = LockingPool::new(Scratch::default);
        std::thread::scope(|s| {
            for t in 0..4 {
                let pool = &pool;
                s.spawn(move || {
                    for i in 0..100 {
                        let mut item = pool.acquire();
                        assert!(item.values.is_empty());
                        item.values.push(t * 1000 + i);
                        pool.release(item);
                    }
                });
            }
        });
        let pool = pool.into_inner();
        assert!(pool.free_count() >= 1 && pool.free_count() <= 4);
    }
}
