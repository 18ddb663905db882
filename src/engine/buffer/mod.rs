use std::sync::Arc;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    CachingCons, CachingProd, HeapRb,
};

/// Lock-free single-producer single-consumer transport between the render
/// context and the control context.
///
/// The storage is allocated once up front, so pushing from the real-time
/// callback never allocates or blocks.
pub struct RingProducer<T> {
    inner: CachingProd<Arc<HeapRb<T>>>,
}

/// Consumer half of [`create_ring`].
pub struct RingConsumer<T> {
    inner: CachingCons<Arc<HeapRb<T>>>,
}

impl<T> RingProducer<T> {
    /// Pushes a single item into the ring.
    /// Hands the item back if the ring is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        self.inner.try_push(item)
    }

    /// Returns the number of free slots.
    pub fn vacant_len(&self) -> usize {
        self.inner.vacant_len()
    }
}

impl<T> RingConsumer<T> {
    /// Pops a single item, or `None` if the ring is empty.
    pub fn pop(&mut self) -> Option<T> {
        self.inner.try_pop()
    }

    pub fn occupied_len(&self) -> usize {
        self.inner.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Creates a new ring with the specified capacity.
/// Returns a (Producer, Consumer) pair.
pub fn create_ring<T>(capacity: usize) -> (RingProducer<T>, RingConsumer<T>) {
    let rb = HeapRb::<T>::new(capacity.max(1));
    let (prod, cons) = rb.split();
    (RingProducer { inner: prod }, RingConsumer { inner: cons })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_ring_hands_item_back() {
        let (mut tx, mut rx) = create_ring::<u32>(2);
        assert!(tx.push(1).is_ok());
        assert!(tx.push(2).is_ok());
        assert_eq!(tx.push(3), Err(3));
        assert_eq!(rx.occupied_len(), 2);
        assert_eq!(rx.pop(), Some(1));
        assert_eq!(tx.vacant_len(), 1);
        assert_eq!(rx.pop(), Some(2));
        assert!(rx.is_empty());
    }
}
