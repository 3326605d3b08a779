//! # Topic: a single named, bounded, async FIFO queue.
//!
//! A [`Topic`] owns a bounded buffer and two fair waiter queues, one for
//! suspended producers and one for suspended consumers (tokio semaphores grant
//! permits in FIFO order, which gives the fairness guarantee).
//!
//! ## Contract
//! - `put` suspends while the buffer is full; `get` suspends while it is empty.
//! - Suspended callers of the same operation resume in FIFO order.
//! - `try_put` / `try_get` fail fast with [`TopicError::Full`] /
//!   [`TopicError::Empty`] instead of suspending.
//! - `len() <= capacity()` always holds.
//! - No ordering guarantee exists *between* different topics, only within one
//!   topic's own sequence of puts and gets.
//!
//! ## Backpressure
//! ```text
//! put ──► [slot free?] ──no──► suspend until a get frees capacity
//!              │yes
//!              ▼
//!        buffer.push_back ──► wake one suspended get
//! ```
//!
//! Closing the topic fails every pending and future wait with
//! [`TopicError::Closed`]; items still buffered at close are dropped.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Semaphore;

use crate::error::TopicError;

/// A single named FIFO queue with bounded capacity.
pub struct Topic {
    name: String,
    capacity: usize,
    buffer: Mutex<VecDeque<Vec<u8>>>,
    /// Free capacity; producers acquire one permit per put.
    space: Semaphore,
    /// Buffered items; consumers acquire one permit per get.
    items: Semaphore,
}

impl Topic {
    /// Creates a topic with the given capacity (clamped to a minimum of 1).
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            space: Semaphore::new(capacity),
            items: Semaphore::new(0),
        }
    }

    /// The queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of buffered items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of buffered items.
    pub fn len(&self) -> usize {
        self.buffer.lock().expect("topic buffer poisoned").len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once [`Topic::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.items.is_closed()
    }

    /// Appends an item, suspending while the buffer is full.
    pub async fn put(&self, item: Vec<u8>) -> Result<(), TopicError> {
        let permit = self.space.acquire().await.map_err(|_| TopicError::Closed)?;
        permit.forget();
        self.push(item, false);
        Ok(())
    }

    /// Re-inserts an item at the head, suspending while the buffer is full.
    ///
    /// Used by rollback redelivery so the returned item is the next delivery.
    pub async fn put_front(&self, item: Vec<u8>) -> Result<(), TopicError> {
        let permit = self.space.acquire().await.map_err(|_| TopicError::Closed)?;
        permit.forget();
        self.push(item, true);
        Ok(())
    }

    /// Non-suspending put; fails fast when the buffer is full.
    pub fn try_put(&self, item: Vec<u8>) -> Result<(), TopicError> {
        let permit = self.space.try_acquire().map_err(|e| match e {
            tokio::sync::TryAcquireError::Closed => TopicError::Closed,
            tokio::sync::TryAcquireError::NoPermits => TopicError::Full,
        })?;
        permit.forget();
        self.push(item, false);
        Ok(())
    }

    /// Removes and returns the oldest item, suspending while the buffer is empty.
    pub async fn get(&self) -> Result<Vec<u8>, TopicError> {
        let permit = self.items.acquire().await.map_err(|_| TopicError::Closed)?;
        permit.forget();
        Ok(self.pop())
    }

    /// Non-suspending get; fails fast when the buffer is empty.
    pub fn try_get(&self) -> Result<Vec<u8>, TopicError> {
        let permit = self.items.try_acquire().map_err(|e| match e {
            tokio::sync::TryAcquireError::Closed => TopicError::Closed,
            tokio::sync::TryAcquireError::NoPermits => TopicError::Empty,
        })?;
        permit.forget();
        Ok(self.pop())
    }

    /// Closes the topic: every pending and future put/get fails with
    /// [`TopicError::Closed`]. Items still buffered are dropped.
    pub fn close(&self) {
        self.space.close();
        self.items.close();
        self.buffer.lock().expect("topic buffer poisoned").clear();
    }

    fn push(&self, item: Vec<u8>, front: bool) {
        {
            let mut buf = self.buffer.lock().expect("topic buffer poisoned");
            if front {
                buf.push_front(item);
            } else {
                buf.push_back(item);
            }
        }
        self.items.add_permits(1);
    }

    fn pop(&self) -> Vec<u8> {
        let item = self
            .buffer
            .lock()
            .expect("topic buffer poisoned")
            .pop_front()
            .expect("item permit without buffered item");
        self.space.add_permits(1);
        item
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn get_returns_items_in_put_order() {
        let topic = Topic::new("t", 16);
        for i in 0..5u8 {
            topic.put(vec![i]).await.unwrap();
        }
        for i in 0..5u8 {
            assert_eq!(topic.get().await.unwrap(), vec![i]);
        }
    }

    #[tokio::test]
    async fn put_front_is_delivered_next() {
        let topic = Topic::new("t", 16);
        topic.put(vec![1]).await.unwrap();
        topic.put(vec![2]).await.unwrap();
        topic.put_front(vec![0]).await.unwrap();

        assert_eq!(topic.get().await.unwrap(), vec![0]);
        assert_eq!(topic.get().await.unwrap(), vec![1]);
        assert_eq!(topic.get().await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn put_beyond_capacity_suspends_until_a_get() {
        let topic = Arc::new(Topic::new("t", 2));
        topic.put(vec![1]).await.unwrap();
        topic.put(vec![2]).await.unwrap();
        assert_eq!(topic.try_put(vec![3]).unwrap_err(), TopicError::Full);

        let t = topic.clone();
        let blocked = tokio::spawn(async move { t.put(vec![3]).await });

        // the put must not resolve while the buffer is full
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        assert_eq!(topic.get().await.unwrap(), vec![1]);
        blocked.await.unwrap().unwrap();
        assert_eq!(topic.len(), 2);
        assert_eq!(topic.get().await.unwrap(), vec![2]);
        assert_eq!(topic.get().await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn get_on_empty_suspends_until_a_put() {
        let topic = Arc::new(Topic::new("t", 2));
        let t = topic.clone();
        let waiter = tokio::spawn(async move { t.get().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        topic.put(b"x".to_vec()).await.unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), b"x");
    }

    #[tokio::test]
    async fn try_get_on_empty_fails_fast() {
        let topic = Topic::new("t", 2);
        assert_eq!(topic.try_get().unwrap_err(), TopicError::Empty);
    }

    #[tokio::test]
    async fn close_fails_pending_waits() {
        let topic = Arc::new(Topic::new("t", 1));
        let t = topic.clone();
        let waiter = tokio::spawn(async move { t.get().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        topic.close();
        assert_eq!(waiter.await.unwrap().unwrap_err(), TopicError::Closed);
        assert_eq!(topic.try_put(vec![1]).unwrap_err(), TopicError::Closed);
    }

    #[tokio::test]
    async fn capacity_is_clamped_to_one() {
        let topic = Topic::new("t", 0);
        assert_eq!(topic.capacity(), 1);
        topic.put(vec![1]).await.unwrap();
        assert_eq!(topic.try_put(vec![2]).unwrap_err(), TopicError::Full);
    }
}
