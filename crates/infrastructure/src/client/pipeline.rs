//! Bounded pool of pipelined connections (RFC 7766).
//!
//! The pool is a fixed-capacity mailbox of `Option<C>` slots seeded with
//! `None`s: checkout is a receive, return is an unconditional send. `None`
//! means "slot empty, dial on demand", so there is no free-list and no
//! reference counting. One slot carries at most one in-flight query.

use janus_dns_domain::ForwardError;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

pub const PIPELINE_POOL_CAPACITY: usize = 10;

pub struct ConnectionPool<C> {
    tx: mpsc::Sender<Option<C>>,
    rx: Mutex<mpsc::Receiver<Option<C>>>,
}

impl<C: Send + 'static> ConnectionPool<C> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        for _ in 0..capacity {
            // Seeding an empty channel cannot fail.
            let _ = tx.try_send(None);
        }
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Blocks until a slot is free or `deadline` passes. The returned guard
    /// owns the slot; dropping it without an explicit return re-nulls the
    /// slot so a cancelled holder never shrinks the pool.
    pub async fn checkout(&self, deadline: Instant) -> Result<PoolSlot<C>, ForwardError> {
        let slot = tokio::time::timeout_at(deadline, async {
            self.rx.lock().await.recv().await
        })
        .await
        .map_err(|_| ForwardError::DeadlineExceeded)?
        .ok_or_else(|| ForwardError::Network("connection pool closed".into()))?;

        Ok(PoolSlot {
            tx: self.tx.clone(),
            conn: slot,
            returned: false,
        })
    }
}

pub struct PoolSlot<C> {
    tx: mpsc::Sender<Option<C>>,
    conn: Option<C>,
    returned: bool,
}

impl<C> PoolSlot<C> {
    /// Takes the live connection out of the slot, if any.
    pub fn take(&mut self) -> Option<C> {
        self.conn.take()
    }

    /// Returns the slot with a healthy connection.
    pub fn put_back(mut self, conn: C) {
        self.returned = true;
        let _ = self.tx.try_send(Some(conn));
    }

    /// Returns the slot empty; the connection (if still held) is dropped
    /// and the next user dials fresh.
    pub fn discard(mut self) {
        self.returned = true;
        let _ = self.tx.try_send(None);
    }
}

impl<C> Drop for PoolSlot<C> {
    fn drop(&mut self) {
        if !self.returned {
            // Slot count is conserved, so the send always finds capacity.
            let _ = self.tx.try_send(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_millis(100)
    }

    #[tokio::test]
    async fn seeded_with_empty_slots() {
        let pool: ConnectionPool<u32> = ConnectionPool::new(3);
        for _ in 0..3 {
            let mut slot = pool.checkout(deadline()).await.unwrap();
            assert!(slot.take().is_none());
            slot.discard();
        }
    }

    #[tokio::test]
    async fn put_back_preserves_connection() {
        let pool: ConnectionPool<u32> = ConnectionPool::new(1);
        let mut slot = pool.checkout(deadline()).await.unwrap();
        assert!(slot.take().is_none());
        slot.put_back(42);

        let mut slot = pool.checkout(deadline()).await.unwrap();
        assert_eq!(slot.take(), Some(42));
        slot.discard();

        let mut slot = pool.checkout(deadline()).await.unwrap();
        assert!(slot.take().is_none());
        slot.discard();
    }

    #[tokio::test]
    async fn checkout_blocks_until_return() {
        let pool: ConnectionPool<u32> = ConnectionPool::new(1);
        let slot = pool.checkout(deadline()).await.unwrap();

        let err = pool
            .checkout(Instant::now() + Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::DeadlineExceeded));

        slot.put_back(7);
        let mut slot = pool.checkout(deadline()).await.unwrap();
        assert_eq!(slot.take(), Some(7));
        slot.discard();
    }

    #[tokio::test]
    async fn dropped_slot_is_renulled() {
        let pool: ConnectionPool<u32> = ConnectionPool::new(1);
        {
            let mut slot = pool.checkout(deadline()).await.unwrap();
            slot.put_back(9);
        }
        {
            // Simulates a cancelled holder: slot dropped mid-flight.
            let mut slot = pool.checkout(deadline()).await.unwrap();
            assert_eq!(slot.take(), Some(9));
            drop(slot);
        }
        let mut slot = pool.checkout(deadline()).await.unwrap();
        assert!(slot.take().is_none(), "dropped slot must come back empty");
        slot.discard();
    }
}
