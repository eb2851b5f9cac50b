use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-order lock registry. All mutations to a single order (status, stock
/// side-effects, invoice attachment, affiliate credit) are serialised under
/// the order's lock, so concurrent confirmation attempts collapse into one
/// effective transition.
#[derive(Default)]
pub struct OrderLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, order_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(order_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn same_order_serialises_concurrent_holders() {
        let locks = Arc::new(OrderLocks::new());
        let in_section = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_section = in_section.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("a1b2c3d4e5f6").await;
                let concurrent = in_section.fetch_add(1, Ordering::SeqCst);
                assert_eq!(concurrent, 0, "lock admitted two holders");
                tokio::task::yield_now().await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn different_orders_do_not_contend() {
        let locks = OrderLocks::new();
        let _a = locks.acquire("aaaaaaaaaaaa").await;
        // Must not deadlock
        let _b = locks.acquire("bbbbbbbbbbbb").await;
    }
}
