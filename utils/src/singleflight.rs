use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::watch;

/// Errors surfaced by [`Group::work`].
///
/// The caller that actually ran the inner future gets its error back as
/// `InternalError`. Waiters that joined an in-flight call receive a clone of
/// the owner's error when one is available, or `OwnerDropped` if the owning
/// future was cancelled before it could publish a result.
#[derive(Error, Debug)]
pub enum SingleflightError<E: Debug> {
    #[error("{0:?}")]
    InternalError(E),

    #[error("singleflight waiter error: {0}")]
    WaiterInternalError(String),

    #[error("singleflight owner dropped before publishing a result")]
    OwnerDropped,
}

type Outcome<T, E> = Option<Result<T, E>>;

/// A keyed single-flight group: concurrent calls to [`Group::work`] with the
/// same key run the supplied future exactly once; every other caller suspends
/// until the owner publishes its result and then receives a copy.
///
/// Entries are removed as soon as the owning call completes (successfully or
/// not), so a later call with the same key starts fresh work.
pub struct Group<T, E> {
    map: Mutex<HashMap<String, watch::Receiver<Outcome<T, E>>>>,
}

impl<T, E> Default for Group<T, E> {
    fn default() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }
}

impl<T, E> Group<T, E>
where
    T: Clone + Send + Sync,
    E: Clone + Debug + Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.map.lock().unwrap().len()
    }

    pub async fn work<Fut>(&self, key: &str, fut: Fut) -> Result<T, SingleflightError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        enum Slot<T, E> {
            Join(watch::Receiver<Outcome<T, E>>),
            Own(watch::Sender<Outcome<T, E>>),
        }

        let slot = {
            let mut map = self.map.lock().unwrap();
            match map.get(key) {
                Some(rx) => Slot::Join(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    map.insert(key.to_string(), rx);
                    Slot::Own(tx)
                },
            }
        };

        let sender = match slot {
            Slot::Join(rx) => return Self::wait(rx).await,
            Slot::Own(tx) => tx,
        };

        // This call owns the work. The guard removes the map entry when the
        // owner finishes or is cancelled mid-flight; dropping the sender wakes
        // any waiters, which then observe `OwnerDropped`.
        let _guard = EntryGuard { group: self, key };

        let result = fut.await;
        match result {
            Ok(v) => {
                let _ = sender.send(Some(Ok(v.clone())));
                Ok(v)
            },
            Err(e) => {
                let _ = sender.send(Some(Err(e.clone())));
                Err(SingleflightError::InternalError(e))
            },
        }
    }

    async fn wait(mut rx: watch::Receiver<Outcome<T, E>>) -> Result<T, SingleflightError<E>> {
        loop {
            {
                let value = rx.borrow();
                match &*value {
                    Some(Ok(v)) => return Ok(v.clone()),
                    Some(Err(e)) => return Err(SingleflightError::InternalError(e.clone())),
                    None => {},
                }
            }
            if rx.changed().await.is_err() {
                // The sender was dropped without publishing; check one last
                // time in case the send raced with the drop.
                let value = rx.borrow();
                return match &*value {
                    Some(Ok(v)) => Ok(v.clone()),
                    Some(Err(e)) => Err(SingleflightError::InternalError(e.clone())),
                    None => Err(SingleflightError::OwnerDropped),
                };
            }
        }
    }
}

struct EntryGuard<'a, T, E> {
    group: &'a Group<T, E>,
    key: &'a str,
}

impl<T, E> Drop for EntryGuard<'_, T, E> {
    fn drop(&mut self) {
        self.group.map.lock().unwrap().remove(self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_single_caller() {
        let group: Group<u32, String> = Group::new();
        let v = group.work("k", async { Ok::<_, String>(7) }).await.unwrap();
        assert_eq!(v, 7);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let group: Arc<Group<u32, String>> = Arc::new(Group::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let group = group.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                group
                    .work("shared", async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>(42)
                    })
                    .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_error_propagates_to_waiters() {
        let group: Arc<Group<u32, String>> = Arc::new(Group::new());

        let g1 = group.clone();
        let owner = tokio::spawn(async move {
            g1.work("fail", async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Err::<u32, _>("boom".to_string())
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let g2 = group.clone();
        let waiter = tokio::spawn(async move { g2.work("fail", async { Ok::<_, String>(1) }).await });

        assert!(matches!(owner.await.unwrap(), Err(SingleflightError::InternalError(e)) if e == "boom"));
        assert!(matches!(waiter.await.unwrap(), Err(SingleflightError::InternalError(e)) if e == "boom"));
    }

    #[tokio::test]
    async fn test_entry_removed_after_completion() {
        let group: Group<u32, String> = Group::new();
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let v = group
                .work("k", async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(1)
                })
                .await
                .unwrap();
            assert_eq!(v, 1);
        }
        // Sequential calls each run the work; dedup applies to overlap only.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
