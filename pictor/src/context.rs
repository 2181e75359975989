use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

type Deferred = Box<dyn FnOnce() + Send>;

/// Per-request scope: a cancellable deadline, an append-only deferred-cleanup
/// list, and a keyed scratch cache.
///
/// Deferred thunks run exactly once, in registration order, when the scope
/// completes: explicitly via [`RequestContext::complete`] after the response
/// is written, or by the deadline watcher on timeout.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

struct Inner {
    token: CancellationToken,
    deadline: Option<Instant>,
    deferred: Mutex<Vec<Deferred>>,
    cache: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    fired: AtomicBool,
}

impl Inner {
    fn run_deferred(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let thunks = std::mem::take(&mut *self.deferred.lock().unwrap());
        for thunk in thunks {
            thunk();
        }
    }
}

impl RequestContext {
    pub fn new(timeout: Option<Duration>) -> Self {
        let token = CancellationToken::new();
        let inner = Arc::new(Inner {
            token: token.clone(),
            deadline: timeout.map(|t| Instant::now() + t),
            deferred: Mutex::new(Vec::new()),
            cache: Mutex::new(HashMap::new()),
            fired: AtomicBool::new(false),
        });

        let watcher = inner.clone();
        tokio::spawn(async move {
            match timeout {
                Some(t) => {
                    tokio::select! {
                        _ = watcher.token.cancelled() => {},
                        _ = tokio::time::sleep(t) => watcher.token.cancel(),
                    }
                },
                None => watcher.token.cancelled().await,
            }
            watcher.run_deferred();
        });

        Self { inner }
    }

    /// Register a thunk to run at scope end. A thunk registered after the
    /// scope already completed runs immediately.
    pub fn defer(&self, f: impl FnOnce() + Send + 'static) {
        if self.inner.fired.load(Ordering::SeqCst) {
            f();
            return;
        }
        self.inner.deferred.lock().unwrap().push(Box::new(f));
    }

    /// Complete the scope: cancels the token and runs every deferred thunk.
    pub fn complete(&self) {
        self.inner.token.cancel();
        self.inner.run_deferred();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Remaining request budget, if a deadline was set.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Store an opaque value for the rest of the request.
    pub fn cache_put<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.inner
            .cache
            .lock()
            .unwrap()
            .insert(key.to_string(), Arc::new(value));
    }

    pub fn cache_get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let cache = self.inner.cache.lock().unwrap();
        cache.get(key).cloned()?.downcast::<T>().ok()
    }
}
