//! Bounded worker pool
//!
//! Long-running or externally-blocking actions run here, off the
//! dispatch-handling path. Submission never blocks: a saturated pool fails
//! fast with [`PoolError::NoFreeWorker`] and the caller retries later.
//! Errors raised inside a unit of work are captured and handed to the
//! linked callback; they never escape the pool task.

use std::future::Future;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tracing::debug;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("requested action cannot be performed because the worker pool is full")]
    NoFreeWorker,
}

/// Result of one unit of work
pub type UnitResult<T> = Result<T, anyhow::Error>;

type LinkCallback<T> = Box<dyn FnOnce(&UnitResult<T>) + Send + 'static>;

struct HandleState<T> {
    result: Option<UnitResult<T>>,
    callback: Option<LinkCallback<T>>,
    delivered: bool,
}

impl<T> HandleState<T> {
    /// Invoke the stored callback with the stored result, once. Both must
    /// be present; the delivered flag guards against a second delivery.
    fn deliver(&mut self) {
        if self.delivered || self.result.is_none() || self.callback.is_none() {
            return;
        }
        self.delivered = true;
        let callback = self.callback.take().expect("checked above");
        let result = self.result.as_ref().expect("checked above");
        callback(result);
    }
}

/// Handle to a spawned unit of work
pub struct WorkerHandle<T> {
    state: Arc<Mutex<HandleState<T>>>,
    done_rx: watch::Receiver<bool>,
}

impl<T> std::fmt::Debug for WorkerHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> WorkerHandle<T> {
    /// Attach a completion callback. The callback fires exactly once with
    /// the unit's result, whether the unit has already finished or not.
    /// The callback runs under the handle's lock and must not call back
    /// into the handle.
    pub fn link<F>(&self, callback: F)
    where
        F: FnOnce(&UnitResult<T>) + Send + 'static,
    {
        let mut state = self.state.lock().unwrap();
        state.callback = Some(Box::new(callback));
        state.deliver();
    }

    /// Wait for the unit of work to finish and take its result.
    pub async fn join(mut self) -> UnitResult<T> {
        while !*self.done_rx.borrow() {
            if self.done_rx.changed().await.is_err() {
                break;
            }
        }

        let mut state = self.state.lock().unwrap();
        state
            .result
            .take()
            .unwrap_or_else(|| Err(anyhow::anyhow!("worker finished without a result")))
    }
}

/// Fixed-capacity pool of concurrent workers
pub struct WorkerPool {
    capacity: usize,
    slots: Arc<Semaphore>,
    spawn_lock: Mutex<()>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            spawn_lock: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free worker slots at this instant
    pub fn free(&self) -> usize {
        self.slots.available_permits()
    }

    /// Spawn a unit of work if a slot is free. Control returns to the
    /// caller immediately; a saturated pool fails with
    /// [`PoolError::NoFreeWorker`].
    pub fn spawn<F, T>(&self, unit: F) -> Result<WorkerHandle<T>, PoolError>
    where
        F: Future<Output = UnitResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        // The check-then-spawn sequence is serialized so concurrent
        // handlers cannot race past the capacity check.
        let _spawn_guard = self.spawn_lock.lock().unwrap();

        let permit = self
            .slots
            .clone()
            .try_acquire_owned()
            .map_err(|_| PoolError::NoFreeWorker)?;

        let state = Arc::new(Mutex::new(HandleState {
            result: None,
            callback: None,
            delivered: false,
        }));
        let (done_tx, done_rx) = watch::channel(false);

        let task_state = state.clone();
        tokio::spawn(async move {
            let result = unit.await;

            if let Err(ref e) = result {
                debug!("worker unit finished with error: {e:#}");
            }

            {
                let mut state = task_state.lock().unwrap();
                state.result = Some(result);
                state.deliver();
            }

            drop(permit);
            let _ = done_tx.send(true);
        });

        Ok(WorkerHandle { state, done_rx })
    }

    /// Wait until every in-flight unit has finished. Used by shutdown and
    /// tests; new spawns during the wait extend it.
    pub async fn wait_idle(&self) {
        let all = self
            .slots
            .clone()
            .acquire_many_owned(self.capacity as u32)
            .await;
        drop(all);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_spawn_runs_unit() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        let handle = pool
            .spawn(async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(41)
            })
            .unwrap();

        assert_eq!(handle.join().await.unwrap(), 41);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_saturated_pool_fails_fast() {
        let pool = WorkerPool::new(1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let _held = pool
            .spawn(async move {
                let _ = release_rx.await;
                Ok(())
            })
            .unwrap();

        let overflow = pool.spawn(async { Ok(()) });
        assert!(matches!(overflow, Err(PoolError::NoFreeWorker)));

        release_tx.send(()).unwrap();
        pool.wait_idle().await;

        // Capacity is available again
        assert!(pool.spawn(async { Ok(()) }).is_ok());
        pool.wait_idle().await;
    }

    #[tokio::test]
    async fn test_link_callback_added_during_execution() {
        let pool = WorkerPool::new(1);
        let fired = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = pool
            .spawn(async move {
                let _ = release_rx.await;
                Ok(7)
            })
            .unwrap();

        let f = fired.clone();
        handle.link(move |result| {
            assert_eq!(*result.as_ref().unwrap(), 7);
            f.fetch_add(1, Ordering::SeqCst);
        });

        release_tx.send(()).unwrap();
        pool.wait_idle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_link_callback_added_after_execution() {
        let pool = WorkerPool::new(1);
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = pool.spawn(async { Ok(7) }).unwrap();
        pool.wait_idle().await;

        let f = fired.clone();
        handle.link(move |result| {
            assert_eq!(*result.as_ref().unwrap(), 7);
            f.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_link_callback_observes_unit_error() {
        let pool = WorkerPool::new(1);
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = pool
            .spawn(async { Err::<(), _>(anyhow::anyhow!("unit failed")) })
            .unwrap();

        let f = fired.clone();
        handle.link(move |result| {
            assert!(result.is_err());
            f.fetch_add(1, Ordering::SeqCst);
        });

        pool.wait_idle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_link_callback_error_after_execution() {
        let pool = WorkerPool::new(1);
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = pool
            .spawn(async { Err::<(), _>(anyhow::anyhow!("unit failed")) })
            .unwrap();
        pool.wait_idle().await;

        let f = fired.clone();
        handle.link(move |result| {
            assert!(result.is_err());
            f.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
