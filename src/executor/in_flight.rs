use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use uuid::Uuid;

use crate::error::{ExecutorError, ExecutorResult};

#[derive(Default)]
struct State {
    closed: bool,
    // Set by `abort_all`; tasks whose handle arrives later are aborted on registration
    aborting: bool,
    // `None` until the task's abort handle is known
    tasks: HashMap<Uuid, Option<AbortHandle>>,
}

/// Registry of running query tasks
///
/// The closed flag and the task set share one lock, so once [`InFlight::close`]
/// returns no new task can be registered.
pub(crate) struct InFlight {
    state: watch::Sender<State>,
}

impl InFlight {
    pub fn new() -> Self {
        let (state, _) = watch::channel(State::default());
        Self { state }
    }

    /// Spawns `task` unless the registry is closed
    ///
    /// The task receives a guard that unregisters it when dropped, whether it
    /// finishes or is aborted.
    pub fn spawn<F, Fut>(self: &Arc<Self>, id: Uuid, task: F) -> ExecutorResult<JoinHandle<Fut::Output>>
    where
        F: FnOnce(InFlightGuard) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let registered = self.state.send_if_modified(|state| {
            if state.closed {
                return false;
            }
            state.tasks.insert(id, None);
            true
        });

        if !registered {
            return Err(ExecutorError::PoolClosed);
        }

        let guard = InFlightGuard {
            id,
            registry: Arc::clone(self),
        };
        let handle = tokio::spawn(task(guard));
        let abort = handle.abort_handle();

        // A task that already finished has removed its own entry
        self.state.send_if_modified(|state| {
            if let Some(slot) = state.tasks.get_mut(&id) {
                if state.aborting {
                    abort.abort();
                }
                *slot = Some(abort);
            }
            false
        });

        Ok(handle)
    }

    /// Stops accepting tasks; returns false if already closed
    pub fn close(&self) -> bool {
        self.state.send_if_modified(|state| {
            let newly_closed = !state.closed;
            state.closed = true;
            newly_closed
        })
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn len(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    /// Resolves once no task is registered
    pub async fn drained(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|state| state.tasks.is_empty()).await;
    }

    /// Aborts every registered task, returning how many were signalled
    ///
    /// A task still waiting for its abort handle is aborted as soon as the
    /// handle is recorded.
    pub fn abort_all(&self) -> usize {
        let mut aborted = 0;
        self.state.send_if_modified(|state| {
            state.aborting = true;
            // Aborting only schedules the cancellation, so holding the lock is fine
            for handle in state.tasks.values().flatten() {
                handle.abort();
            }
            aborted = state.tasks.len();
            false
        });
        aborted
    }

    fn unregister(&self, id: &Uuid) {
        self.state.send_modify(|state| {
            state.tasks.remove(id);
        });
    }
}

/// Held by a running query task; unregisters it on drop
pub(crate) struct InFlightGuard {
    id: Uuid,
    registry: Arc<InFlight>,
}

impl InFlightGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_finished_task_unregisters_itself() {
        let registry = Arc::new(InFlight::new());

        let handle = registry
            .spawn(Uuid::new_v4(), |guard| async move {
                let _guard = guard;
                42
            })
            .unwrap();

        assert_eq!(handle.await.unwrap(), 42);
        registry.drained().await;
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_spawn_after_close_is_rejected() {
        let registry = Arc::new(InFlight::new());
        assert!(registry.close());
        assert!(!registry.close());
        assert!(registry.is_closed());

        let result = registry.spawn(Uuid::new_v4(), |_guard| async {});
        assert!(matches!(result, Err(ExecutorError::PoolClosed)));
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_task_registered_after_abort_all_is_cancelled() {
        let registry = Arc::new(InFlight::new());
        assert_eq!(registry.abort_all(), 0);

        let handle = registry
            .spawn(Uuid::new_v4(), |guard| async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
            .unwrap();

        assert!(handle.await.unwrap_err().is_cancelled());
        registry.drained().await;
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_abort_all_cancels_running_tasks() {
        let registry = Arc::new(InFlight::new());

        let handle = registry
            .spawn(Uuid::new_v4(), |guard| async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
            .unwrap();

        tokio::task::yield_now().await;
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.abort_all(), 1);

        assert!(handle.await.unwrap_err().is_cancelled());
        registry.drained().await;
        assert_eq!(registry.len(), 0);
    }
}
