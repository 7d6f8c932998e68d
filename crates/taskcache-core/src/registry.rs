//! In-process executor bookkeeping: registers an executor with the `Store`,
//! keeps its heartbeat alive on a background thread, and stops it cleanly on
//! request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;

use crate::model::ExecutorRecord;
use crate::store::{Store, StoreError};

/// A live executor's registry handle. Spawns a background thread that
/// touches the heartbeat at `heartbeat_interval / 2` so that the dead-factor
/// grace period (`HEARTBEAT_DEAD_FACTOR`) never trips under normal load.
pub struct ExecutorHandle {
    id: i64,
    stop: Arc<AtomicBool>,
    heartbeat_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutorHandle {
    pub fn id(&self) -> i64 {
        self.id
    }

    fn join_heartbeat(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.heartbeat_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ExecutorHandle {
    fn drop(&mut self) {
        self.join_heartbeat();
    }
}

/// Registry of executors known to this process. A thin wrapper over the
/// Store's executor rows, responsible only for the heartbeat thread
/// lifecycle; liveness *evaluation* is `ExecutorRecord::is_live_at`, used by
/// the Planner against rows read back from the Store, not against this
/// registry's own bookkeeping.
pub struct ExecutorRegistry<S: Store + 'static> {
    store: Arc<S>,
    handles: Mutex<Vec<Arc<ExecutorHandle>>>,
}

impl<S: Store + 'static> ExecutorRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, handles: Mutex::new(Vec::new()) }
    }

    /// Register a new executor and start its heartbeat thread. The returned
    /// handle keeps the thread alive for as long as it (or a clone of it) is
    /// held; call `unregister` to stop it cleanly before dropping.
    pub fn register(&self, executor_type: impl Into<String>, version: impl Into<String>, heartbeat_interval: f64, resources: Value) -> Result<Arc<ExecutorHandle>, StoreError> {
        let record = ExecutorRecord::new(executor_type, version, heartbeat_interval, resources);
        let id = self.store.register_executor(&record)?;
        debug!("registered executor {id}");

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let thread_store = self.store.clone();
        let period = Duration::from_secs_f64((heartbeat_interval / 2.0).max(0.1));

        let heartbeat_thread = thread::Builder::new()
            .name(format!("taskcache-heartbeat-{id}"))
            .spawn(move || {
                while !thread_stop.load(Ordering::SeqCst) {
                    thread::sleep(period);
                    if thread_stop.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(err) = thread_store.update_heartbeat(id) {
                        warn!("executor {id} heartbeat failed: {err}");
                    }
                }
            })
            .expect("failed to spawn heartbeat thread");

        let handle = Arc::new(ExecutorHandle { id, stop, heartbeat_thread: Mutex::new(Some(heartbeat_thread)) });
        self.handles.lock().unwrap().push(handle.clone());
        Ok(handle)
    }

    /// Cleanly stop an executor: join its heartbeat thread, mark it stopped
    /// in the Store, and let the Store reclaim its abandoned announcements.
    pub fn unregister(&self, handle: &Arc<ExecutorHandle>) -> Result<(), StoreError> {
        let id = handle.id();
        handle.join_heartbeat();
        self.store.stop_executor(id)?;
        self.handles.lock().unwrap().retain(|h| h.id() != id);
        debug!("stopped executor {id}");
        Ok(())
    }

    /// The executor a `compute` call should announce under: the
    /// first-registered handle still known to this registry. There is no
    /// load-balancing policy; it is simply "whichever was registered first
    /// and hasn't been unregistered".
    pub fn first_live(&self) -> Option<Arc<ExecutorHandle>> {
        self.handles.lock().unwrap().first().cloned()
    }

    /// Cleanly stop every executor this registry still knows about, in
    /// registration order.
    pub fn stop_all(&self) -> Result<(), StoreError> {
        let handles: Vec<Arc<ExecutorHandle>> = self.handles.lock().unwrap().clone();
        for handle in &handles {
            self.unregister(handle)?;
        }
        Ok(())
    }
}
