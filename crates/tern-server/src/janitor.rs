use std::collections::{HashMap, HashSet};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select, tick, unbounded};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type WorkerId = u64;

/// Join handles of running workers, keyed by id.
#[derive(Debug, Default)]
pub struct WorkerSet {
    handles: HashMap<WorkerId, JoinHandle<()>>,
    /// Workers that reported completion before their handle arrived.
    finished_early: HashSet<WorkerId>,
}

impl WorkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a worker. Returns `true` if it had already finished and was joined now.
    pub fn insert(&mut self, id: WorkerId, handle: JoinHandle<()>) -> bool {
        if self.finished_early.remove(&id) {
            join(id, handle);
            return true;
        }
        self.handles.insert(id, handle);
        false
    }

    /// Join a worker that has reported completion. Returns whether it was joined now.
    pub fn reap(&mut self, id: WorkerId) -> bool {
        match self.handles.remove(&id) {
            Some(handle) => {
                join(id, handle);
                true
            }
            None => {
                self.finished_early.insert(id);
                false
            }
        }
    }

    /// Join every remaining worker, waiting for those still running.
    pub fn join_all(&mut self) -> usize {
        let count = self.handles.len();
        for (id, handle) in self.handles.drain() {
            join(id, handle);
        }
        self.finished_early.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

fn join(id: WorkerId, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        warn!("Worker {} panicked", id);
    }
}

/// Signals the janitor when a worker's closure returns or unwinds.
struct Completion {
    id: WorkerId,
    done: Sender<WorkerId>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        let _ = self.done.send(self.id);
    }
}

/// Spawns worker threads and hands their join handles to the janitor.
#[derive(Debug)]
pub struct WorkerSpawner {
    next_id: WorkerId,
    spawned: Sender<(WorkerId, JoinHandle<()>)>,
    done: Sender<WorkerId>,
}

impl WorkerSpawner {
    pub fn spawn<F>(&mut self, label: &str, work: F) -> io::Result<WorkerId>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;

        let completion = Completion {
            id,
            done: self.done.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("tern-{}-{}", label, id))
            .spawn(move || {
                let _completion = completion;
                work();
            })?;

        // janitor gone means shutdown already finished; just detach
        let _ = self.spawned.send((id, handle));
        Ok(id)
    }
}

/// Background reaper for finished workers.
///
/// Wakes every `interval`, joins the workers that reported completion, and
/// on cancellation joins all remaining workers before returning.
pub struct Janitor {
    spawned: Receiver<(WorkerId, JoinHandle<()>)>,
    done: Receiver<WorkerId>,
    workers: WorkerSet,
    interval: Duration,
    poll: Duration,
    cancel: CancellationToken,
}

/// Create a connected spawner and janitor.
pub fn worker_pool(interval: Duration, poll: Duration, cancel: CancellationToken) -> (WorkerSpawner, Janitor) {
    let (spawned_tx, spawned_rx) = unbounded();
    let (done_tx, done_rx) = unbounded();
    let spawner = WorkerSpawner {
        next_id: 1,
        spawned: spawned_tx,
        done: done_tx,
    };
    let janitor = Janitor {
        spawned: spawned_rx,
        done: done_rx,
        workers: WorkerSet::new(),
        interval,
        poll,
        cancel,
    };
    (spawner, janitor)
}

impl Janitor {
    /// Run until cancelled. Returns the number of workers joined.
    pub fn run(mut self) -> usize {
        let reap_tick = tick(self.interval);
        let poll_tick = tick(self.poll);
        let mut joined = 0;

        loop {
            select! {
                recv(reap_tick) -> _ => {
                    let n = self.reap();
                    if n > 0 {
                        debug!("Janitor: reaped {} workers, {} running", n, self.workers.len());
                    }
                    joined += n;
                }
                recv(poll_tick) -> _ => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                }
            }
        }

        joined += self.shutdown();
        joined
    }

    /// Join all workers that have reported completion.
    pub fn reap(&mut self) -> usize {
        let mut reaped = self.collect_spawned();
        while let Ok(id) = self.done.try_recv() {
            if self.workers.reap(id) {
                reaped += 1;
            }
        }
        reaped + self.collect_spawned()
    }

    fn collect_spawned(&mut self) -> usize {
        let mut joined = 0;
        while let Ok((id, handle)) = self.spawned.try_recv() {
            if self.workers.insert(id, handle) {
                joined += 1;
            }
        }
        joined
    }

    /// Wait for the spawner to go away, then join everything it started.
    fn shutdown(&mut self) -> usize {
        let mut joined = 0;
        // blocks until the dispatcher drops its spawner
        for (id, handle) in self.spawned.iter() {
            if self.workers.insert(id, handle) {
                joined += 1;
            }
        }
        let remaining = self.workers.len();
        if remaining > 0 {
            info!("Janitor: waiting for {} workers", remaining);
        }
        joined + self.workers.join_all()
    }
}
