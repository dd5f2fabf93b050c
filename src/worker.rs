//! The worker thread (spec.md §4.5/§5): owns one reactor and one accept
//! task, and drives them until the shutdown flag is observed.
//!
//! Grounded in the teacher's `Worker::run` (own listen socket + epoll +
//! slab), trimmed down to the shape spec.md §5 calls for: one reactor per
//! thread, never shared, never touched from another thread.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::accept_task;
use crate::error::CoreResult;
use crate::metrics::WorkerMetrics;
use crate::reactor::Reactor;
use crate::router::Router;
use crate::task::JoinHandle;

pub struct Worker {
    id: usize,
    listen_fd: i32,
    router: Arc<Router>,
    metrics: Arc<WorkerMetrics>,
}

impl Worker {
    pub fn new(id: usize, listen_fd: i32, router: Arc<Router>, metrics: Arc<WorkerMetrics>) -> Self {
        Self {
            id,
            listen_fd,
            router,
            metrics,
        }
    }

    /// Builds the reactor, spawns and resumes the accept task once, then
    /// polls until `shutdown` is set and the accept task has returned
    /// (spec.md §4.5). If the accept task completes early (e.g. the
    /// listener closed) while not shutting down, a fresh one is spawned.
    pub fn run(&mut self, shutdown: Arc<AtomicBool>) -> CoreResult<()> {
        let reactor = Reactor::new()?;
        let mut accept_task: JoinHandle<()> = accept_task::spawn(
            reactor.clone(),
            self.listen_fd,
            self.router.clone(),
            self.metrics.clone(),
            shutdown.clone(),
        );

        loop {
            let stopping = shutdown.load(Ordering::Acquire);
            if stopping && accept_task.is_finished() {
                break;
            }

            reactor.poll_once()?;

            if accept_task.is_finished() && !shutdown.load(Ordering::Acquire) {
                tracing::warn!(worker = self.id, "accept task exited early, restarting it");
                accept_task = accept_task::spawn(
                    reactor.clone(),
                    self.listen_fd,
                    self.router.clone(),
                    self.metrics.clone(),
                    shutdown.clone(),
                );
            }
        }

        tracing::info!(worker = self.id, "worker exiting");
        Ok(())
    }
}
