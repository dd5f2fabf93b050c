//! The per-worker accept loop (spec.md §4.5): repeatedly await `Accept` on
//! the listening fd and spawn a request task per accepted connection.
//!
//! Grounded in the accept-and-register half of the teacher's `worker.rs`
//! event loop (`epoll.wait` → `accept_connection` → `slab.allocate`), ported
//! to the suspendable-task model: instead of polling a listen token inside a
//! shared epoll loop, this is its own task awaiting `AcceptAsync` directly.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::metrics::WorkerMetrics;
use crate::reactor::Reactor;
use crate::reactor_future::AcceptFuture;
use crate::request_task;
use crate::router::Router;
use crate::task::{self, JoinHandle};

/// Spawns the accept task and resumes it once, so its first `AcceptAsync`
/// submission is already enqueued by the time the worker's first `Poll()`
/// runs (spec.md §4.5).
pub fn spawn(
    reactor: Rc<Reactor>,
    listen_fd: i32,
    router: Arc<Router>,
    metrics: Arc<WorkerMetrics>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    task::spawn(run(reactor, listen_fd, router, metrics, shutdown))
}

async fn run(
    reactor: Rc<Reactor>,
    listen_fd: i32,
    router: Arc<Router>,
    metrics: Arc<WorkerMetrics>,
    shutdown: Arc<AtomicBool>,
) {
    let mut connections: Vec<JoinHandle<()>> = Vec::new();

    loop {
        connections.retain(|h| !h.is_finished());

        let result = AcceptFuture::new(reactor.clone(), listen_fd).await;
        if result < 0 {
            if shutdown.load(Ordering::Acquire) {
                return;
            }
            // Transient accept error. The Accept task tolerates these and
            // loops (spec.md §4.5, §7).
            continue;
        }

        let fd = result;
        metrics.inc_connections();
        let handle = task::spawn(request_task::run(
            reactor.clone(),
            fd,
            router.clone(),
            metrics.clone(),
        ));
        connections.push(handle);
    }
}
