//! A minimal suspendable task, `Rc`/`RefCell` all the way down.
//!
//! Each worker owns its reactor and its tasks on a single OS thread
//! (spec.md §5). No submission or completion ever crosses threads, so
//! there's no reason to pay for atomics or locks the way
//! `examples/Nebula-ecosystem-Cadentis/src/core/task.rs` does for its
//! `Send + Sync` tasks. This is the same `Task`/`JoinHandle` shape with the
//! thread-safety stripped back out.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

pub struct Task<T> {
    future: RefCell<Option<Pin<Box<dyn Future<Output = T>>>>>,
    result: RefCell<Option<T>>,
    completed: Cell<bool>,
    waiters: RefCell<Vec<Waker>>,
    /// Set while `poll` has taken the future out and is driving it.
    polling: Cell<bool>,
    /// Set by a wake that fires while `polling` is true. A future that
    /// wakes itself (e.g. an already-ready reactor slot) would otherwise
    /// have its wake silently dropped, since the future isn't back in
    /// `future` yet for a reentrant `poll` to find.
    rewake: Cell<bool>,
}

impl<T> Task<T> {
    fn new(fut: impl Future<Output = T> + 'static) -> Rc<Self> {
        Rc::new(Task {
            future: RefCell::new(Some(Box::pin(fut))),
            result: RefCell::new(None),
            completed: Cell::new(false),
            waiters: RefCell::new(Vec::new()),
            polling: Cell::new(false),
            rewake: Cell::new(false),
        })
    }

    /// Polls the wrapped future until it returns `Pending` with no wake
    /// pending, or completes. Called directly by a fired waker rather than
    /// through a ready queue; on a single thread, waking and resuming are
    /// the same event.
    fn poll(self: &Rc<Self>) {
        loop {
            if self.completed.get() {
                return;
            }

            let mut slot = self.future.borrow_mut();
            let Some(mut fut) = slot.take() else {
                return;
            };
            drop(slot);

            self.polling.set(true);
            self.rewake.set(false);
            let waker = make_waker(self.clone());
            let mut cx = Context::from_waker(&waker);
            let result = fut.as_mut().poll(&mut cx);
            self.polling.set(false);

            match result {
                Poll::Pending => {
                    *self.future.borrow_mut() = Some(fut);
                    if !self.rewake.get() {
                        return;
                    }
                }
                Poll::Ready(value) => {
                    *self.result.borrow_mut() = Some(value);
                    self.completed.set(true);
                    for w in self.waiters.borrow_mut().drain(..) {
                        w.wake();
                    }
                    return;
                }
            }
        }
    }
}

/// Spawns `fut` and resumes it once immediately. The Accept and Request
/// tasks both rely on this first resume to enqueue their first awaitable
/// (spec.md §4.5).
pub fn spawn<T: 'static>(fut: impl Future<Output = T> + 'static) -> JoinHandle<T> {
    let task = Task::new(fut);
    task.poll();
    JoinHandle { task }
}

pub struct JoinHandle<T> {
    task: Rc<Task<T>>,
}

impl<T> JoinHandle<T> {
    pub fn is_finished(&self) -> bool {
        self.task.completed.get()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if self.task.completed.get() {
            return Poll::Ready(self.task.result.borrow_mut().take().expect("polled twice"));
        }
        self.task.waiters.borrow_mut().push(cx.waker().clone());
        Poll::Pending
    }
}

fn make_waker<T>(task: Rc<Task<T>>) -> Waker {
    let ptr = Rc::into_raw(task) as *const ();
    unsafe { Waker::from_raw(RawWaker::new(ptr, vtable::<T>())) }
}

/// Per-`T` vtable. A `const` item inside a generic function is
/// monomorphized along with it, so each `T` gets its own correctly-typed
/// set of function pointers despite the `'static` return type.
fn vtable<T>() -> &'static RawWakerVTable {
    struct Holder<T>(std::marker::PhantomData<T>);
    impl<T> Holder<T> {
        const VTABLE: RawWakerVTable =
            RawWakerVTable::new(clone_raw::<T>, wake_raw::<T>, wake_by_ref_raw::<T>, drop_raw::<T>);
    }
    &Holder::<T>::VTABLE
}

unsafe fn clone_raw<T>(ptr: *const ()) -> RawWaker {
    unsafe {
        Rc::increment_strong_count(ptr as *const Task<T>);
    }
    RawWaker::new(ptr, vtable::<T>())
}

unsafe fn wake_raw<T>(ptr: *const ()) {
    let task = unsafe { Rc::from_raw(ptr as *const Task<T>) };
    if task.polling.get() {
        task.rewake.set(true);
    } else {
        Task::poll(&task);
    }
}

unsafe fn wake_by_ref_raw<T>(ptr: *const ()) {
    if unsafe { &*(ptr as *const Task<T>) }.polling.get() {
        unsafe { &*(ptr as *const Task<T>) }.rewake.set(true);
        return;
    }
    unsafe {
        Rc::increment_strong_count(ptr as *const Task<T>);
    }
    let task = unsafe { Rc::from_raw(ptr as *const Task<T>) };
    Task::poll(&task);
}

unsafe fn drop_raw<T>(ptr: *const ()) {
    unsafe {
        drop(Rc::from_raw(ptr as *const Task<T>));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;
    use std::future::poll_fn;
    use std::rc::Rc as StdRc;

    #[test]
    fn spawn_runs_a_ready_future_to_completion() {
        let handle = spawn(async { 1 + 1 });
        assert!(handle.is_finished());
    }

    #[test]
    fn self_waking_future_drives_itself_to_completion() {
        let polls = StdRc::new(StdRefCell::new(0));
        let polls2 = polls.clone();

        // Waking is synchronous re-polling on this executor, so a future
        // that wakes itself until some condition holds needs no external
        // driver to reach Ready.
        let handle = spawn(poll_fn(move |cx| {
            *polls2.borrow_mut() += 1;
            if *polls2.borrow() >= 3 {
                Poll::Ready(*polls2.borrow())
            } else {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }));

        assert!(handle.is_finished());
        assert_eq!(*polls.borrow(), 3);
    }
}
