//! The completion-based I/O reactor (spec.md §4.2).
//!
//! One reactor per worker thread, never shared or sent across threads. The
//! mechanics (wrap `io_uring::IoUring`, batch SQE submission, drain CQEs by
//! `user_data`) are grounded in
//! `examples/other_examples/c473ec70_sriggin-disrust__src-io_thread.rs.rs`,
//! generalized from that file's hand-coded connection table into the
//! `Slab`-keyed, `Future`-returning awaitables spec.md requires.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::task::Waker;
use std::time::Duration;

use io_uring::{IoUring, opcode, squeue, types::Fd};

use crate::slab::Slab;

const RING_DEPTH: u32 = 1024;
/// `Poll()` waits at most this long for completions per pass (spec.md §4.2).
const POLL_TIMEOUT: Duration = Duration::from_millis(1);

pub(crate) enum OpKind {
    Accept,
    Read { buf: Box<[u8; 256]> },
    Write { buf: Rc<Vec<u8>>, offset: usize, len: usize },
}

pub(crate) struct OpSlot {
    kind: OpKind,
    waker: Option<Waker>,
    result: Option<i32>,
}

/// Owns the ring plus the slab of in-flight operations keyed by
/// `user_data`. `Rc<RefCell<_>>` because every awaitable future holds a
/// handle back into it, still confined to one thread.
pub struct Reactor {
    inner: RefCell<ReactorInner>,
}

struct ReactorInner {
    ring: IoUring,
    ops: Slab<OpSlot>,
    /// Submissions that didn't fit in the ring on a previous pass.
    pending: Vec<(usize, squeue::Entry)>,
}

impl Reactor {
    pub fn new() -> io::Result<Rc<Self>> {
        Ok(Rc::new(Reactor {
            inner: RefCell::new(ReactorInner {
                ring: IoUring::new(RING_DEPTH)?,
                ops: Slab::new(),
                pending: Vec::new(),
            }),
        }))
    }

    /// One step of the reactor loop: flush anything queued that now fits,
    /// wait briefly for completions, and resume each completed awaiter
    /// exactly once.
    pub fn poll_once(self: &Rc<Self>) -> io::Result<()> {
        self.flush_pending();

        let completions: Vec<(u64, i32)> = {
            let mut inner = self.inner.borrow_mut();
            match inner.ring.submitter().submit() {
                Ok(_) => {}
                Err(e) if e.raw_os_error() == Some(libc::EBUSY) => {}
                Err(e) => return Err(e),
            }
            if inner.ring.completion().is_empty() {
                drop(inner);
                // A short, bounded sleep rather than blocking indefinitely.
                // Approximates the ~1ms completion wait from spec.md §4.2
                // without a linked IORING_OP_TIMEOUT SQE.
                std::thread::sleep(POLL_TIMEOUT);
                inner = self.inner.borrow_mut();
            }
            inner
                .ring
                .completion()
                .map(|cqe| (cqe.user_data(), cqe.result()))
                .collect()
        };

        for (user_data, result) in completions {
            let idx = user_data as usize;
            let waker = {
                let mut inner = self.inner.borrow_mut();
                match inner.ops.get_mut(idx) {
                    Some(slot) => {
                        slot.result = Some(result);
                        slot.waker.take()
                    }
                    None => None,
                }
            };
            if let Some(w) = waker {
                w.wake();
            }
        }

        Ok(())
    }

    fn flush_pending(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut inner.pending);
        let mut still_pending = Vec::new();
        for (idx, entry) in pending {
            let pushed = unsafe { inner.ring.submission().push(&entry) };
            if pushed.is_err() {
                still_pending.push((idx, entry));
            }
        }
        inner.pending = still_pending;
        if !inner.pending.is_empty() {
            let _ = inner.ring.submit();
        }
    }

    fn submit(&self, idx: usize, entry: squeue::Entry) {
        let mut inner = self.inner.borrow_mut();
        let pushed = unsafe { inner.ring.submission().push(&entry) };
        if pushed.is_err() {
            inner.pending.push((idx, entry));
        }
    }

    pub(crate) fn register_op(&self, kind: OpKind) -> usize {
        self.inner.borrow_mut().ops.insert(OpSlot {
            kind,
            waker: None,
            result: None,
        })
    }

    pub(crate) fn take_result(&self, idx: usize) -> Option<i32> {
        self.inner.borrow_mut().ops.get_mut(idx)?.result.take()
    }

    pub(crate) fn set_waker(&self, idx: usize, waker: Waker) {
        if let Some(slot) = self.inner.borrow_mut().ops.get_mut(idx) {
            slot.waker = Some(waker);
        }
    }

    pub(crate) fn finish_op(&self, idx: usize) -> OpKind {
        self.inner
            .borrow_mut()
            .ops
            .remove(idx)
            .expect("finish_op on unknown slot")
            .kind
    }

    pub(crate) fn submit_accept(&self, idx: usize, fd: i32) {
        let entry = opcode::Accept::new(Fd(fd), std::ptr::null_mut(), std::ptr::null_mut())
            .build()
            .user_data(idx as u64);
        self.submit(idx, entry);
    }

    pub(crate) fn submit_read(&self, idx: usize, fd: i32, buf_ptr: *mut u8, buf_len: u32) {
        let entry = opcode::Read::new(Fd(fd), buf_ptr, buf_len)
            .build()
            .user_data(idx as u64);
        self.submit(idx, entry);
    }

    pub(crate) fn submit_write(&self, idx: usize, fd: i32, buf_ptr: *const u8, buf_len: u32) {
        let entry = opcode::Write::new(Fd(fd), buf_ptr, buf_len)
            .build()
            .user_data(idx as u64);
        self.submit(idx, entry);
    }

    pub(crate) fn with_op_mut<R>(&self, idx: usize, f: impl FnOnce(&mut OpKind) -> R) -> Option<R> {
        self.inner.borrow_mut().ops.get_mut(idx).map(|slot| f(&mut slot.kind))
    }
}
