//! A 256-byte buffered reader over a connection fd (spec.md §4.3).
//!
//! Grounded in `examples/original_source/coro_server/read_iterator.cpp`'s
//! `ReadIterator`: a single fixed window, `Ensure()` as the only suspension
//! point, and `operator*`/`operator++` as the synchronous peek/advance the
//! parser drives between refills. Several revisions of
//! `examples/original_source/server/read_iterator.cpp` separate
//! `Advance`/`CurrentPtr`/`Available` into their own methods; this
//! consolidates them the way the final `coro_server` revision does.

use std::rc::Rc;

use crate::reactor::Reactor;
use crate::reactor_future::ReadFuture;

pub struct BufferedReader {
    /// `None` only for [`BufferedReader::for_test`] fixtures, which never
    /// need a ring since `fixed_eof` stops `ensure()` before it's touched.
    reactor: Option<Rc<Reactor>>,
    fd: i32,
    buf: Box<[u8; 256]>,
    position: usize,
    length: usize,
    /// Set only by [`BufferedReader::for_test`]: once the preloaded window
    /// is consumed, further `ensure()` calls see permanent EOF instead of
    /// touching the reactor. Lets parser tests feed a fixed byte string
    /// through the real suspendable state machine without a live fd.
    fixed_eof: bool,
}

impl BufferedReader {
    pub fn new(reactor: Rc<Reactor>, fd: i32) -> Self {
        Self {
            reactor: Some(reactor),
            fd,
            buf: Box::new([0u8; 256]),
            position: 0,
            length: 0,
            fixed_eof: false,
        }
    }

    /// Preloads up to 256 bytes and disables further refills, for driving
    /// the parser's state machine in tests against a fixed request. Doesn't
    /// allocate a ring at all: `fixed_eof` guarantees `ensure()` never
    /// touches `reactor`.
    #[cfg(test)]
    pub fn for_test(bytes: &[u8]) -> Self {
        let mut buf = Box::new([0u8; 256]);
        let n = bytes.len().min(256);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self {
            reactor: None,
            fd: -1,
            buf,
            position: 0,
            length: n,
            fixed_eof: true,
        }
    }

    /// Refills the window via `ReadAsync` if it's exhausted; a no-op
    /// (synchronous) otherwise.
    pub async fn ensure(&mut self) {
        if self.position >= self.length {
            if self.fixed_eof {
                return;
            }
            let reactor = self.reactor.as_ref().expect("reactor set for a live connection").clone();
            let (n, buf) = ReadFuture::new(reactor, self.fd).await;
            self.buf = buf;
            self.length = n;
            self.position = 0;
        }
    }

    /// `'\0'` sentinel at EOF, matching the original's `operator*`.
    pub fn peek(&self) -> u8 {
        if self.position < self.length {
            self.buf[self.position]
        } else {
            0
        }
    }

    pub fn is_valid(&self) -> bool {
        self.position < self.length && self.peek() != 0
    }

    /// Advances by one byte. Typed `async` to match the suspendable state
    /// machine's call sites even though it never itself awaits; any
    /// needed refill is the next `ensure()`'s job, not this one's.
    pub async fn advance(&mut self) {
        self.position += 1;
    }

    /// Bulk advance within the current window. Synchronous, never crosses
    /// a refill boundary (spec.md §4.3).
    pub fn advance_n(&mut self, n: usize) {
        self.position = (self.position + n).min(self.length);
    }

    pub fn available(&self) -> usize {
        self.length.saturating_sub(self.position)
    }

    pub fn current_slice(&self) -> &[u8] {
        &self.buf[self.position..self.length]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // BufferedReader is exercised end-to-end by `parser.rs`'s tests, which
    // drive it over a real loopback socket; a reactor-free unit test here
    // would just be re-testing `ReadFuture`.
    #[test]
    fn fresh_reader_has_nothing_buffered() {
        // Construction alone must not submit anything (no reactor access
        // happens until the first `ensure().await`).
        let reactor = crate::reactor::Reactor::new().expect("reactor");
        let reader = BufferedReader::new(reactor, -1);
        assert_eq!(reader.available(), 0);
        assert!(!reader.is_valid());
        assert_eq!(reader.peek(), 0);
    }
}
